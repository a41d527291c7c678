use killfeed_types::EventTag;

use crate::config::GroupingConfig;

/// Tags an event from the number of boxes it absorbed.
pub fn classify(box_count: u32, config: &GroupingConfig) -> EventTag {
    if box_count >= config.multi_kill_threshold {
        EventTag::MultiKill
    } else if box_count == 1 {
        EventTag::Kill
    } else if box_count == 0 {
        EventTag::Unknown
    } else {
        config.ambiguous_tag.tag()
    }
}
