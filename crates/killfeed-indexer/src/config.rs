use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use killfeed_types::{ConfigurationError, EventTag};

/// Tag given to events with more than one box but fewer than the multi-kill threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguousTagPolicy {
    #[default]
    Kill,
    Unknown,
}

impl AmbiguousTagPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbiguousTagPolicy::Kill => "kill",
            AmbiguousTagPolicy::Unknown => "unknown",
        }
    }

    pub fn tag(&self) -> EventTag {
        match self {
            AmbiguousTagPolicy::Kill => EventTag::Kill,
            AmbiguousTagPolicy::Unknown => EventTag::Unknown,
        }
    }
}

impl fmt::Display for AmbiguousTagPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmbiguousTagPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kill" => Ok(AmbiguousTagPolicy::Kill),
            "unknown" => Ok(AmbiguousTagPolicy::Unknown),
            other => Err(ConfigurationError::invalid(format!(
                "unknown ambiguous_tag policy '{other}' (expected 'kill' or 'unknown')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupingConfig {
    /// Largest gap, in seconds, between detections of the same event.
    pub grouping_delta_t: f64,
    pub multi_kill_threshold: u32,
    pub ambiguous_tag: AmbiguousTagPolicy,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            grouping_delta_t: 0.8,
            multi_kill_threshold: 3,
            ambiguous_tag: AmbiguousTagPolicy::Kill,
        }
    }
}

impl GroupingConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.grouping_delta_t.is_finite() || self.grouping_delta_t <= 0.0 {
            return Err(ConfigurationError::NonPositive {
                field: "grouping_delta_t",
                value: self.grouping_delta_t,
            });
        }
        if self.multi_kill_threshold < 2 {
            return Err(ConfigurationError::invalid(format!(
                "multi_kill_threshold must be at least 2, got {}",
                self.multi_kill_threshold
            )));
        }
        Ok(())
    }

    /// Number of consecutive empty samples an open event survives at `sample_fps`.
    pub fn empty_frame_tolerance(&self, sample_fps: f64) -> u32 {
        if !sample_fps.is_finite() || sample_fps <= 0.0 {
            return 0;
        }
        // The epsilon keeps 0.8 * 5.0 = 3.9999999999999996 from rounding down.
        (self.grouping_delta_t * sample_fps + 1e-9).floor() as u32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClippingConfig {
    pub enabled: bool,
    pub pre_padding_seconds: f64,
    pub post_padding_seconds: f64,
    pub cluster_threshold_seconds: f64,
    pub min_confidence: f64,
    pub min_box_count: u32,
    /// Empty means every tag is allowed.
    pub allowed_tags: BTreeSet<EventTag>,
    /// `None` or `Some(0)` leaves the number of clips uncapped.
    pub max_clips: Option<usize>,
}

impl Default for ClippingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pre_padding_seconds: 2.0,
            post_padding_seconds: 2.0,
            cluster_threshold_seconds: 5.0,
            min_confidence: 0.0,
            min_box_count: 1,
            allowed_tags: BTreeSet::new(),
            max_clips: None,
        }
    }
}

impl ClippingConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (field, value) in [
            ("pre_padding_seconds", self.pre_padding_seconds),
            ("post_padding_seconds", self.post_padding_seconds),
            ("cluster_threshold_seconds", self.cluster_threshold_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::invalid(format!(
                    "{field} must be a non-negative number of seconds, got {value}"
                )));
            }
        }
        if !self.min_confidence.is_finite() || !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigurationError::OutOfRange {
                field: "min_confidence",
                value: self.min_confidence,
            });
        }
        Ok(())
    }

    pub fn allows(&self, tag: EventTag) -> bool {
        self.allowed_tags.is_empty() || self.allowed_tags.contains(&tag)
    }

    pub fn clip_cap(&self) -> Option<usize> {
        self.max_clips.filter(|cap| *cap > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        GroupingConfig::default().validate().unwrap();
        ClippingConfig::default().validate().unwrap();
    }

    #[test]
    fn grouping_window_must_be_positive() {
        let config = GroupingConfig {
            grouping_delta_t: 0.0,
            ..GroupingConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::NonPositive { field: "grouping_delta_t", .. })
        ));
    }

    #[test]
    fn multi_kill_threshold_below_two_is_rejected() {
        let config = GroupingConfig {
            multi_kill_threshold: 1,
            ..GroupingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_frame_tolerance_scales_with_sampling_rate() {
        let config = GroupingConfig::default();
        assert_eq!(config.empty_frame_tolerance(3.0), 2);
        assert_eq!(config.empty_frame_tolerance(5.0), 4);
        assert_eq!(config.empty_frame_tolerance(1.0), 0);
        assert_eq!(config.empty_frame_tolerance(0.0), 0);
    }

    #[test]
    fn negative_padding_is_rejected() {
        let config = ClippingConfig {
            pre_padding_seconds: -1.0,
            ..ClippingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_tag_filter_allows_everything() {
        let mut config = ClippingConfig::default();
        assert!(EventTag::ALL.iter().all(|tag| config.allows(*tag)));
        config.allowed_tags.insert(EventTag::MultiKill);
        assert!(config.allows(EventTag::MultiKill));
        assert!(!config.allows(EventTag::Kill));
    }

    #[test]
    fn zero_clip_cap_means_uncapped() {
        let mut config = ClippingConfig::default();
        assert_eq!(config.clip_cap(), None);
        config.max_clips = Some(0);
        assert_eq!(config.clip_cap(), None);
        config.max_clips = Some(4);
        assert_eq!(config.clip_cap(), Some(4));
    }

    #[test]
    fn policy_parses() {
        assert_eq!(
            "Unknown".parse::<AmbiguousTagPolicy>().unwrap(),
            AmbiguousTagPolicy::Unknown
        );
        assert!("maybe".parse::<AmbiguousTagPolicy>().is_err());
    }
}
