use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use directories::{BaseDirs, ProjectDirs};
use killfeed_detector::{DetectionOptions, StackAnchor};
use killfeed_indexer::{AmbiguousTagPolicy, ClippingConfig, GroupingConfig};
use killfeed_types::{ConfigurationError, EventTag};
use serde::Deserialize;

use crate::cli::{CliSources, DumpFormat, RunOptions};

const PROJECT_CONFIG_FILE: &str = "killfeed.toml";
const DEFAULT_OUTPUT_FOLDER: &str = "output";
const DEFAULT_VIDEO_EXTENSIONS: [&str; 5] = [".mp4", ".mkv", ".avi", ".mov", ".DVR.mp4"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    output_folder: Option<String>,
    video_extensions: Option<Vec<String>>,
    detection: Option<DetectionFileConfig>,
    clipping: Option<ClippingFileConfig>,
    export: Option<ExportFileConfig>,
    debug: Option<DebugFileConfig>,
    decoder: Option<DecoderFileConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DetectionFileConfig {
    roi_x_percent: Option<f64>,
    roi_y_percent: Option<f64>,
    roi_width_percent: Option<f64>,
    roi_height_percent: Option<f64>,
    brightness_threshold: Option<i64>,
    min_area: Option<u64>,
    max_area: Option<u64>,
    aspect_ratio_min: Option<f64>,
    aspect_ratio_max: Option<f64>,
    use_morphology: Option<bool>,
    morph_kernel_size: Option<usize>,
    stack_anchor: Option<String>,
    sample_fps: Option<f64>,
    grouping_delta_t: Option<f64>,
    #[serde(alias = "min_boxes_for_multikill")]
    multi_kill_threshold: Option<u32>,
    ambiguous_tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClippingFileConfig {
    enabled: Option<bool>,
    pre_padding_seconds: Option<f64>,
    post_padding_seconds: Option<f64>,
    cluster_threshold_seconds: Option<f64>,
    min_confidence: Option<f64>,
    min_box_count: Option<u32>,
    allowed_tags: Option<Vec<String>>,
    max_clips: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExportFileConfig {
    export_csv: Option<bool>,
    export_json: Option<bool>,
    pretty_json: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DebugFileConfig {
    dump_dir: Option<String>,
    dump_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DecoderFileConfig {
    backend: Option<String>,
    channel_capacity: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub detection: DetectionSettings,
    pub grouping: GroupingConfig,
    pub clipping: ClippingConfig,
    pub export: ExportSettings,
    pub image_dump: Option<ImageDumpSettings>,
    pub decoder: DecoderSettings,
    pub video_extensions: Vec<String>,
    pub verbose: bool,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub options: DetectionOptions,
    pub sample_fps: f64,
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub output_dir: PathBuf,
    pub csv: bool,
    pub json: bool,
    pub pretty_json: bool,
}

#[derive(Debug, Clone)]
pub struct ImageDumpSettings {
    pub dir: PathBuf,
    pub format: DumpFormat,
}

#[derive(Debug, Clone, Default)]
pub struct DecoderSettings {
    pub backend: Option<String>,
    pub channel_capacity: Option<usize>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
    Rejected {
        path: Option<PathBuf>,
        source: ConfigurationError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
            ConfigError::Rejected { path, source } => {
                if let Some(path) = path {
                    write!(f, "invalid configuration in {}: {}", path.display(), source)
                } else {
                    write!(f, "invalid configuration: {}", source)
                }
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Rejected { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &RunOptions,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = read_config(&path)?;
        return Ok((config, Some(path)));
    }

    if let Some(project_path) = project_config_path()
        && project_path.exists()
    {
        let config = read_config(&project_path)?;
        return Ok((config, Some(project_path)));
    }

    let Some(default_path) = default_config_path() else {
        return Ok((FileConfig::default(), None));
    };
    if !default_path.exists() {
        return Ok((FileConfig::default(), None));
    }
    let config = read_config(&default_path)?;
    Ok((config, Some(default_path)))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &RunOptions,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let FileConfig {
        output_folder: file_output_folder,
        video_extensions: file_video_extensions,
        detection: file_detection,
        clipping: file_clipping,
        export: file_export,
        debug: file_debug,
        decoder: file_decoder,
    } = file;
    let file_detection = file_detection.unwrap_or_default();
    let file_clipping = file_clipping.unwrap_or_default();
    let file_export = file_export.unwrap_or_default();
    let file_debug = file_debug.unwrap_or_default();
    let file_decoder = file_decoder.unwrap_or_default();

    let invalid = |field: &'static str, value: String| ConfigError::InvalidValue {
        path: config_path.clone(),
        field,
        value,
    };
    let rejected = |source: ConfigurationError| ConfigError::Rejected {
        path: config_path.clone(),
        source,
    };

    let options = detection_options(&file_detection, &invalid)?;
    options.validate().map_err(rejected)?;

    let mut sample_fps = cli.sample_fps;
    if !sources.sample_fps_from_cli
        && let Some(value) = file_detection.sample_fps
    {
        sample_fps = value;
    }
    if !sample_fps.is_finite() || sample_fps <= 0.0 {
        return Err(ConfigError::InvalidValue {
            path: if sources.sample_fps_from_cli {
                None
            } else {
                config_path.clone()
            },
            field: "sample_fps",
            value: sample_fps.to_string(),
        });
    }

    let mut grouping = GroupingConfig::default();
    if let Some(value) = file_detection.grouping_delta_t {
        grouping.grouping_delta_t = value;
    }
    if let Some(value) = file_detection.multi_kill_threshold {
        grouping.multi_kill_threshold = value;
    }
    if let Some(value) = normalize_string(file_detection.ambiguous_tag.clone()) {
        grouping.ambiguous_tag = value
            .parse::<AmbiguousTagPolicy>()
            .map_err(|_| invalid("ambiguous_tag", value))?;
    }
    grouping.validate().map_err(rejected)?;

    let clipping = clipping_config(file_clipping, cli, sources, &invalid)?;
    clipping.validate().map_err(rejected)?;

    let output_dir = match cli.output_dir.clone() {
        Some(dir) => expand_pathbuf(dir),
        None => normalize_string(file_output_folder)
            .and_then(|dir| resolve_path_from_config(dir, config_dir.as_deref()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FOLDER)),
    };
    let export = ExportSettings {
        output_dir,
        csv: file_export.export_csv.unwrap_or(true),
        json: file_export.export_json.unwrap_or(true),
        pretty_json: file_export.pretty_json.unwrap_or(true),
    };

    let mut dump_format = cli.dump_format;
    if !sources.dump_format_from_cli
        && let Some(value) = normalize_string(file_debug.dump_format)
    {
        dump_format = parse_dump_format(&value, config_path.as_ref())?;
    }
    let image_dump = match cli.dump_dir.clone() {
        Some(dir) => Some(expand_pathbuf(dir)),
        None => normalize_string(file_debug.dump_dir)
            .and_then(|dir| resolve_path_from_config(dir, config_dir.as_deref())),
    }
    .map(|dir| ImageDumpSettings {
        dir,
        format: dump_format,
    });

    let mut backend = normalize_string(cli.backend.clone());
    if backend.is_none() {
        backend = normalize_string(file_decoder.backend);
    }

    let mut channel_capacity = cli.decoder_channel_capacity;
    if let Some(0) = channel_capacity {
        return Err(ConfigError::InvalidValue {
            path: None,
            field: "decoder_channel_capacity",
            value: "0".to_string(),
        });
    }
    if channel_capacity.is_none()
        && let Some(value) = file_decoder.channel_capacity
    {
        if value == 0 {
            return Err(invalid("channel_capacity", value.to_string()));
        }
        channel_capacity = Some(value);
    }

    let video_extensions = file_video_extensions
        .map(|list| {
            list.into_iter()
                .filter_map(|ext| normalize_string(Some(ext)))
                .collect::<Vec<_>>()
        })
        .filter(|list| !list.is_empty())
        .unwrap_or_else(|| {
            DEFAULT_VIDEO_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect()
        });

    Ok(EffectiveSettings {
        detection: DetectionSettings {
            options,
            sample_fps,
        },
        grouping,
        clipping,
        export,
        image_dump,
        decoder: DecoderSettings {
            backend,
            channel_capacity,
        },
        video_extensions,
        verbose: cli.verbose,
        config_path,
    })
}

fn detection_options(
    file: &DetectionFileConfig,
    invalid: &impl Fn(&'static str, String) -> ConfigError,
) -> Result<DetectionOptions, ConfigError> {
    let mut options = DetectionOptions::default();
    let roi = &mut options.roi;
    if let Some(value) = file.roi_x_percent {
        roi.x = value;
    }
    if let Some(value) = file.roi_y_percent {
        roi.y = value;
    }
    if let Some(value) = file.roi_width_percent {
        roi.width = value;
    }
    if let Some(value) = file.roi_height_percent {
        roi.height = value;
    }

    if let Some(value) = file.brightness_threshold {
        options.brightness_threshold = u8::try_from(value)
            .map_err(|_| invalid("brightness_threshold", value.to_string()))?;
    }
    if let Some(value) = file.min_area {
        options.min_area = value;
    }
    if let Some(value) = file.max_area {
        options.max_area = value;
    }
    if let Some(value) = file.aspect_ratio_min {
        options.aspect_ratio_min = Some(value);
    }
    if let Some(value) = file.aspect_ratio_max {
        options.aspect_ratio_max = Some(value);
    }
    if let Some(value) = file.morph_kernel_size {
        options.morphology_kernel = Some(value);
    }
    if file.use_morphology == Some(false) {
        options.morphology_kernel = None;
    }
    if let Some(value) = normalize_string(file.stack_anchor.clone()) {
        options.anchor = value
            .parse::<StackAnchor>()
            .map_err(|_| invalid("stack_anchor", value))?;
    }
    Ok(options)
}

fn clipping_config(
    file: ClippingFileConfig,
    cli: &RunOptions,
    sources: &CliSources,
    invalid: &impl Fn(&'static str, String) -> ConfigError,
) -> Result<ClippingConfig, ConfigError> {
    let mut clipping = ClippingConfig::default();
    if let Some(value) = file.enabled {
        clipping.enabled = value;
    }
    if sources.clip_from_cli && cli.clip {
        clipping.enabled = true;
    }
    if let Some(value) = file.pre_padding_seconds {
        clipping.pre_padding_seconds = value;
    }
    if let Some(value) = file.post_padding_seconds {
        clipping.post_padding_seconds = value;
    }
    if let Some(value) = file.cluster_threshold_seconds {
        clipping.cluster_threshold_seconds = value;
    }
    if let Some(value) = file.min_confidence {
        clipping.min_confidence = value;
    }
    if let Some(value) = file.min_box_count {
        clipping.min_box_count = value;
    }
    if let Some(tags) = file.allowed_tags {
        let mut allowed = BTreeSet::new();
        for raw in tags {
            let tag = raw
                .parse::<EventTag>()
                .map_err(|_| invalid("allowed_tags", raw.clone()))?;
            allowed.insert(tag);
        }
        clipping.allowed_tags = allowed;
    }
    clipping.max_clips = file.max_clips;
    Ok(clipping)
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "killfeed-scan", "killfeed-scan")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir()
        .ok()
        .map(|dir| dir.join(PROJECT_CONFIG_FILE))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/")
        && let Some(base) = BaseDirs::new()
    {
        return base.home_dir().join(stripped);
    }
    PathBuf::from(value)
}

fn parse_dump_format(value: &str, path: Option<&PathBuf>) -> Result<DumpFormat, ConfigError> {
    DumpFormat::from_str(value, true).map_err(|_| ConfigError::InvalidValue {
        path: path.cloned(),
        field: "dump_format",
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Command, parse_cli_from};

    fn settings_from(toml: &str, extra_args: &[&str]) -> Result<EffectiveSettings, ConfigError> {
        let mut args = vec!["killfeed-scan", "analyze", "match.mp4"];
        args.extend_from_slice(extra_args);
        let (cli, sources) = parse_cli_from(args).unwrap();
        let Command::Analyze { options, .. } = cli.command else {
            panic!("expected analyze");
        };
        let file: FileConfig = toml::from_str(toml).unwrap();
        merge(&options, &sources, file, Some(PathBuf::from("/etc/killfeed/config.toml")))
    }

    #[test]
    fn empty_file_yields_defaults() {
        let settings = settings_from("", &[]).unwrap();
        assert_eq!(settings.detection.options, DetectionOptions::default());
        assert_eq!(settings.detection.sample_fps, 3.0);
        assert_eq!(settings.grouping, GroupingConfig::default());
        assert_eq!(settings.clipping, ClippingConfig::default());
        assert_eq!(settings.export.output_dir, PathBuf::from("output"));
        assert!(settings.export.csv && settings.export.json && settings.export.pretty_json);
        assert!(settings.image_dump.is_none());
        assert_eq!(settings.video_extensions.len(), 5);
    }

    #[test]
    fn file_sections_are_applied() {
        let settings = settings_from(
            r#"
            output_folder = "exports"
            video_extensions = [".mp4", "  "]

            [detection]
            roi_x_percent = 0.6
            roi_y_percent = 0.0
            roi_width_percent = 0.4
            roi_height_percent = 0.3
            brightness_threshold = 180
            use_morphology = false
            stack_anchor = "left"
            sample_fps = 5.0
            grouping_delta_t = 1.2
            min_boxes_for_multikill = 4
            ambiguous_tag = "unknown"

            [clipping]
            enabled = true
            allowed_tags = ["MULTI_KILL"]
            max_clips = 3

            [export]
            export_csv = false

            [debug]
            dump_dir = "crops"
            dump_format = "jpeg"

            [decoder]
            backend = "mock"
            channel_capacity = 4
            "#,
            &[],
        )
        .unwrap();

        let options = &settings.detection.options;
        assert_eq!(options.roi.x, 0.6);
        assert_eq!(options.brightness_threshold, 180);
        assert_eq!(options.morphology_kernel, None);
        assert_eq!(options.anchor, StackAnchor::Left);
        assert_eq!(settings.detection.sample_fps, 5.0);
        assert_eq!(settings.grouping.grouping_delta_t, 1.2);
        assert_eq!(settings.grouping.multi_kill_threshold, 4);
        assert_eq!(settings.grouping.ambiguous_tag, AmbiguousTagPolicy::Unknown);
        assert!(settings.clipping.enabled);
        assert!(settings.clipping.allows(EventTag::MultiKill));
        assert!(!settings.clipping.allows(EventTag::Kill));
        assert_eq!(settings.clipping.max_clips, Some(3));
        assert_eq!(settings.export.output_dir, PathBuf::from("/etc/killfeed/exports"));
        assert!(!settings.export.csv);
        let dump = settings.image_dump.unwrap();
        assert_eq!(dump.dir, PathBuf::from("/etc/killfeed/crops"));
        assert_eq!(dump.format, DumpFormat::Jpeg);
        assert_eq!(settings.decoder.backend.as_deref(), Some("mock"));
        assert_eq!(settings.decoder.channel_capacity, Some(4));
        assert_eq!(settings.video_extensions, vec![".mp4".to_string()]);
    }

    #[test]
    fn command_line_values_win_only_when_given() {
        let toml = r#"
            [detection]
            sample_fps = 6.0
            [debug]
            dump_format = "jpeg"
        "#;
        let settings = settings_from(toml, &[]).unwrap();
        assert_eq!(settings.detection.sample_fps, 6.0);

        let settings = settings_from(
            toml,
            &["--sample-fps", "2", "--dump-format", "png", "--dump-dir", "/tmp/d"],
        )
        .unwrap();
        assert_eq!(settings.detection.sample_fps, 2.0);
        let dump = settings.image_dump.unwrap();
        assert_eq!(dump.format, DumpFormat::Png);
        assert_eq!(dump.dir, PathBuf::from("/tmp/d"));
    }

    #[test]
    fn clip_flag_enables_clipping() {
        let settings = settings_from("[clipping]\nenabled = false\n", &["--clip"]).unwrap();
        assert!(settings.clipping.enabled);
    }

    #[test]
    fn out_of_range_roi_is_rejected() {
        let err = settings_from("[detection]\nroi_x_percent = 1.5\n", &[]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Rejected {
                source: ConfigurationError::OutOfRange { .. },
                ..
            }
        ));
    }

    #[test]
    fn invalid_values_name_their_field() {
        let cases = [
            ("[detection]\nbrightness_threshold = 300\n", "brightness_threshold"),
            ("[detection]\nstack_anchor = \"top\"\n", "stack_anchor"),
            ("[detection]\nsample_fps = 0.0\n", "sample_fps"),
            ("[clipping]\nallowed_tags = [\"HEADSHOT\"]\n", "allowed_tags"),
            ("[debug]\ndump_format = \"gif\"\n", "dump_format"),
            ("[decoder]\nchannel_capacity = 0\n", "channel_capacity"),
        ];
        for (toml, expected) in cases {
            match settings_from(toml, &[]) {
                Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected invalid {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn multi_kill_threshold_below_two_is_rejected() {
        let err = settings_from("[detection]\nmulti_kill_threshold = 1\n", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Rejected { .. }));
    }
}
