use std::fs;
use std::path::Path;

use killfeed_scan::cli::{Command, DumpFormat, parse_cli_from};
use killfeed_scan::settings::{ConfigError, EffectiveSettings, resolve_settings};
use killfeed_types::{ConfigurationError, EventTag};

fn resolve(config: &Path, extra: &[&str]) -> Result<EffectiveSettings, ConfigError> {
    let mut args = vec![
        "killfeed-scan".to_string(),
        "batch".to_string(),
        "videos".to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ];
    args.extend(extra.iter().map(|arg| arg.to_string()));
    let (cli, sources) = parse_cli_from(args).unwrap();
    let Command::Batch { options, .. } = cli.command else {
        panic!("expected batch command");
    };
    resolve_settings(&options, &sources)
}

const FULL_CONFIG: &str = r#"
output_folder = "exports"
video_extensions = [".mp4", ".webm"]

[detection]
roi_x_percent = 0.6
roi_y_percent = 0.0
roi_width_percent = 0.4
roi_height_percent = 0.3
brightness_threshold = 180
min_area = 50
max_area = 8000
use_morphology = false
stack_anchor = "left"
sample_fps = 5.0
grouping_delta_t = 1.2
min_boxes_for_multikill = 4
ambiguous_tag = "unknown"

[clipping]
enabled = true
pre_padding_seconds = 1.0
allowed_tags = ["MULTI_KILL"]
max_clips = 3

[export]
export_csv = false
pretty_json = false

[debug]
dump_dir = "crops"
dump_format = "jpeg"

[decoder]
backend = "mock"
channel_capacity = 4
"#;

#[test]
fn file_values_are_loaded_and_paths_resolved_against_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("scan.toml");
    fs::write(&config, FULL_CONFIG).unwrap();

    let settings = resolve(&config, &[]).unwrap();

    assert_eq!(settings.config_path.as_deref(), Some(config.as_path()));
    assert_eq!(settings.export.output_dir, dir.path().join("exports"));
    assert!(!settings.export.csv);
    assert!(settings.export.json);
    assert!(!settings.export.pretty_json);
    assert_eq!(settings.video_extensions, vec![".mp4", ".webm"]);

    let options = &settings.detection.options;
    assert_eq!(options.roi.x, 0.6);
    assert_eq!(options.brightness_threshold, 180);
    assert_eq!((options.min_area, options.max_area), (50, 8000));
    assert!(options.morphology_kernel.is_none());
    assert_eq!(options.anchor.as_str(), "left");
    assert_eq!(settings.detection.sample_fps, 5.0);

    assert_eq!(settings.grouping.grouping_delta_t, 1.2);
    assert_eq!(settings.grouping.multi_kill_threshold, 4);
    assert_eq!(settings.grouping.ambiguous_tag.tag(), EventTag::Unknown);

    assert!(settings.clipping.enabled);
    assert_eq!(settings.clipping.pre_padding_seconds, 1.0);
    assert!(settings.clipping.allows(EventTag::MultiKill));
    assert!(!settings.clipping.allows(EventTag::Kill));
    assert_eq!(settings.clipping.clip_cap(), Some(3));

    let dump = settings.image_dump.unwrap();
    assert_eq!(dump.dir, dir.path().join("crops"));
    assert_eq!(dump.format, DumpFormat::Jpeg);

    assert_eq!(settings.decoder.backend.as_deref(), Some("mock"));
    assert_eq!(settings.decoder.channel_capacity, Some(4));
}

#[test]
fn command_line_values_override_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("scan.toml");
    fs::write(&config, FULL_CONFIG).unwrap();

    let settings = resolve(
        &config,
        &["--sample-fps", "2", "--output-dir", "elsewhere", "--dump-format", "png"],
    )
    .unwrap();

    assert_eq!(settings.detection.sample_fps, 2.0);
    assert_eq!(settings.export.output_dir, Path::new("elsewhere"));
    assert_eq!(settings.image_dump.unwrap().format, DumpFormat::Png);
}

#[test]
fn missing_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = resolve(&dir.path().join("absent.toml"), &[]).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[detection\nsample_fps = ").unwrap();
    let err = resolve(&config, &[]).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn invalid_parameters_are_rejected_before_any_frame() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[detection]\nmulti_kill_threshold = 1\n").unwrap();
    let err = resolve(&config, &[]).unwrap_err();
    assert!(matches!(err, ConfigError::Rejected { .. }));

    fs::write(&config, "[clipping]\nmin_confidence = 1.5\n").unwrap();
    let err = resolve(&config, &[]).unwrap_err();
    assert!(matches!(err, ConfigError::Rejected { .. }));

    for toml in [
        "[detection]\nbrightness_threshold = 0\n",
        "[detection]\nmin_area = 0\n",
    ] {
        fs::write(&config, toml).unwrap();
        let err = resolve(&config, &[]).unwrap_err();
        assert!(
            matches!(
                err,
                ConfigError::Rejected {
                    source: ConfigurationError::NonPositive { .. },
                    ..
                }
            ),
            "{toml}: {err:?}"
        );
    }
}
