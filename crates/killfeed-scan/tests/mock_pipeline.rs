use std::fs;
use std::path::Path;

use killfeed_scan::analyze_video;
use killfeed_scan::cli::{Command, parse_cli_from};
use killfeed_scan::output::ExportKind;
use killfeed_scan::pipeline::Shutdown;
use killfeed_scan::settings::{EffectiveSettings, resolve_settings};
use killfeed_types::EventTag;

fn settings(dir: &Path, config: &str, extra: &[&str]) -> EffectiveSettings {
    let config_path = dir.join("killfeed.toml");
    fs::write(&config_path, config).unwrap();
    let mut args = vec![
        "killfeed-scan".to_string(),
        "analyze".to_string(),
        "match01.mp4".to_string(),
        "--backend".to_string(),
        "mock".to_string(),
        "--config".to_string(),
        config_path.display().to_string(),
    ];
    args.extend(extra.iter().map(|arg| arg.to_string()));
    let (cli, sources) = parse_cli_from(args).unwrap();
    let Command::Analyze { options, .. } = cli.command else {
        panic!("expected analyze command");
    };
    resolve_settings(&options, &sources).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn mock_video_is_indexed_and_exported() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), "output_folder = \"exports\"\n", &["--clip"]);

    let report = analyze_video(Path::new("match01.mp4"), &settings, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(report.video_id, "match01");
    assert_eq!(report.backend.as_deref(), Some("mock"));
    assert!(!report.interrupted);
    assert_eq!(report.frames_sampled, 30);

    assert_eq!(report.events.len(), 2);
    let kill = &report.events[0];
    assert_eq!(kill.tag, EventTag::Kill);
    assert_eq!(kill.start_frame, 30);
    assert_eq!(kill.box_count, 1);
    let multi = &report.events[1];
    assert_eq!(multi.tag, EventTag::MultiKill);
    assert_eq!((multi.start_frame, multi.end_frame), (150, 170));
    assert_eq!(multi.box_count, 6);
    assert_eq!((multi.stack_slot_min, multi.stack_slot_max), (0, 2));
    assert!(report.events.windows(2).all(|w| w[0].end_time < w[1].start_time));

    let clips = report.clips.as_ref().unwrap();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].label(), "KILLx2");
    assert_eq!(clips[0].window_start, 0.0);
    assert_eq!(clips[0].file_stem("match01", 0), "match01_000_KILLx2_0000s");

    let out = dir.path().join("exports");
    let kinds: Vec<ExportKind> = report.outputs.iter().map(|file| file.kind).collect();
    assert_eq!(
        kinds,
        vec![ExportKind::Csv, ExportKind::EventsJson, ExportKind::ClipsJson]
    );
    assert!(report.outputs.iter().all(|file| file.path.starts_with(&out)));

    let csv = fs::read_to_string(out.join("match01_events.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some(
            "video_id,start_frame,end_frame,start_time,end_time,box_count,stack_slot_min,stack_slot_max,tag_guess,confidence"
        )
    );
    assert_eq!(lines.count(), 2);

    let clips_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("match01_clips.json")).unwrap())
            .unwrap();
    assert_eq!(clips_json["total_clips"], 1);
    assert_eq!(clips_json["clips"][0]["event_count"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn clipping_disabled_skips_clip_export() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let out_arg = out.display().to_string();
    let settings = settings(dir.path(), "", &["--output-dir", &out_arg]);

    let report = analyze_video(Path::new("match01.mp4"), &settings, &Shutdown::never())
        .await
        .unwrap();

    assert!(report.clips.is_none());
    assert_eq!(report.outputs.len(), 2);
    assert!(out.join("match01_events.json").exists());
    assert!(!out.join("match01_clips.json").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_run_still_reports() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), "output_folder = \"exports\"\n", &["--clip"]);
    let (trigger, shutdown) = Shutdown::channel();
    trigger.send(true).unwrap();

    let report = analyze_video(Path::new("match01.mp4"), &settings, &shutdown)
        .await
        .unwrap();

    assert!(report.interrupted);
    assert!(report.events.is_empty());
    assert_eq!(report.clips.as_deref().map(<[_]>::len), Some(0));
    assert!(report.outputs.is_empty());
    assert!(!dir.path().join("exports").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn crops_are_dumped_for_frames_with_boxes() {
    let dir = tempfile::tempdir().unwrap();
    let dumps = dir.path().join("dumps");
    let dumps_arg = dumps.display().to_string();
    let settings = settings(
        dir.path(),
        "output_folder = \"exports\"\n",
        &["--dump-dir", &dumps_arg, "--dump-format", "jpeg"],
    );

    analyze_video(Path::new("match01.mp4"), &settings, &Shutdown::never())
        .await
        .unwrap();

    assert!(dumps.join("frame_000030.jpg").exists());
    assert!(dumps.join("frame_000160.jpg").exists());
    assert!(!dumps.join("frame_000000.jpg").exists());
}
