use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Lists the files directly inside `folder` whose name ends with one of
/// `extensions`, compared case-insensitively, in sorted order.
pub fn discover_videos(folder: &Path, extensions: &[String]) -> io::Result<Vec<PathBuf>> {
    let suffixes: Vec<String> = extensions
        .iter()
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();

    let mut videos = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let name = name.to_ascii_lowercase();
        if suffixes.iter().any(|suffix| name.ends_with(suffix.as_str())) {
            videos.push(path);
        }
    }
    videos.sort();
    videos.dedup();
    Ok(videos)
}

/// Identifier used in export file names: the file name without its last extension.
pub fn video_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions() -> Vec<String> {
        [".mp4", ".mkv", ".DVR.mp4"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn matches_suffixes_case_insensitively_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.MP4", "a.mkv", "c.DVR.mp4", "notes.txt", "d.mp4.part"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.mp4")).unwrap();

        let videos = discover_videos(dir.path(), &extensions()).unwrap();
        let names: Vec<String> = videos
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.mkv", "b.MP4", "c.DVR.mp4"]);
    }

    #[test]
    fn empty_folder_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_videos(dir.path(), &extensions()).unwrap().is_empty());
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_videos(&dir.path().join("absent"), &extensions()).is_err());
    }

    #[test]
    fn video_id_drops_the_last_extension() {
        assert_eq!(video_id(Path::new("/videos/match01.mp4")), "match01");
        assert_eq!(video_id(Path::new("round.DVR.mp4")), "round.DVR");
    }
}
