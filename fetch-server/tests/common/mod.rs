//! Shared fixtures: stand-in fetch and mux tools built on `sh -c`.
//!
//! The stand-in fetch tool understands the same `--output` template tokens
//! as the real one. `render <index> <title>` expands the template into the
//! file name the real tool would write.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use fetch_server::config::{DetectorConfig, PipelineConfig, ToolConfig};
use fetch_server::pipeline::WorkspaceMode;

const FETCH_PRELUDE: &str = r#"
out=""
url=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    --) url="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case "$out" in
  *.audio.*) ext=m4a ;;
  *) ext=mp4 ;;
esac
render() {
  printf '%s' "$out" | sed -e "s/%(playlist_index)02d/$1/" -e "s/%(title)s/$2/" -e "s/%(ext)s/$ext/" -e 's/%%/%/g'
}
"#;

/// A fetch tool running `body` after the argument prelude.
pub fn fake_fetch(body: &str) -> ToolConfig {
    let script = format!("{}\n{}", FETCH_PRELUDE, body);
    ToolConfig::new("sh").with_base_args(["-c".to_string(), script, "yt-dlp".to_string()])
}

/// A mux tool; `$out` is its output path.
pub fn fake_mux(body: &str) -> ToolConfig {
    let script = format!("for out; do :; done\n{}", body);
    ToolConfig::new("sh").with_base_args(["-c".to_string(), script, "ffmpeg".to_string()])
}

pub fn pipeline_config(root: &Path, fetch: ToolConfig, mux: ToolConfig) -> PipelineConfig {
    PipelineConfig {
        work_dir: root.to_path_buf(),
        workspace_mode: WorkspaceMode::Scoped,
        fetch_tool: fetch,
        mux_tool: mux,
        detector: DetectorConfig {
            poll_interval: Duration::from_millis(50),
            single_max_wait: Duration::from_secs(5),
            playlist_base_wait: Duration::from_secs(5),
            playlist_per_item_wait: Duration::from_secs(1),
            playlist_max_wait: Duration::from_secs(5),
            no_output_grace: Duration::from_millis(300),
        },
        ..PipelineConfig::default()
    }
}

/// Names of everything left under `dir`.
pub fn leftovers(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Like [`leftovers`], but gives background disposal of dropped jobs up to
/// two seconds to empty `dir` first.
pub async fn settled_leftovers(dir: &Path) -> Vec<String> {
    for _ in 0..100 {
        let names = leftovers(dir);
        if names.is_empty() {
            return names;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    leftovers(dir)
}

/// `(name, bytes)` of every entry in a zip archive.
pub fn zip_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (entry.name().to_string(), data)
        })
        .collect()
}
