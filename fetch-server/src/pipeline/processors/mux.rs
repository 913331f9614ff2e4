//! Stream mux with ffmpeg.
//!
//! Combines a video-only and an audio-only input into one mp4. The video
//! stream is copied as-is; audio is transcoded to AAC so the container is
//! always playable.

use std::path::Path;

use tracing::info;

use crate::config::ToolConfig;
use crate::pipeline::runner::ProcessRunner;
use crate::{Error, Result};

const AUDIO_CODEC: &str = "aac";
const AUDIO_BITRATE: &str = "192k";

#[derive(Debug, Clone)]
pub struct MuxProcessor {
    tool: ToolConfig,
    runner: ProcessRunner,
}

impl MuxProcessor {
    pub fn new(tool: ToolConfig, runner: ProcessRunner) -> Self {
        Self { tool, runner }
    }

    /// Build ffmpeg arguments for muxing `video` and `audio` into `output`.
    pub fn build_args(&self, video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-nostats".to_string(),
        ];
        args.extend(["-loglevel".to_string(), "error".to_string()]);
        args.extend(["-i".to_string(), video.to_string_lossy().into_owned()]);
        args.extend(["-i".to_string(), audio.to_string_lossy().into_owned()]);

        // First video stream of input 0, first audio stream of input 1
        args.extend(["-map".to_string(), "0:v:0".to_string()]);
        args.extend(["-map".to_string(), "1:a:0".to_string()]);

        args.extend(["-c:v".to_string(), "copy".to_string()]);
        args.extend(["-c:a".to_string(), AUDIO_CODEC.to_string()]);
        args.extend(["-b:a".to_string(), AUDIO_BITRATE.to_string()]);

        // Move moov atom to the front so playback can start before the download ends
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);

        args.push(output.to_string_lossy().into_owned());
        args
    }

    /// Mux `video` and `audio` into `output`. Fails with [`Error::Mux`].
    ///
    /// `fetch_stderr` is the fetch stage's diagnostic output, carried on the
    /// error so a bad input can be traced back to its download.
    pub async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        working_dir: &Path,
        fetch_stderr: &str,
    ) -> Result<()> {
        let start = std::time::Instant::now();
        let args = self.build_args(video, audio, output);

        match self.runner.run(&self.tool, &args, working_dir).await {
            Ok(_) => {
                info!(
                    output = %output.display(),
                    elapsed = ?start.elapsed(),
                    "Mux completed"
                );
                Ok(())
            }
            Err(Error::Process {
                exit_code, stderr, ..
            }) => Err(Error::Mux {
                exit_code,
                stderr,
                fetch_stderr: fetch_stderr.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}
