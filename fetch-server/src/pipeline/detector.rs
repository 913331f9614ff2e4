//! Completion detection for fetch-tool output.
//!
//! A tool exiting does not mean its files are closed and visible: merges,
//! buffered writers and network filesystems can all lag. The detector polls
//! the working directory and only reports artifacts once the matched set and
//! every file size are unchanged across two consecutive polls.

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::pipeline::naming::NamingPattern;
use crate::pipeline::selector::{SelectedFile, select};
use crate::{Error, Result};

/// Timing bounds for one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    /// Give up with [`Error::Timeout`] once this much time has passed.
    pub max_wait: Duration,
    /// If nothing at all has matched after this long, report
    /// [`Error::NoArtifactsProduced`] instead of waiting out `max_wait`.
    pub no_output_grace: Duration,
}

/// Wait until files matching `pattern` exist under `dir` and have stopped changing.
///
/// Returns as soon as the stability predicate holds: with artifacts complete at
/// time `t`, the call returns before `t + 2 * poll_interval`.
pub async fn await_artifacts(
    dir: &Path,
    pattern: &NamingPattern,
    policy: &WaitPolicy,
) -> Result<Vec<SelectedFile>> {
    let start = Instant::now();
    let deadline = start + policy.max_wait;
    let mut previous: Option<Vec<SelectedFile>> = None;
    let mut polls = 0u32;

    loop {
        let current = select(dir, pattern).await?;
        polls += 1;
        trace!(polls, matched = current.len(), "Polled for artifacts");

        if !current.is_empty() && previous.as_ref() == Some(&current) {
            debug!(
                count = current.len(),
                polls,
                elapsed = ?start.elapsed(),
                pattern = %pattern,
                "Artifacts stable"
            );
            return Ok(current);
        }

        let now = Instant::now();
        if current.is_empty() && now.duration_since(start) >= policy.no_output_grace {
            return Err(Error::NoArtifactsProduced {
                pattern: pattern.to_string(),
            });
        }
        if now >= deadline {
            return Err(if current.is_empty() {
                Error::NoArtifactsProduced {
                    pattern: pattern.to_string(),
                }
            } else {
                Error::Timeout {
                    pattern: pattern.to_string(),
                    waited: now.duration_since(start),
                }
            });
        }

        previous = Some(current);
        tokio::time::sleep(policy.poll_interval.min(deadline - now)).await;
    }
}
