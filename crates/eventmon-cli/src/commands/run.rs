//! Run command - feed newline-delimited JSON notifications into a recorder.
//!
//! Each stdin line is one notification:
//!
//! ```text
//! {"kind":"ssh","valid_principals":["alice"],"valid_before":1700005400}
//! {"kind":"x509","common_name":"build.example.com","not_after":1700086400}
//! ```
//!
//! At end of input (or Ctrl-C) the recorder is shut down, which flushes a
//! pending save before the command returns.

use anyhow::Context;
use eventmon_config::Config;
use eventmon_recorder::{EventRecorder, Notification, RecorderResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config_bridge::to_recorder_config;
use crate::theme::Theme;

/// Line counts for one run.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct IngestStats {
    pub(crate) accepted: u64,
    pub(crate) rejected: u64,
}

/// Parse one input line. Blank lines yield `None`.
pub(crate) fn parse_line(line: &str) -> serde_json::Result<Option<Notification>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Start a recorder on the configured history file and feed it stdin.
pub(crate) async fn run_recorder(config: &Config) -> anyhow::Result<()> {
    let path = config.recorder.history_path()?;
    let (handle, task) = EventRecorder::open(&path, to_recorder_config(config))
        .with_context(|| format!("opening history {}", path.display()))?;
    info!(path = %path.display(), "Reading issuance notifications from stdin");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stats = IngestStats::default();
    tokio::select! {
        result = ingest(stdin, &mut stats, |n| handle.record(n)) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping recorder");
        }
    }

    drop(handle);
    task.await.context("recorder task failed")?;

    eprintln!(
        "{}",
        Theme::success(&format!(
            "Recorded {} notifications into {}",
            stats.accepted,
            path.display()
        ))
    );
    if stats.rejected > 0 {
        eprintln!(
            "{}",
            Theme::warning(&format!("Skipped {} malformed lines", stats.rejected))
        );
    }
    Ok(())
}

/// Read notifications from `reader` until end of input, handing each to
/// `record`. Malformed lines are logged and skipped.
///
/// Counts land in `stats` as lines are processed, so they stay valid if the
/// future is dropped part way through.
pub(crate) async fn ingest<R, F, Fut>(
    reader: R,
    stats: &mut IngestStats,
    mut record: F,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(Notification) -> Fut,
    Fut: Future<Output = RecorderResult<()>>,
{
    let mut lines = reader.lines();
    let mut line_no: u64 = 0;

    while let Some(line) = lines.next_line().await.context("reading input")? {
        line_no = line_no.saturating_add(1);
        match parse_line(&line) {
            Ok(Some(notification)) => {
                record(notification).await?;
                stats.accepted = stats.accepted.saturating_add(1);
            },
            Ok(None) => {},
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed notification");
                stats.rejected = stats.rejected.saturating_add(1);
            },
        }
    }
    Ok(())
}
