//! Mirror the device file tree into a local directory.
//!
//! The walk is depth-first from `/`, siblings in listing order. A file is
//! downloaded when its local size differs from the remote size, or when a
//! freshness rule marks it stale even though the sizes match:
//!
//! - daily summaries (`/DSUM/` directories) whose local copy covers less
//!   than a full day of activity, or does not decode;
//! - `/SYNCINFO.BPB`;
//! - everything under `/U/<n>/S/` and `/U/<n>/TL/`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use polarsync_protocol::RemoteEntry;
use polarsync_protocol::record::{DailySummary, decode_record};
use regex::Regex;

use crate::error::Result;
use crate::pftp::Pftp;
use crate::transport::Transport;

static DAILY_SUMMARY_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/DSUM/$").expect("valid pattern"));

static ALWAYS_STALE_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/U/[0-9]*/(S|TL)/$").expect("valid pattern"));

/// Root directory name under the home directory.
pub const SYNC_DIR_NAME: &str = "Polar";

/// Counters collected during a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub directories: usize,
    pub downloaded: usize,
    pub up_to_date: usize,
    pub failed: usize,
}

/// Default local root: `~/Polar/<serial>`.
#[must_use]
pub fn default_sync_root(serial_number: Option<&str>) -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(SYNC_DIR_NAME)
        .join(serial_number.unwrap_or("unknown"))
}

/// Size of a local file, -1 when it does not exist.
fn local_size(path: &Path) -> i64 {
    std::fs::metadata(path)
        .ok()
        .and_then(|m| i64::try_from(m.len()).ok())
        .unwrap_or(-1)
}

/// Whether a local daily summary is incomplete or unreadable.
fn daily_summary_is_stale(local_file: &Path) -> bool {
    let Some(name) = local_file.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    let raw = match std::fs::read(local_file) {
        Ok(raw) => raw,
        Err(_) => return true,
    };
    match decode_record::<DailySummary>(name, &raw) {
        Ok(summary) => !summary.is_complete_day(),
        Err(err) => {
            tracing::debug!(path = %local_file.display(), error = %err, "Undecodable daily summary");
            true
        }
    }
}

/// Decide whether `entry` in `remote_dir` must be downloaded to `local_file`.
fn needs_download(remote_dir: &str, entry: &RemoteEntry, local_file: &Path) -> bool {
    let remote_size = i64::try_from(entry.size).unwrap_or(i64::MAX);
    if local_size(local_file) != remote_size {
        return true;
    }

    if DAILY_SUMMARY_DIR.is_match(remote_dir) {
        daily_summary_is_stale(local_file)
    } else if remote_dir == "/" && entry.name == "SYNCINFO.BPB" {
        true
    } else {
        ALWAYS_STALE_DIR.is_match(remote_dir)
    }
}

/// Local directory mirroring `remote_dir` (which starts and ends with `/`).
fn local_dir_for(root: &Path, remote_dir: &str) -> PathBuf {
    let relative = remote_dir.trim_matches('/');
    if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

/// List a directory during the walk; absent directories yield `None`.
async fn list<T: Transport>(pftp: &mut Pftp<T>, remote_dir: &str) -> Result<Option<Vec<RemoteEntry>>> {
    match pftp.dir(remote_dir).await {
        Ok(entries) => Ok(entries),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Mirror the whole device tree into `root`.
///
/// Failures of a single download are logged and counted. Errors that leave
/// the link in an unknown state abort the walk.
pub async fn sync_all<T: Transport>(pftp: &mut Pftp<T>, root: &Path) -> Result<SyncReport> {
    tracing::info!(root = %root.display(), "Synchronizing");

    let mut report = SyncReport::default();
    let mut stack: Vec<(String, std::vec::IntoIter<RemoteEntry>)> = Vec::new();

    if let Some(entries) = list(pftp, "/").await? {
        report.directories += 1;
        stack.push(("/".to_string(), entries.into_iter()));
    }

    while let Some((remote_dir, entries)) = stack.last_mut() {
        let Some(entry) = entries.next() else {
            stack.pop();
            continue;
        };
        let remote_dir = remote_dir.clone();

        if entry.is_dir() {
            let child = format!("{remote_dir}{}", entry.name);
            if let Some(children) = list(pftp, &child).await? {
                report.directories += 1;
                stack.push((child, children.into_iter()));
            }
            continue;
        }

        let local_dir = local_dir_for(root, &remote_dir);
        let local_file = local_dir.join(&entry.name);
        if !needs_download(&remote_dir, &entry, &local_file) {
            tracing::debug!(path = %local_file.display(), "Up to date");
            report.up_to_date += 1;
            continue;
        }

        let remote_file = format!("{remote_dir}{}", entry.name);
        let result = match std::fs::create_dir_all(&local_dir) {
            Ok(()) => pftp.get(&remote_file, &local_file).await.map(|_| ()),
            Err(err) => Err(err.into()),
        };

        match result {
            Ok(()) => report.downloaded += 1,
            Err(err) if err.is_link_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(remote = %remote_file, error = %err, "Download failed");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        directories = report.directories,
        downloaded = report.downloaded,
        up_to_date = report.up_to_date,
        failed = report.failed,
        "Sync finished"
    );
    Ok(report)
}
