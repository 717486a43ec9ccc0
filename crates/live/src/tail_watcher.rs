//! Append-aware log watcher.
//!
//! Stat-based polling, not inotify/FSEvents: transcript logs may live on a
//! FUSE-backed network drive where inode notifications are unreliable.
//! Offsets are seeded to each file's current size at startup so existing
//! content is never replayed.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetdeck_core::{parse_line, preview_text, tool_use_names};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::warn;

use crate::event_bus::{Event, EventBus};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const BATCH_HOLD: Duration = Duration::from_millis(500);

/// Tracks byte offsets per transcript file and turns new lines into
/// [`Event::NewMessage`] events.
pub struct TailWatcher {
    log_root: PathBuf,
    offsets: HashMap<PathBuf, u64>,
}

impl TailWatcher {
    /// Seed offsets to each currently-discovered file's size, so only
    /// content appended *after* startup is ever replayed.
    pub async fn new(log_root: PathBuf) -> std::io::Result<Self> {
        let mut offsets = HashMap::new();
        for path in discover_jsonl(&log_root).await {
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                offsets.insert(path, meta.len());
            }
        }
        Ok(TailWatcher { log_root, offsets })
    }

    /// Drive the poll loop forever, publishing batches to `bus`.
    pub async fn run(mut self, bus: EventBus) {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            interval.tick().await;
            let events = self.scan_once().await;
            if events.is_empty() {
                continue;
            }
            tokio::time::sleep(BATCH_HOLD).await;
            for event in events {
                bus.publish_session(event).await;
            }
        }
    }

    /// One scan pass: discover files, read any appended bytes, parse
    /// complete new lines, and advance the recorded offset. Exposed
    /// separately from [`TailWatcher::run`] so it is directly testable
    /// without waiting on the poll/hold timers.
    pub async fn scan_once(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let discovered = discover_jsonl(&self.log_root).await;

        for path in &discovered {
            let meta = match tokio::fs::metadata(path).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            let size = meta.len();
            let offset = *self.offsets.get(path).unwrap_or(&0);
            if size <= offset {
                self.offsets.insert(path.clone(), size);
                continue;
            }

            let session_id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();

            match read_new_lines(path, offset).await {
                Ok((lines, new_offset)) => {
                    for line in lines {
                        let Some(entry) = parse_line(&line) else { continue };
                        if entry.entry_type != "user" && entry.entry_type != "assistant" {
                            continue;
                        }
                        let Some(msg) = &entry.message else { continue };
                        let Some(role) = msg.role.as_deref() else { continue };
                        if role != "user" && role != "assistant" {
                            continue;
                        }
                        let tool_uses = tool_use_names(msg.content.as_ref());
                        events.push(Event::NewMessage {
                            session_id: session_id.clone(),
                            hostname: None,
                            role: role.to_string(),
                            preview: preview_text(msg.content.as_ref()),
                            timestamp: entry.timestamp.clone().unwrap_or_default(),
                            tool_uses: if tool_uses.is_empty() {
                                None
                            } else {
                                Some(tool_uses)
                            },
                        });
                    }
                    self.offsets.insert(path.clone(), new_offset);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "tail watcher read failed, will retry next pass");
                }
            }
        }

        // Drop offsets for files that vanished between passes.
        let discovered_set: std::collections::HashSet<&PathBuf> = discovered.iter().collect();
        self.offsets.retain(|p, _| discovered_set.contains(p));

        events
    }
}

/// Read bytes appended since `offset`, returning complete lines and the new
/// offset (the end of the last complete line read, so a line still being
/// written is replayed whole on the next pass rather than split).
async fn read_new_lines(path: &Path, offset: u64) -> std::io::Result<(Vec<String>, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;

    let mut lines = Vec::new();
    let mut consumed = 0usize;
    let mut start = 0usize;
    for (i, &b) in buf.iter().enumerate() {
        if b == b'\n' {
            if let Ok(s) = std::str::from_utf8(&buf[start..i]) {
                lines.push(s.to_string());
            }
            start = i + 1;
            consumed = start;
        }
    }
    Ok((lines, offset + consumed as u64))
}

async fn discover_jsonl(log_root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(mut top) = tokio::fs::read_dir(log_root).await else {
        return out;
    };
    while let Ok(Some(project_entry)) = top.next_entry().await {
        let project_path = project_entry.path();
        let Ok(is_dir) = project_entry.file_type().await.map(|t| t.is_dir()) else {
            continue;
        };
        if !is_dir {
            continue;
        }
        let Ok(mut inner) = tokio::fs::read_dir(&project_path).await else {
            continue;
        };
        while let Ok(Some(file_entry)) = inner.next_entry().await {
            let path = file_entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                out.push(path);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn existing_content_is_never_replayed_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("-tmp-demo");
        tokio::fs::create_dir_all(&proj).await.unwrap();
        let path = proj.join("s1.jsonl");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"{{"type":"user","timestamp":"t0","message":{{"role":"user","content":"pre-existing"}}}}"#
        )
        .unwrap();
        drop(f);

        let mut watcher = TailWatcher::new(dir.path().to_path_buf()).await.unwrap();
        let events = watcher.scan_once().await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn appended_line_produces_new_message_event() {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("-tmp-demo");
        tokio::fs::create_dir_all(&proj).await.unwrap();
        let path = proj.join("s1.jsonl");
        std::fs::File::create(&path).unwrap();

        let mut watcher = TailWatcher::new(dir.path().to_path_buf()).await.unwrap();
        assert!(watcher.scan_once().await.is_empty());

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(
            f,
            r#"{{"type":"assistant","timestamp":"t1","message":{{"role":"assistant","content":"done"}}}}"#
        )
        .unwrap();
        drop(f);

        let events = watcher.scan_once().await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::NewMessage {
                session_id,
                role,
                preview,
                ..
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(role, "assistant");
                assert_eq!(preview, "done");
            }
            _ => panic!("expected NewMessage"),
        }
    }

    #[tokio::test]
    async fn malformed_appended_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("-tmp-demo");
        tokio::fs::create_dir_all(&proj).await.unwrap();
        let path = proj.join("s1.jsonl");
        std::fs::File::create(&path).unwrap();
        let mut watcher = TailWatcher::new(dir.path().to_path_buf()).await.unwrap();
        watcher.scan_once().await;

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "not json").unwrap();
        drop(f);

        assert!(watcher.scan_once().await.is_empty());
    }
}
