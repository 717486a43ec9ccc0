//! Incremental JSONL-to-SQLite indexer: scan, diff, parse, bulk-insert,
//! reap orphans, rebuild the full-text index.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use fleetdeck_core::SessionAccumulator;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::{DbError, DbResult};

const MTIME_TOLERANCE_SECS: f64 = 0.010;

/// Outcome of one `reindex_all` / `reindex_force` pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexSummary {
    pub sessions_indexed: usize,
    pub sessions_skipped: usize,
    pub sessions_removed: usize,
    pub total_messages: usize,
    pub duration_ms: u64,
}

/// Drives indexing passes against a log root and a database pool.
#[derive(Clone)]
pub struct Indexer {
    pool: SqlitePool,
    log_root: PathBuf,
}

impl Indexer {
    pub fn new(pool: SqlitePool, log_root: PathBuf) -> Self {
        Indexer { pool, log_root }
    }

    /// Scan the log root, index new/changed files, reap orphans, rebuild FTS
    /// if anything changed. Skips unchanged files by `(mtime, size)`.
    pub async fn reindex_all(&self) -> DbResult<IndexSummary> {
        self.run(false).await
    }

    /// Same as [`Indexer::reindex_all`] but bypasses the skip check — every
    /// discovered file is re-parsed and re-inserted.
    pub async fn reindex_force(&self) -> DbResult<IndexSummary> {
        self.run(true).await
    }

    async fn run(&self, force: bool) -> DbResult<IndexSummary> {
        let started = Instant::now();
        let mut summary = IndexSummary::default();

        let existing_meta = self.load_index_meta().await?;
        let discovered = self.discover_jsonl_files().await?;

        for path in &discovered {
            let meta = match tokio::fs::metadata(path).await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to stat transcript file, skipping");
                    continue;
                }
            };
            let size = meta.len() as i64;
            let mtime = mtime_secs(&meta);
            let path_str = path.to_string_lossy().to_string();

            if !force {
                if let Some((old_mtime, old_size)) = existing_meta.get(&path_str) {
                    if (mtime - old_mtime).abs() < MTIME_TOLERANCE_SECS && size == *old_size {
                        summary.sessions_skipped += 1;
                        continue;
                    }
                }
            }

            match self.index_one_file(path, size, mtime).await {
                Ok(message_count) => {
                    summary.sessions_indexed += 1;
                    summary.total_messages += message_count;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to index transcript file, will retry next pass");
                }
            }
        }

        let discovered_set: std::collections::HashSet<String> = discovered
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        let mut mutated = summary.sessions_indexed > 0;
        for stale_path in existing_meta.keys() {
            if !discovered_set.contains(stale_path) {
                self.remove_session_for_path(stale_path).await?;
                summary.sessions_removed += 1;
                mutated = true;
            }
        }

        if mutated {
            self.rebuild_fts().await?;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            indexed = summary.sessions_indexed,
            skipped = summary.sessions_skipped,
            removed = summary.sessions_removed,
            duration_ms = summary.duration_ms,
            "indexing pass complete"
        );
        Ok(summary)
    }

    async fn discover_jsonl_files(&self) -> DbResult<Vec<PathBuf>> {
        let mut out = Vec::new();
        let mut top = match tokio::fs::read_dir(&self.log_root).await {
            Ok(rd) => rd,
            Err(_) => return Ok(out),
        };
        while let Some(project_entry) = top.next_entry().await? {
            let project_path = project_entry.path();
            if !project_entry.file_type().await?.is_dir() {
                continue;
            }
            let mut inner = match tokio::fs::read_dir(&project_path).await {
                Ok(rd) => rd,
                Err(_) => continue,
            };
            while let Some(file_entry) = inner.next_entry().await? {
                let path = file_entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                    out.push(path);
                }
            }
        }
        Ok(out)
    }

    async fn load_index_meta(&self) -> DbResult<std::collections::HashMap<String, (f64, i64)>> {
        let rows: Vec<(String, f64, i64)> =
            sqlx::query_as("SELECT jsonl_path, file_mtime, file_size FROM index_meta")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(p, m, s)| (p, (m, s))).collect())
    }

    async fn index_one_file(&self, path: &Path, size: i64, mtime: f64) -> DbResult<usize> {
        let session_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        let project_dir = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        let contents = tokio::fs::read_to_string(path).await?;

        let mut acc = SessionAccumulator::new(session_id.clone());
        for line in contents.lines() {
            acc.ingest_line(line);
        }
        let indexed_at = Utc::now().to_rfc3339();
        let path_str = path.to_string_lossy().to_string();
        let parsed = acc.finish(&project_dir, size, &path_str, &indexed_at);
        let message_count = parsed.messages.len();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(&session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tool_uses WHERE session_id = ?")
            .bind(&session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM file_events WHERE session_id = ?")
            .bind(&session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(&session_id)
            .execute(&mut *tx)
            .await?;

        let s = &parsed.session;
        sqlx::query(
            r#"INSERT INTO sessions
               (session_id, slug, project_dir, working_dir, git_branch, model, version,
                first_message_timestamp, last_message_timestamp, message_count,
                user_msg_count, asst_msg_count, total_input_tokens, total_output_tokens,
                total_cache_read, total_cache_create, file_size_bytes, jsonl_path, indexed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&s.session_id)
        .bind(&s.slug)
        .bind(&s.project_dir)
        .bind(&s.working_dir)
        .bind(&s.git_branch)
        .bind(&s.model)
        .bind(&s.version)
        .bind(&s.first_message_timestamp)
        .bind(&s.last_message_timestamp)
        .bind(s.message_count)
        .bind(s.user_msg_count)
        .bind(s.asst_msg_count)
        .bind(s.total_input_tokens)
        .bind(s.total_output_tokens)
        .bind(s.total_cache_read)
        .bind(s.total_cache_create)
        .bind(s.file_size_bytes)
        .bind(&s.jsonl_path)
        .bind(&s.indexed_at)
        .execute(&mut *tx)
        .await?;

        for m in &parsed.messages {
            sqlx::query(
                r#"INSERT INTO messages
                   (uuid, session_id, parent_uuid, role, content_text, thinking_text,
                    tool_uses_json, model, input_tokens, output_tokens, cache_read,
                    cache_create, timestamp, seq_num)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&m.uuid)
            .bind(&m.session_id)
            .bind(&m.parent_uuid)
            .bind(m.role.as_str())
            .bind(&m.content_text)
            .bind(&m.thinking_text)
            .bind(&m.tool_uses_json)
            .bind(&m.model)
            .bind(m.input_tokens)
            .bind(m.output_tokens)
            .bind(m.cache_read)
            .bind(m.cache_create)
            .bind(&m.timestamp)
            .bind(m.seq_num)
            .execute(&mut *tx)
            .await?;
        }

        for t in &parsed.tool_uses {
            sqlx::query(
                r#"INSERT INTO tool_uses
                   (tool_use_id, session_id, message_uuid, tool_name, input_summary, timestamp)
                   VALUES (?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&t.tool_use_id)
            .bind(&t.session_id)
            .bind(&t.message_uuid)
            .bind(&t.tool_name)
            .bind(&t.input_summary)
            .bind(&t.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        for f in &parsed.file_events {
            sqlx::query(
                r#"INSERT INTO file_events (session_id, file_path, event_type, timestamp)
                   VALUES (?, ?, ?, ?)"#,
            )
            .bind(&f.session_id)
            .bind(&f.file_path)
            .bind(f.event_type.as_str())
            .bind(&f.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"INSERT INTO index_meta (jsonl_path, file_mtime, file_size, indexed_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(jsonl_path) DO UPDATE SET
                   file_mtime = excluded.file_mtime,
                   file_size = excluded.file_size,
                   indexed_at = excluded.indexed_at"#,
        )
        .bind(&path_str)
        .bind(mtime)
        .bind(size)
        .bind(&indexed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(session_id = %session_id, messages = message_count, "indexed transcript file");
        Ok(message_count)
    }

    async fn remove_session_for_path(&self, jsonl_path: &str) -> DbResult<()> {
        let session_id: Option<(String,)> =
            sqlx::query_as("SELECT session_id FROM sessions WHERE jsonl_path = ?")
                .bind(jsonl_path)
                .fetch_optional(&self.pool)
                .await?;

        let mut tx = self.pool.begin().await?;
        if let Some((session_id,)) = session_id {
            sqlx::query("DELETE FROM messages WHERE session_id = ?")
                .bind(&session_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM tool_uses WHERE session_id = ?")
                .bind(&session_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM file_events WHERE session_id = ?")
                .bind(&session_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM sessions WHERE session_id = ?")
                .bind(&session_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM index_meta WHERE jsonl_path = ?")
            .bind(jsonl_path)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// `content='messages'` external-content tables can drift from the base
    /// table during bulk delete+reinsert; rebuild restores consistency.
    async fn rebuild_fts(&self) -> DbResult<()> {
        match sqlx::query("INSERT INTO messages_fts(messages_fts) VALUES('rebuild')")
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "FTS rebuild failed");
                Ok(())
            }
        }
    }
}

fn mtime_secs(meta: &std::fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Re-derive a project's working directory when no log line carried `cwd`.
pub fn working_dir_fallback(project_dir: &str) -> String {
    fleetdeck_core::project_dir_to_path(project_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use std::io::Write;

    async fn seed_demo_session(root: &Path) {
        let dir = root.join("-tmp-demo");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let mut f = std::fs::File::create(dir.join("s1.jsonl")).unwrap();
        writeln!(
            f,
            r#"{{"type":"user","uuid":"u1","timestamp":"2026-01-01T00:00:00Z","message":{{"role":"user","content":"hello"}}}}"#
        )
        .unwrap();
        writeln!(
            f,
            r#"{{"type":"assistant","uuid":"u2","timestamp":"2026-01-01T00:00:01Z","message":{{"role":"assistant","content":"hi","usage":{{"input_tokens":10,"output_tokens":20}}}}}}"#
        )
        .unwrap();
        writeln!(
            f,
            r#"{{"type":"assistant","uuid":"u3","timestamp":"2026-01-01T00:00:02Z","message":{{"role":"assistant","content":[{{"type":"tool_use","id":"t1","name":"Read","input":{{"file_path":"/tmp/demo/x.py"}}}}]}}}}"#
        )
        .unwrap();
    }

    #[tokio::test]
    async fn end_to_end_index_and_search() {
        let dir = tempfile::tempdir().unwrap();
        seed_demo_session(dir.path()).await;

        let db = Database::new_in_memory().await.unwrap();
        let indexer = Indexer::new(db.pool().clone(), dir.path().to_path_buf());
        let summary = indexer.reindex_all().await.unwrap();
        assert_eq!(summary.sessions_indexed, 1);
        assert_eq!(summary.sessions_skipped, 0);

        let session: (i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT message_count, user_msg_count, asst_msg_count, total_input_tokens, total_output_tokens FROM sessions WHERE session_id = 's1'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(session, (3, 1, 2, 10, 20));

        let file_events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_events")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(file_events, 1);

        let search_hits: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages_fts WHERE messages_fts MATCH 'hello'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(search_hits, 1);

        // Second pass with no changes is a no-op.
        let summary2 = indexer.reindex_all().await.unwrap();
        assert_eq!(summary2.sessions_indexed, 0);
        assert_eq!(summary2.sessions_skipped, 1);
    }

    #[tokio::test]
    async fn orphan_reaping_removes_deleted_file_session() {
        let dir = tempfile::tempdir().unwrap();
        seed_demo_session(dir.path()).await;
        let db = Database::new_in_memory().await.unwrap();
        let indexer = Indexer::new(db.pool().clone(), dir.path().to_path_buf());
        indexer.reindex_all().await.unwrap();

        tokio::fs::remove_file(dir.path().join("-tmp-demo/s1.jsonl"))
            .await
            .unwrap();
        let summary = indexer.reindex_all().await.unwrap();
        assert_eq!(summary.sessions_removed, 1);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
