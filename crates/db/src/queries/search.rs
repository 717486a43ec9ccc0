//! Full-text search over message content via the external-content FTS5 index.

use crate::{Database, DbResult};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SearchHit {
    pub session_id: String,
    pub message_uuid: String,
    pub project_dir: String,
    pub role: String,
    pub timestamp: Option<String>,
    pub snippet: String,
}

impl Database {
    /// FTS snippet search over `content_text`/`thinking_text`, optionally
    /// narrowed by project and a timestamp range. `snippet()` wraps matches
    /// in `<b>...</b>` around up to 10 tokens of surrounding context.
    pub async fn search(
        &self,
        query: &str,
        project: Option<&str>,
        after: Option<&str>,
        before: Option<&str>,
        limit: i64,
    ) -> DbResult<Vec<SearchHit>> {
        let limit = if limit > 0 { limit } else { 50 };
        let hits: Vec<SearchHit> = sqlx::query_as(
            r#"
            SELECT
                m.session_id as session_id,
                m.uuid as message_uuid,
                s.project_dir as project_dir,
                m.role as role,
                m.timestamp as timestamp,
                snippet(messages_fts, 0, '<b>', '</b>', '...', 10) as snippet
            FROM messages_fts
            JOIN messages m ON m.rowid = messages_fts.rowid
            JOIN sessions s ON s.session_id = m.session_id
            WHERE messages_fts MATCH ?
              AND (? IS NULL OR s.project_dir = ?)
              AND (? IS NULL OR m.timestamp >= ?)
              AND (? IS NULL OR m.timestamp <= ?)
            ORDER BY m.timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(query)
        .bind(project)
        .bind(project)
        .bind(after)
        .bind(after)
        .bind(before)
        .bind(before)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Indexer;
    use std::io::Write;

    #[tokio::test]
    async fn finds_message_by_substring() {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("-tmp-demo");
        tokio::fs::create_dir_all(&proj).await.unwrap();
        let mut f = std::fs::File::create(proj.join("s1.jsonl")).unwrap();
        writeln!(
            f,
            r#"{{"type":"user","uuid":"u1","timestamp":"2026-01-01T00:00:00Z","message":{{"role":"user","content":"hello world"}}}}"#
        )
        .unwrap();

        let db = Database::new_in_memory().await.unwrap();
        Indexer::new(db.pool().clone(), dir.path().to_path_buf())
            .reindex_all()
            .await
            .unwrap();

        let hits = db.search("hello", None, None, None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, "s1");
        assert!(hits[0].snippet.contains("hello"));
    }

    #[tokio::test]
    async fn project_filter_excludes_other_projects() {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("-tmp-demo");
        tokio::fs::create_dir_all(&proj).await.unwrap();
        let mut f = std::fs::File::create(proj.join("s1.jsonl")).unwrap();
        writeln!(
            f,
            r#"{{"type":"user","uuid":"u1","timestamp":"2026-01-01T00:00:00Z","message":{{"role":"user","content":"findme"}}}}"#
        )
        .unwrap();
        let db = Database::new_in_memory().await.unwrap();
        Indexer::new(db.pool().clone(), dir.path().to_path_buf())
            .reindex_all()
            .await
            .unwrap();

        let hits = db
            .search("findme", Some("-other-project"), None, None, 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
