//! Session listing, detail, and conversation-page queries.

use crate::{Database, DbResult};
use serde::Serialize;
use sqlx::FromRow;

/// Filters accepted by [`Database::list_sessions`]. `status` (live/idle) is
/// not a column on this table — the process detector supplies the live set
/// and the caller intersects it with the returned rows — so it is not
/// represented here; see `fleetdeck-server::routes::sessions`.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub project: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// One row of a session listing or detail response.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SessionRow {
    pub session_id: String,
    pub slug: Option<String>,
    pub project_dir: String,
    pub working_dir: String,
    pub git_branch: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub first_message_timestamp: Option<String>,
    pub last_message_timestamp: Option<String>,
    pub message_count: i64,
    pub user_msg_count: i64,
    pub asst_msg_count: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cache_read: i64,
    pub total_cache_create: i64,
    pub file_size_bytes: i64,
    pub jsonl_path: String,
    pub indexed_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionListPage {
    pub sessions: Vec<SessionRow>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileTouchCount {
    pub file_path: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCount {
    pub tool_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub session: SessionRow,
    pub files_touched: Vec<FileTouchCount>,
    pub tool_histogram: Vec<ToolCount>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MessageRow {
    pub uuid: String,
    pub session_id: String,
    pub parent_uuid: Option<String>,
    pub role: String,
    pub content_text: String,
    pub thinking_text: Option<String>,
    pub tool_uses_json: Option<String>,
    pub model: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read: i64,
    pub cache_create: i64,
    pub timestamp: Option<String>,
    pub seq_num: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationPage {
    pub messages: Vec<MessageRow>,
    pub total: i64,
}

impl Database {
    /// List sessions, default sort `last_message_timestamp DESC`, most
    /// recent first. `filter.limit <= 0` is treated as "no limit".
    pub async fn list_sessions(&self, filter: &SessionFilter) -> DbResult<SessionListPage> {
        let limit = if filter.limit > 0 { filter.limit } else { i64::MAX };

        let sessions: Vec<SessionRow> = match &filter.project {
            Some(project) => {
                sqlx::query_as::<_, SessionRow>(
                    r#"SELECT * FROM sessions WHERE project_dir = ?
                       ORDER BY last_message_timestamp DESC LIMIT ? OFFSET ?"#,
                )
                .bind(project)
                .bind(limit)
                .bind(filter.offset)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, SessionRow>(
                    r#"SELECT * FROM sessions
                       ORDER BY last_message_timestamp DESC LIMIT ? OFFSET ?"#,
                )
                .bind(limit)
                .bind(filter.offset)
                .fetch_all(self.pool())
                .await?
            }
        };

        let total: i64 = match &filter.project {
            Some(project) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE project_dir = ?")
                    .bind(project)
                    .fetch_one(self.pool())
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
                    .fetch_one(self.pool())
                    .await?
            }
        };

        Ok(SessionListPage { sessions, total })
    }

    /// Session detail: the row plus derived `files_touched` and a per-tool
    /// usage histogram, both ordered by descending frequency.
    pub async fn session_detail(&self, session_id: &str) -> DbResult<Option<SessionDetail>> {
        let session: Option<SessionRow> =
            sqlx::query_as("SELECT * FROM sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(self.pool())
                .await?;
        let Some(session) = session else { return Ok(None) };

        let files_touched: Vec<FileTouchCount> = sqlx::query_as(
            r#"SELECT file_path, COUNT(*) as count FROM file_events
               WHERE session_id = ? GROUP BY file_path ORDER BY count DESC"#,
        )
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;

        let tool_histogram: Vec<ToolCount> = sqlx::query_as(
            r#"SELECT tool_name, COUNT(*) as count FROM tool_uses
               WHERE session_id = ? GROUP BY tool_name ORDER BY count DESC"#,
        )
        .bind(session_id)
        .fetch_all(self.pool())
        .await?;

        Ok(Some(SessionDetail {
            session,
            files_touched,
            tool_histogram,
        }))
    }

    /// Paginated conversation, ordered by `seq_num ASC` (file order).
    pub async fn conversation(
        &self,
        session_id: &str,
        limit: i64,
        offset: i64,
    ) -> DbResult<ConversationPage> {
        let limit = if limit > 0 { limit } else { i64::MAX };
        let messages: Vec<MessageRow> = sqlx::query_as(
            r#"SELECT * FROM messages WHERE session_id = ?
               ORDER BY seq_num ASC LIMIT ? OFFSET ?"#,
        )
        .bind(session_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(self.pool())
            .await?;

        Ok(ConversationPage { messages, total })
    }

    /// The last message appended to `session_id` by file order, or `None`
    /// for a session with no messages. Used by the needs-input detector to
    /// test whether a session's tail is an unanswered assistant turn.
    pub async fn last_message(&self, session_id: &str) -> DbResult<Option<MessageRow>> {
        let row: Option<MessageRow> = sqlx::query_as(
            r#"SELECT * FROM messages WHERE session_id = ?
               ORDER BY seq_num DESC LIMIT 1"#,
        )
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Indexer;
    use std::io::Write;

    async fn seeded_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("-tmp-demo");
        tokio::fs::create_dir_all(&proj).await.unwrap();
        let mut f = std::fs::File::create(proj.join("s1.jsonl")).unwrap();
        writeln!(
            f,
            r#"{{"type":"user","uuid":"u1","timestamp":"2026-01-01T00:00:00Z","message":{{"role":"user","content":"hello"}}}}"#
        )
        .unwrap();
        writeln!(
            f,
            r#"{{"type":"assistant","uuid":"u2","timestamp":"2026-01-01T00:00:01Z","message":{{"role":"assistant","content":[{{"type":"tool_use","id":"t1","name":"Read","input":{{"file_path":"/tmp/demo/x.py"}}}}]}}}}"#
        )
        .unwrap();
        let db = Database::new_in_memory().await.unwrap();
        let indexer = Indexer::new(db.pool().clone(), dir.path().to_path_buf());
        indexer.reindex_all().await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn lists_sessions_sorted_by_last_message_desc() {
        let (db, _dir) = seeded_db().await;
        let page = db.list_sessions(&SessionFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.sessions[0].session_id, "s1");
    }

    #[tokio::test]
    async fn session_detail_includes_files_touched_and_histogram() {
        let (db, _dir) = seeded_db().await;
        let detail = db.session_detail("s1").await.unwrap().unwrap();
        assert_eq!(detail.files_touched.len(), 1);
        assert_eq!(detail.files_touched[0].file_path, "/tmp/demo/x.py");
        assert_eq!(detail.tool_histogram[0].tool_name, "Read");
    }

    #[tokio::test]
    async fn session_detail_none_for_missing_id() {
        let (db, _dir) = seeded_db().await;
        assert!(db.session_detail("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conversation_is_ordered_by_seq_num() {
        let (db, _dir) = seeded_db().await;
        let page = db.conversation("s1", 10, 0).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.messages[0].seq_num, 0);
        assert_eq!(page.messages[1].seq_num, 1);
    }

    #[tokio::test]
    async fn last_message_returns_tail_by_seq_num() {
        let (db, _dir) = seeded_db().await;
        let last = db.last_message("s1").await.unwrap().unwrap();
        assert_eq!(last.seq_num, 1);
        assert_eq!(last.role, "assistant");
    }

    #[tokio::test]
    async fn last_message_none_for_missing_session() {
        let (db, _dir) = seeded_db().await;
        assert!(db.last_message("nope").await.unwrap().is_none());
    }
}
