//! Date- and project-grouped token rollups and tool usage histograms.
//!
//! An `AVG(model)` aggregation is not reproduced here — `model` is a text
//! column and the average is not meaningful. It is simply omitted from
//! these queries.

use crate::{Database, DbResult};
use chrono::{Duration, Utc};
use fleetdeck_core::pricing::estimate_cost;
use serde::Serialize;
use sqlx::FromRow;

/// `period` query parameter accepted by the analytics endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Days7,
    Days30,
    Days90,
}

impl Period {
    pub fn parse(s: &str) -> Option<Period> {
        match s {
            "7d" => Some(Period::Days7),
            "30d" => Some(Period::Days30),
            "90d" => Some(Period::Days90),
            _ => None,
        }
    }

    fn cutoff(self) -> String {
        let days = match self {
            Period::Days7 => 7,
            Period::Days30 => 30,
            Period::Days90 => 90,
        };
        (Utc::now() - Duration::days(days)).to_rfc3339()
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TokenRollupEntry {
    pub group_key: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read: i64,
    pub cache_create: i64,
    pub session_count: i64,
    /// Summed per-model cost estimate for this group, rounded to 2 decimals.
    /// Computed in Rust from [`ModelTokenRow`] rather than in SQL, since the
    /// per-million-token rates vary by model.
    #[sqlx(default)]
    pub estimated_cost_usd: f64,
}

#[derive(Debug, Clone, FromRow)]
struct ModelTokenRow {
    group_key: String,
    model: Option<String>,
    input_tokens: i64,
    output_tokens: i64,
    cache_read: i64,
    cache_create: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ToolHistogramEntry {
    pub tool_name: String,
    pub count: i64,
}

impl Database {
    /// Token usage rolled up by day (`YYYY-MM-DD` of `last_message_timestamp`)
    /// or by project, over the given period.
    pub async fn token_rollup(
        &self,
        period: Period,
        group_by_day: bool,
    ) -> DbResult<Vec<TokenRollupEntry>> {
        let cutoff = period.cutoff();
        let sql = if group_by_day {
            r#"SELECT substr(last_message_timestamp, 1, 10) as group_key,
                      SUM(total_input_tokens) as input_tokens,
                      SUM(total_output_tokens) as output_tokens,
                      SUM(total_cache_read) as cache_read,
                      SUM(total_cache_create) as cache_create,
                      COUNT(*) as session_count
               FROM sessions
               WHERE last_message_timestamp >= ?
               GROUP BY group_key
               ORDER BY group_key ASC"#
        } else {
            r#"SELECT project_dir as group_key,
                      SUM(total_input_tokens) as input_tokens,
                      SUM(total_output_tokens) as output_tokens,
                      SUM(total_cache_read) as cache_read,
                      SUM(total_cache_create) as cache_create,
                      COUNT(*) as session_count
               FROM sessions
               WHERE last_message_timestamp >= ?
               GROUP BY project_dir
               ORDER BY input_tokens DESC"#
        };

        let mut rows: Vec<TokenRollupEntry> = sqlx::query_as(sql)
            .bind(&cutoff)
            .fetch_all(self.pool())
            .await?;

        let model_sql = if group_by_day {
            r#"SELECT substr(s.last_message_timestamp, 1, 10) as group_key,
                      m.model as model,
                      SUM(m.input_tokens) as input_tokens,
                      SUM(m.output_tokens) as output_tokens,
                      SUM(m.cache_read) as cache_read,
                      SUM(m.cache_create) as cache_create
               FROM messages m
               JOIN sessions s ON s.session_id = m.session_id
               WHERE s.last_message_timestamp >= ?
               GROUP BY group_key, m.model"#
        } else {
            r#"SELECT s.project_dir as group_key,
                      m.model as model,
                      SUM(m.input_tokens) as input_tokens,
                      SUM(m.output_tokens) as output_tokens,
                      SUM(m.cache_read) as cache_read,
                      SUM(m.cache_create) as cache_create
               FROM messages m
               JOIN sessions s ON s.session_id = m.session_id
               WHERE s.last_message_timestamp >= ?
               GROUP BY s.project_dir, m.model"#
        };

        let model_rows: Vec<ModelTokenRow> = sqlx::query_as(model_sql)
            .bind(&cutoff)
            .fetch_all(self.pool())
            .await?;

        for entry in &mut rows {
            let cost: f64 = model_rows
                .iter()
                .filter(|m| m.group_key == entry.group_key)
                .map(|m| {
                    estimate_cost(
                        m.input_tokens,
                        m.output_tokens,
                        m.cache_read,
                        m.cache_create,
                        m.model.as_deref(),
                    )
                })
                .sum();
            entry.estimated_cost_usd = (cost * 100.0).round() / 100.0;
        }

        Ok(rows)
    }

    /// Tool usage histogram over the given period, most-used first.
    pub async fn tool_histogram(&self, period: Period) -> DbResult<Vec<ToolHistogramEntry>> {
        let cutoff = period.cutoff();
        let rows: Vec<ToolHistogramEntry> = sqlx::query_as(
            r#"SELECT tool_name, COUNT(*) as count
               FROM tool_uses
               WHERE timestamp >= ?
               GROUP BY tool_name
               ORDER BY count DESC"#,
        )
        .bind(&cutoff)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_parses_known_values_only() {
        assert_eq!(Period::parse("7d"), Some(Period::Days7));
        assert_eq!(Period::parse("30d"), Some(Period::Days30));
        assert_eq!(Period::parse("90d"), Some(Period::Days90));
        assert_eq!(Period::parse("1d"), None);
    }

    #[tokio::test]
    async fn token_rollup_groups_by_project_with_no_sessions() {
        let db = Database::new_in_memory().await.unwrap();
        let rows = db.token_rollup(Period::Days30, false).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn token_rollup_sums_per_model_cost_estimate() {
        use crate::Indexer;
        use std::io::Write;

        let now = Utc::now();
        let ts_user = now.to_rfc3339();
        let ts_assistant = (now + Duration::seconds(1)).to_rfc3339();

        let dir = tempfile::tempdir().unwrap();
        let proj = dir.path().join("-tmp-demo");
        tokio::fs::create_dir_all(&proj).await.unwrap();
        let mut f = std::fs::File::create(proj.join("s1.jsonl")).unwrap();
        writeln!(
            f,
            r#"{{"type":"user","uuid":"u1","timestamp":"{ts_user}","message":{{"role":"user","content":"hello"}}}}"#
        )
        .unwrap();
        writeln!(
            f,
            r#"{{"type":"assistant","uuid":"u2","timestamp":"{ts_assistant}","message":{{"role":"assistant","content":"hi","model":"claude-3-5-sonnet","usage":{{"input_tokens":1000000,"output_tokens":0}}}}}}"#
        )
        .unwrap();

        let db = Database::new_in_memory().await.unwrap();
        let indexer = Indexer::new(db.pool().clone(), dir.path().to_path_buf());
        indexer.reindex_all().await.unwrap();

        let rows = db.token_rollup(Period::Days30, false).await.unwrap();
        assert_eq!(rows.len(), 1);
        // 1,000,000 input tokens at sonnet's $3/M is exactly $3.00.
        assert_eq!(rows[0].estimated_cost_usd, 3.0);
    }

    #[tokio::test]
    async fn tool_histogram_empty_with_no_data() {
        let db = Database::new_in_memory().await.unwrap();
        let rows = db.tool_histogram(Period::Days7).await.unwrap();
        assert!(rows.is_empty());
    }
}
