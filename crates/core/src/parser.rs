//! Transcript record parsing: one JSONL line in, normalized rows out.
//!
//! [`SessionAccumulator`] is the reusable core: the incremental indexer feeds
//! it every line of a file and takes a finished [`ParsedFile`]; the tail
//! watcher instead calls [`parse_line`] directly and inspects only the
//! handful of fields it needs for a `new_message` event, without paying for
//! full session accumulation.

use crate::paths::project_dir_to_path;
use crate::types::{
    ContentBlock, FileEvent, FileEventKind, JsonlContent, JsonlEntry, Message, Role, Session,
    ToolUse,
};

const BASH_SUMMARY_LIMIT: usize = 80;
const TASK_SUMMARY_LIMIT: usize = 60;
const OTHER_SUMMARY_LIMIT: usize = 80;
const BASH_FILE_EVENT_COMMAND_LIMIT: usize = 200;
const PREVIEW_LIMIT: usize = 120;

/// Parse one transcript line. Returns `None` (logged at DEBUG) for anything
/// that is not a single valid JSON object — the parser's contract is to
/// skip, never abort.
pub fn parse_line(line: &str) -> Option<JsonlEntry> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<JsonlEntry>(trimmed) {
        Ok(entry) => Some(entry),
        Err(err) => {
            tracing::debug!(error = %err, "skipping malformed transcript line");
            None
        }
    }
}

/// The full, normalized contents of one indexed transcript file.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub session: Session,
    pub messages: Vec<Message>,
    pub tool_uses: Vec<ToolUse>,
    pub file_events: Vec<FileEvent>,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            session_id: String::new(),
            slug: None,
            project_dir: String::new(),
            working_dir: String::new(),
            git_branch: None,
            model: None,
            version: None,
            first_message_timestamp: None,
            last_message_timestamp: None,
            message_count: 0,
            user_msg_count: 0,
            asst_msg_count: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cache_read: 0,
            total_cache_create: 0,
            file_size_bytes: 0,
            jsonl_path: String::new(),
            indexed_at: String::new(),
        }
    }
}

/// Accumulates session-level state across a sequence of transcript lines.
///
/// Feed lines with [`SessionAccumulator::ingest_line`]; each call advances
/// `seq_num` only when the line produces a `Message`. Session-level fields
/// (`slug`, `git_branch`, `version`, `cwd`) latch onto the first record that
/// carries them, across every record type, per the parser's harvesting rule.
pub struct SessionAccumulator {
    session_id: String,
    slug: Option<String>,
    git_branch: Option<String>,
    model: Option<String>,
    version: Option<String>,
    cwd: Option<String>,
    first_timestamp: Option<String>,
    last_timestamp: Option<String>,
    seq_num: i64,
    user_msg_count: i64,
    asst_msg_count: i64,
    total_input_tokens: i64,
    total_output_tokens: i64,
    total_cache_read: i64,
    total_cache_create: i64,
    messages: Vec<Message>,
    tool_uses: Vec<ToolUse>,
    file_events: Vec<FileEvent>,
}

impl SessionAccumulator {
    pub fn new(session_id: impl Into<String>) -> Self {
        SessionAccumulator {
            session_id: session_id.into(),
            slug: None,
            git_branch: None,
            model: None,
            version: None,
            cwd: None,
            first_timestamp: None,
            last_timestamp: None,
            seq_num: 0,
            user_msg_count: 0,
            asst_msg_count: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cache_read: 0,
            total_cache_create: 0,
            messages: Vec::new(),
            tool_uses: Vec::new(),
            file_events: Vec::new(),
        }
    }

    /// Parse and ingest one raw line. No-op (returns `false`) on a malformed
    /// or irrelevant line.
    pub fn ingest_line(&mut self, line: &str) -> bool {
        match parse_line(line) {
            Some(entry) => {
                self.ingest_entry(&entry);
                true
            }
            None => false,
        }
    }

    /// Ingest an already-parsed entry.
    pub fn ingest_entry(&mut self, entry: &JsonlEntry) {
        if self.slug.is_none() {
            self.slug = entry.slug.clone();
        }
        if self.git_branch.is_none() {
            self.git_branch = entry.git_branch.clone();
        }
        if self.version.is_none() {
            self.version = entry.version.clone();
        }
        if self.cwd.is_none() {
            self.cwd = entry.cwd.clone();
        }

        if let Some(ts) = &entry.timestamp {
            match &self.first_timestamp {
                Some(first) if ts >= first => {}
                _ => self.first_timestamp = Some(ts.clone()),
            }
            match &self.last_timestamp {
                Some(last) if ts <= last => {}
                _ => self.last_timestamp = Some(ts.clone()),
            }
        }

        if entry.entry_type != "user" && entry.entry_type != "assistant" {
            return;
        }
        let Some(msg) = &entry.message else { return };
        let Some(role) = msg
            .role
            .as_deref()
            .or(Some(entry.entry_type.as_str()))
            .and_then(Role::parse)
        else {
            return;
        };

        let uuid = entry
            .uuid
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.session_id, self.seq_num));
        let msg_model = msg.model.clone();
        if self.model.is_none() {
            self.model = msg_model.clone();
        }

        let (content_text, thinking_text, tool_use_rows, file_event_rows, tool_uses_json) =
            self.extract_content(msg.content.as_ref(), &uuid, entry.timestamp.as_deref());

        self.total_input_tokens += msg.usage.input_tokens;
        self.total_output_tokens += msg.usage.output_tokens;
        self.total_cache_read += msg.usage.cache_read;
        self.total_cache_create += msg.usage.cache_create;

        match role {
            Role::User => self.user_msg_count += 1,
            Role::Assistant => self.asst_msg_count += 1,
        }

        self.messages.push(Message {
            uuid,
            session_id: self.session_id.clone(),
            parent_uuid: entry.parent_uuid.clone(),
            role,
            content_text,
            thinking_text,
            tool_uses_json,
            model: msg_model.or_else(|| self.model.clone()),
            input_tokens: msg.usage.input_tokens,
            output_tokens: msg.usage.output_tokens,
            cache_read: msg.usage.cache_read,
            cache_create: msg.usage.cache_create,
            timestamp: entry.timestamp.clone(),
            seq_num: self.seq_num,
        });
        self.tool_uses.extend(tool_use_rows);
        self.file_events.extend(file_event_rows);
        self.seq_num += 1;
    }

    #[allow(clippy::type_complexity)]
    fn extract_content(
        &self,
        content: Option<&JsonlContent>,
        message_uuid: &str,
        timestamp: Option<&str>,
    ) -> (String, Option<String>, Vec<ToolUse>, Vec<FileEvent>, Option<String>) {
        let mut tool_uses = Vec::new();
        let mut file_events = Vec::new();
        let mut tool_summaries = Vec::new();

        let (content_text, thinking_text) = match content {
            None => (String::new(), None),
            Some(JsonlContent::Text(text)) => (text.clone(), None),
            Some(JsonlContent::Blocks(blocks)) => {
                let mut text_parts = Vec::new();
                let mut thinking_parts = Vec::new();
                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => text_parts.push(text.clone()),
                        ContentBlock::Thinking { thinking } => {
                            thinking_parts.push(thinking.clone())
                        }
                        ContentBlock::ToolUse { id, name, input } => {
                            let summary = extract_tool_summary(name, input);
                            tool_summaries.push(serde_json::json!({
                                "name": name,
                                "input_summary": summary,
                            }));
                            tool_uses.push(ToolUse {
                                tool_use_id: id.clone(),
                                session_id: self.session_id.clone(),
                                message_uuid: message_uuid.to_string(),
                                tool_name: name.clone(),
                                input_summary: summary,
                                timestamp: timestamp.map(str::to_string),
                            });
                            if let Some(event) =
                                file_event_for_tool(&self.session_id, name, input, timestamp)
                            {
                                file_events.push(event);
                            }
                        }
                        ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
                    }
                }
                (
                    text_parts.join("\n"),
                    if thinking_parts.is_empty() {
                        None
                    } else {
                        Some(thinking_parts.join("\n"))
                    },
                )
            }
        };

        let tool_uses_json = if tool_summaries.is_empty() {
            None
        } else {
            Some(serde_json::Value::Array(tool_summaries).to_string())
        };

        (content_text, thinking_text, tool_uses, file_events, tool_uses_json)
    }

    /// Finish accumulation and build the normalized `Session` row plus all
    /// derivative rows. `cwd` found inside the log (if any) overrides the
    /// directory-name-derived `working_dir`, per the data model.
    pub fn finish(
        self,
        project_dir: &str,
        file_size_bytes: i64,
        jsonl_path: &str,
        indexed_at: &str,
    ) -> ParsedFile {
        let working_dir = self
            .cwd
            .clone()
            .unwrap_or_else(|| project_dir_to_path(project_dir));

        let session = Session {
            session_id: self.session_id.clone(),
            slug: self.slug,
            project_dir: project_dir.to_string(),
            working_dir,
            git_branch: self.git_branch,
            model: self.model,
            version: self.version,
            first_message_timestamp: self.first_timestamp,
            last_message_timestamp: self.last_timestamp,
            message_count: self.user_msg_count + self.asst_msg_count,
            user_msg_count: self.user_msg_count,
            asst_msg_count: self.asst_msg_count,
            total_input_tokens: self.total_input_tokens,
            total_output_tokens: self.total_output_tokens,
            total_cache_read: self.total_cache_read,
            total_cache_create: self.total_cache_create,
            file_size_bytes,
            jsonl_path: jsonl_path.to_string(),
            indexed_at: indexed_at.to_string(),
        };

        ParsedFile {
            session,
            messages: self.messages,
            tool_uses: self.tool_uses,
            file_events: self.file_events,
        }
    }
}

/// Extract the field used for a tool's `input_summary`, per the table in
/// the data model.
pub fn extract_tool_summary(tool_name: &str, input: &serde_json::Value) -> String {
    let Some(obj) = input.as_object() else {
        return String::new();
    };
    let field = match tool_name {
        "Read" | "Write" | "Edit" => Some("file_path"),
        "Bash" => Some("command"),
        "Grep" | "Glob" => Some("pattern"),
        "Task" | "TaskCreate" => Some("subject"),
        "TaskUpdate" => Some("description"),
        _ => None,
    };

    let raw = match field {
        Some(f) => obj.get(f).and_then(|v| v.as_str()).map(str::to_string),
        None => ["subject", "description", "file_path", "command", "query"]
            .iter()
            .find_map(|f| obj.get(*f).and_then(|v| v.as_str()).map(str::to_string)),
    };

    let mut value = raw.unwrap_or_default();
    if value.is_empty() && matches!(tool_name, "Task" | "TaskCreate" | "TaskUpdate") {
        value = obj
            .get("subject")
            .and_then(|v| v.as_str())
            .or_else(|| obj.get("description").and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string();
    }

    let limit = match tool_name {
        "Bash" => BASH_SUMMARY_LIMIT,
        "Task" | "TaskCreate" | "TaskUpdate" => TASK_SUMMARY_LIMIT,
        _ => OTHER_SUMMARY_LIMIT,
    };
    truncate_chars(&value, limit)
}

fn file_event_for_tool(
    session_id: &str,
    tool_name: &str,
    input: &serde_json::Value,
    timestamp: Option<&str>,
) -> Option<FileEvent> {
    let kind = FileEventKind::for_tool(tool_name)?;
    let obj = input.as_object();

    let file_path = match tool_name {
        "Read" | "Write" | "Edit" => obj.and_then(|o| o.get("file_path")).and_then(|v| v.as_str()),
        "Glob" | "Grep" => obj.and_then(|o| o.get("path")).and_then(|v| v.as_str()),
        "Bash" => obj.and_then(|o| o.get("command")).and_then(|v| v.as_str()),
        _ => None,
    };

    let path = match (tool_name, file_path) {
        ("Bash", Some(cmd)) if !cmd.is_empty() => truncate_chars(cmd, BASH_FILE_EVENT_COMMAND_LIMIT),
        (_, Some(p)) if !p.is_empty() => p.to_string(),
        _ => return None,
    };

    Some(FileEvent {
        session_id: session_id.to_string(),
        file_path: path,
        event_type: kind,
        timestamp: timestamp.map(str::to_string),
    })
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    s.chars().take(limit).collect()
}

/// First `PREVIEW_LIMIT` characters of the first text block in `content`,
/// used for tail-watcher `new_message` events.
pub fn preview_text(content: Option<&JsonlContent>) -> String {
    match content {
        None => String::new(),
        Some(JsonlContent::Text(text)) => truncate_chars(text, PREVIEW_LIMIT),
        Some(JsonlContent::Blocks(blocks)) => blocks
            .iter()
            .find_map(|b| match b {
                ContentBlock::Text { text } => Some(truncate_chars(text, PREVIEW_LIMIT)),
                _ => None,
            })
            .unwrap_or_default(),
    }
}

/// Names of any `tool_use` blocks in `content`, in order.
pub fn tool_use_names(content: Option<&JsonlContent>) -> Vec<String> {
    match content {
        Some(JsonlContent::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(json: &str) -> String {
        json.to_string()
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let mut acc = SessionAccumulator::new("s1");
        assert!(!acc.ingest_line("{not valid json"));
        assert!(!acc.ingest_line(""));
    }

    #[test]
    fn end_to_end_three_record_scenario() {
        let mut acc = SessionAccumulator::new("s1");
        acc.ingest_line(&line(
            r#"{"type":"user","uuid":"u1","timestamp":"2026-01-01T00:00:00Z","message":{"role":"user","content":"hello"}}"#,
        ));
        acc.ingest_line(&line(
            r#"{"type":"assistant","uuid":"u2","timestamp":"2026-01-01T00:00:01Z","message":{"role":"assistant","content":"hi","usage":{"input_tokens":10,"output_tokens":20}}}"#,
        ));
        acc.ingest_line(&line(
            r#"{"type":"assistant","uuid":"u3","timestamp":"2026-01-01T00:00:02Z","message":{"role":"assistant","content":[{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"/tmp/demo/x.py"}}]}}"#,
        ));

        let parsed = acc.finish("-tmp-demo", 123, "/tmp/demo/s1.jsonl", "2026-01-01T00:00:03Z");
        assert_eq!(parsed.session.message_count, 3);
        assert_eq!(parsed.session.user_msg_count, 1);
        assert_eq!(parsed.session.asst_msg_count, 2);
        assert_eq!(parsed.session.total_input_tokens, 10);
        assert_eq!(parsed.session.total_output_tokens, 20);
        assert_eq!(parsed.file_events.len(), 1);
        assert_eq!(parsed.file_events[0].file_path, "/tmp/demo/x.py");
        assert_eq!(parsed.file_events[0].event_type, FileEventKind::Read);
        assert_eq!(parsed.tool_uses.len(), 1);
        assert_eq!(parsed.tool_uses[0].tool_name, "Read");
        assert_eq!(parsed.messages.len(), 3);
        assert_eq!(parsed.messages[0].seq_num, 0);
        assert_eq!(parsed.messages[2].seq_num, 2);
    }

    #[test]
    fn seq_num_is_dense_across_skipped_lines() {
        let mut acc = SessionAccumulator::new("s1");
        acc.ingest_line("not json at all");
        acc.ingest_line(&line(
            r#"{"type":"user","message":{"role":"user","content":"a"}}"#,
        ));
        acc.ingest_line(&line(r#"{"type":"summary","foo":"bar"}"#));
        acc.ingest_line(&line(
            r#"{"type":"assistant","message":{"role":"assistant","content":"b"}}"#,
        ));
        let parsed = acc.finish("-tmp-demo", 10, "/tmp/demo/s1.jsonl", "now");
        let seqs: Vec<i64> = parsed.messages.iter().map(|m| m.seq_num).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn bash_summary_truncated_to_80_chars() {
        let long_cmd = "x".repeat(200);
        let input = serde_json::json!({ "command": long_cmd });
        let summary = extract_tool_summary("Bash", &input);
        assert_eq!(summary.chars().count(), BASH_SUMMARY_LIMIT);
    }

    #[test]
    fn cwd_override_wins_over_project_dir_derivation() {
        let mut acc = SessionAccumulator::new("s1");
        acc.ingest_line(&line(
            r#"{"type":"user","cwd":"/custom/dir","message":{"role":"user","content":"hi"}}"#,
        ));
        let parsed = acc.finish("-tmp-demo", 10, "/tmp/demo/s1.jsonl", "now");
        assert_eq!(parsed.session.working_dir, "/custom/dir");
    }
}
