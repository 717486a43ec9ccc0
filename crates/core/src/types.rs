//! Normalized domain types and raw JSONL wire types.
//!
//! Two families live here: the *raw* `Jsonl*`/`ContentBlock` types mirror the
//! on-disk transcript format verbatim (camelCase keys, optional everything)
//! and are only ever constructed by [`serde_json::from_str`]; the *normalized*
//! types (`Session`, `Message`, `ToolUse`, `FileEvent`) are what the parser
//! produces and what the store persists.

use serde::{Deserialize, Serialize};

/// A message's speaking party. Only `user` and `assistant` turns are
/// persisted — `tool_result` carrier entries are folded into the preceding
/// message's content and never become a `Message` of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a transcript JSONL file, deserialized as written.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonlEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub uuid: Option<String>,
    #[serde(rename = "parentUuid")]
    pub parent_uuid: Option<String>,
    pub timestamp: Option<String>,
    pub slug: Option<String>,
    #[serde(rename = "gitBranch")]
    pub git_branch: Option<String>,
    pub version: Option<String>,
    pub cwd: Option<String>,
    pub message: Option<JsonlMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonlMessage {
    pub role: Option<String>,
    pub model: Option<String>,
    pub content: Option<JsonlContent>,
    #[serde(default)]
    pub usage: JsonlUsage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonlUsage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default, rename = "cache_read_input_tokens")]
    pub cache_read: i64,
    #[serde(default, rename = "cache_creation_input_tokens")]
    pub cache_create: i64,
}

/// `content` is either a bare string or a heterogeneous list of blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JsonlContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One content block. Unrecognized `type` values fall through to `Unknown`
/// rather than failing deserialization — per the parser's tolerance
/// contract, an unfamiliar block must never abort the session.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        content: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

/// Alias used where the spec's design notes refer to the tagged-variant
/// content representation as `Block`.
pub type Block = ContentBlock;

/// A normalized, persisted session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
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

/// A normalized, persisted message row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub uuid: String,
    pub session_id: String,
    pub parent_uuid: Option<String>,
    pub role: Role,
    pub content_text: String,
    pub thinking_text: Option<String>,
    /// JSON-encoded `[{name, input_summary}, ...]`, `None` when no tool uses.
    pub tool_uses_json: Option<String>,
    pub model: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read: i64,
    pub cache_create: i64,
    pub timestamp: Option<String>,
    pub seq_num: i64,
}

/// A normalized, persisted tool-use row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub tool_use_id: String,
    pub session_id: String,
    pub message_uuid: String,
    pub tool_name: String,
    pub input_summary: String,
    pub timestamp: Option<String>,
}

/// The file-system-affecting effect of a tool use, per the emission table
/// in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEventKind {
    Read,
    Create,
    Edit,
    Bash,
}

impl FileEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileEventKind::Read => "read",
            FileEventKind::Create => "create",
            FileEventKind::Edit => "edit",
            FileEventKind::Bash => "bash",
        }
    }

    /// The file-event kind a tool name emits, if any. `None` means the tool
    /// does not produce a file event (e.g. `TaskCreate`).
    pub fn for_tool(tool_name: &str) -> Option<FileEventKind> {
        match tool_name {
            "Read" | "Glob" | "Grep" => Some(FileEventKind::Read),
            "Write" => Some(FileEventKind::Create),
            "Edit" => Some(FileEventKind::Edit),
            "Bash" => Some(FileEventKind::Bash),
            _ => None,
        }
    }
}

/// A normalized, persisted file-event row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    pub session_id: String,
    pub file_path: String,
    pub event_type: FileEventKind,
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
        assert_eq!(Role::User.as_str(), "user");
    }

    #[test]
    fn content_is_untagged_string_or_blocks() {
        let s: JsonlContent = serde_json::from_str("\"hello\"").unwrap();
        matches!(s, JsonlContent::Text(t) if t == "hello");

        let blocks: JsonlContent =
            serde_json::from_str(r#"[{"type":"text","text":"hi"}]"#).unwrap();
        match blocks {
            JsonlContent::Blocks(b) => assert_eq!(b.len(), 1),
            _ => panic!("expected blocks"),
        }
    }

    #[test]
    fn unknown_block_type_does_not_fail_parse() {
        let block: ContentBlock = serde_json::from_str(r#"{"type":"future_thing"}"#).unwrap();
        matches!(block, ContentBlock::Unknown);
    }

    #[test]
    fn file_event_kind_mapping_matches_table() {
        assert_eq!(FileEventKind::for_tool("Read"), Some(FileEventKind::Read));
        assert_eq!(FileEventKind::for_tool("Write"), Some(FileEventKind::Create));
        assert_eq!(FileEventKind::for_tool("Edit"), Some(FileEventKind::Edit));
        assert_eq!(FileEventKind::for_tool("Bash"), Some(FileEventKind::Bash));
        assert_eq!(FileEventKind::for_tool("TaskCreate"), None);
    }
}
