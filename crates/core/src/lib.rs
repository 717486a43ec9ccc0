//! Shared types, JSONL parsing, path encoding, and pricing for fleetdeck.
//!
//! This crate has no I/O of its own beyond reading the platform cache/config
//! directories; it is pure data modeling and parsing, consumed by
//! `fleetdeck-db`, `fleetdeck-live`, `fleetdeck-terminal` and `fleetdeck-server`.

pub mod error;
pub mod parser;
pub mod paths;
pub mod pricing;
pub mod types;

pub use error::ParseError;
pub use parser::{
    extract_tool_summary, parse_line, preview_text, tool_use_names, ParsedFile,
    SessionAccumulator,
};
pub use paths::{
    config_dir, db_path, default_log_root, machines_config_path, path_to_project_dir,
    project_dir_to_path, project_name_from_working_dir, vapid_keys_path,
};
pub use pricing::{estimate_cost, ModelPricing};
pub use types::{
    Block, ContentBlock, FileEvent, FileEventKind, JsonlContent, JsonlEntry, JsonlMessage,
    JsonlUsage, Message, Role, Session, ToolUse,
};
