/// Inline SQL migrations for the fleetdeck database schema.
///
/// Simple inline migrations rather than sqlx migration files: the schema is
/// small and self-contained, and a `_migrations` table tracks what has
/// already run so that non-idempotent statements (`ALTER TABLE ADD COLUMN`)
/// are only ever executed once.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: sessions
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id            TEXT PRIMARY KEY,
    slug                   TEXT,
    project_dir            TEXT NOT NULL,
    working_dir            TEXT NOT NULL,
    git_branch              TEXT,
    model                   TEXT,
    version                 TEXT,
    first_message_timestamp TEXT,
    last_message_timestamp  TEXT,
    message_count           INTEGER NOT NULL DEFAULT 0,
    user_msg_count          INTEGER NOT NULL DEFAULT 0,
    asst_msg_count          INTEGER NOT NULL DEFAULT 0,
    total_input_tokens      INTEGER NOT NULL DEFAULT 0,
    total_output_tokens     INTEGER NOT NULL DEFAULT 0,
    total_cache_read        INTEGER NOT NULL DEFAULT 0,
    total_cache_create      INTEGER NOT NULL DEFAULT 0,
    file_size_bytes         INTEGER NOT NULL DEFAULT 0,
    jsonl_path              TEXT NOT NULL,
    indexed_at              TEXT NOT NULL
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_last ON sessions(last_message_timestamp DESC);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_dir);"#,
    // Migration 2: messages
    r#"
CREATE TABLE IF NOT EXISTS messages (
    uuid           TEXT PRIMARY KEY,
    session_id     TEXT NOT NULL REFERENCES sessions(session_id),
    parent_uuid    TEXT,
    role           TEXT NOT NULL,
    content_text   TEXT NOT NULL DEFAULT '',
    thinking_text  TEXT,
    tool_uses_json TEXT,
    model          TEXT,
    input_tokens   INTEGER NOT NULL DEFAULT 0,
    output_tokens  INTEGER NOT NULL DEFAULT 0,
    cache_read     INTEGER NOT NULL DEFAULT 0,
    cache_create   INTEGER NOT NULL DEFAULT 0,
    timestamp      TEXT,
    seq_num        INTEGER NOT NULL
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, seq_num);"#,
    // Migration 3: external-content FTS5 index + sync trigger
    r#"
CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    content_text,
    thinking_text,
    content='messages',
    content_rowid='rowid'
);
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, content_text, thinking_text)
    VALUES (new.rowid, new.content_text, new.thinking_text);
END;
"#,
    // Migration 4: tool_uses + file_events
    r#"
CREATE TABLE IF NOT EXISTS tool_uses (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    tool_use_id   TEXT NOT NULL,
    session_id    TEXT NOT NULL REFERENCES sessions(session_id),
    message_uuid  TEXT NOT NULL,
    tool_name     TEXT NOT NULL,
    input_summary TEXT NOT NULL DEFAULT '',
    timestamp     TEXT
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_tool_uses_session ON tool_uses(session_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_tool_uses_name ON tool_uses(tool_name);"#,
    r#"
CREATE TABLE IF NOT EXISTS file_events (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(session_id),
    file_path  TEXT NOT NULL,
    event_type TEXT NOT NULL,
    timestamp  TEXT
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_file_events_session ON file_events(session_id);"#,
    // Migration 5: index_meta — the incremental indexer's change-detection anchor
    r#"
CREATE TABLE IF NOT EXISTS index_meta (
    jsonl_path TEXT PRIMARY KEY,
    file_mtime REAL NOT NULL,
    file_size  INTEGER NOT NULL,
    indexed_at TEXT NOT NULL
);
"#,
    // Migration 6: push subscriptions (Web Push + native device tokens)
    r#"
CREATE TABLE IF NOT EXISTS push_subscriptions (
    endpoint   TEXT PRIMARY KEY,
    p256dh     TEXT NOT NULL,
    auth       TEXT NOT NULL,
    user_agent TEXT,
    created_at TEXT NOT NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS push_devices (
    device_token  TEXT PRIMARY KEY,
    platform      TEXT NOT NULL,
    registered_at TEXT NOT NULL
);
"#,
];
