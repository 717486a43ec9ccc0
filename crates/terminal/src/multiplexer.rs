//! Control plane over an external terminal multiplexer.
//!
//! Every session this system creates carries [`SESSION_PREFIX`] so it can
//! be told apart from any other session a user runs under the same
//! multiplexer. All operations here shell out to the multiplexer binary
//! (`tmux` by convention) and never touch a PTY directly — that happens
//! only in the per-connection attach bridge ([`crate::attach`]).

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::TerminalError;

pub const SESSION_PREFIX: &str = "fleetdeck-";
const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(5);

/// One multiplexer session as reported by `list-sessions`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MultiplexerSession {
    pub name: String,
    pub created_unix: i64,
    pub cwd: String,
    pub pid: u32,
}

#[derive(Debug, Clone)]
pub struct Multiplexer {
    binary: String,
}

impl Default for Multiplexer {
    fn default() -> Self {
        Multiplexer {
            binary: "tmux".to_string(),
        }
    }
}

impl Multiplexer {
    pub fn new(binary: impl Into<String>) -> Self {
        Multiplexer { binary: binary.into() }
    }

    pub fn session_name(&self, short_id: &str) -> String {
        format!("{SESSION_PREFIX}{short_id}")
    }

    pub fn binary_name(&self) -> &str {
        &self.binary
    }

    /// Create a detached session whose foreground command is the assistant
    /// binary, optionally resuming `resume_id` (validated as a bare UUID
    /// before being embedded in the shell word).
    pub async fn spawn(
        &self,
        short_id: &str,
        working_dir: &Path,
        resume_id: Option<&str>,
        rows: u16,
        cols: u16,
    ) -> Result<(), TerminalError> {
        if !working_dir.is_dir() {
            return Err(TerminalError::InvalidWorkingDir(working_dir.display().to_string()));
        }
        if let Some(id) = resume_id {
            if !is_uuid(id) {
                return Err(TerminalError::InvalidResumeId(id.to_string()));
            }
        }

        let name = self.session_name(short_id);
        let command = match resume_id {
            Some(id) => format!("claude --resume {id}"),
            None => "claude".to_string(),
        };

        self.run(&[
            "new-session",
            "-d",
            "-s",
            &name,
            "-x",
            &cols.to_string(),
            "-y",
            &rows.to_string(),
            "-c",
            &working_dir.display().to_string(),
            &command,
        ])
        .await?;
        Ok(())
    }

    /// List sessions carrying [`SESSION_PREFIX`].
    pub async fn list(&self) -> Result<Vec<MultiplexerSession>, TerminalError> {
        let format = "#{session_name}|#{session_created}|#{pane_current_path}|#{pane_pid}";
        let output = self
            .run(&["list-sessions", "-F", format])
            .await
            .unwrap_or_default();

        let mut sessions = Vec::new();
        for line in output.lines() {
            let fields: Vec<&str> = line.splitn(4, '|').collect();
            let [name, created, cwd, pid] = fields[..] else { continue };
            if !name.starts_with(SESSION_PREFIX) {
                continue;
            }
            let (Ok(created_unix), Ok(pid)) = (created.parse(), pid.parse()) else { continue };
            sessions.push(MultiplexerSession {
                name: name.to_string(),
                created_unix,
                cwd: cwd.to_string(),
                pid,
            });
        }
        Ok(sessions)
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.run(&["has-session", "-t", name]).await.is_ok()
    }

    pub async fn kill(&self, name: &str) -> Result<(), TerminalError> {
        self.run(&["kill-session", "-t", name]).await?;
        Ok(())
    }

    pub async fn resize(&self, name: &str, rows: u16, cols: u16) -> Result<(), TerminalError> {
        self.run(&["resize-window", "-t", name, "-x", &cols.to_string(), "-y", &rows.to_string()])
            .await?;
        Ok(())
    }

    /// Send `text` plus a newline keystroke to `name`'s input. A trailing
    /// newline on `text` is stripped — the multiplexer supplies its own
    /// terminator via the separate `Enter` key send.
    pub async fn inject(&self, name: &str, text: &str) -> Result<(), TerminalError> {
        let payload = text.strip_suffix('\n').unwrap_or(text);
        self.run(&["send-keys", "-t", name, "-l", payload]).await?;
        self.run(&["send-keys", "-t", name, "Enter"]).await?;
        Ok(())
    }

    /// Scan each tracked session's root pane PID and its direct children
    /// for `--resume <session_id>` in `argv`, used to implement idempotent
    /// "join".
    pub async fn find_by_resume(&self, session_id: &str) -> Result<Option<String>, TerminalError> {
        for session in self.list().await? {
            if self.pid_tree_has_resume(session.pid, session_id).await {
                return Ok(Some(session.name));
            }
        }
        Ok(None)
    }

    async fn pid_tree_has_resume(&self, root_pid: u32, session_id: &str) -> bool {
        let needle = format!("--resume {session_id}");
        for pid in [root_pid].into_iter().chain(child_pids(root_pid).await) {
            let Ok(cmdline) = tokio::fs::read(format!("/proc/{pid}/cmdline")).await else {
                continue;
            };
            let joined = cmdline
                .split(|&b| b == 0)
                .map(|s| String::from_utf8_lossy(s).to_string())
                .collect::<Vec<_>>()
                .join(" ");
            if joined.contains(&needle) {
                return true;
            }
        }
        false
    }

    async fn run(&self, args: &[&str]) -> Result<String, TerminalError> {
        let fut = Command::new(&self.binary).args(args).output();
        let output = match tokio::time::timeout(SUBPROCESS_TIMEOUT, fut).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(TerminalError::MultiplexerUnavailable(e.to_string())),
            Err(_) => return Err(TerminalError::MultiplexerUnavailable("timed out".to_string())),
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            debug!(binary = %self.binary, args = ?args, stderr = %stderr, "multiplexer command failed");
            return Err(TerminalError::CommandFailed(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

async fn child_pids(parent: u32) -> Vec<u32> {
    let Ok(mut entries) = tokio::fs::read_dir("/proc").await else {
        return Vec::new();
    };
    let mut out = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let Ok(stat) = tokio::fs::read_to_string(format!("/proc/{pid}/stat")).await else {
            continue;
        };
        // Field 4 (after the parenthesized comm) is the parent pid.
        if let Some(ppid) = stat.rsplit(')').next().and_then(|rest| rest.split_whitespace().nth(1))
        {
            if ppid.parse::<u32>() == Ok(parent) {
                out.push(pid);
            }
        }
    }
    out
}

fn is_uuid(s: &str) -> bool {
    uuid::Uuid::parse_str(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_name_carries_prefix() {
        let mux = Multiplexer::default();
        assert_eq!(mux.session_name("abc123"), "fleetdeck-abc123");
    }

    #[test]
    fn uuid_validation_rejects_shell_metacharacters() {
        assert!(is_uuid("11111111-1111-1111-1111-111111111111"));
        assert!(!is_uuid("11111111-1111-1111-1111-111111111111; rm -rf /"));
        assert!(!is_uuid("not-a-uuid"));
    }

    #[tokio::test]
    async fn spawn_rejects_nonexistent_working_dir() {
        let mux = Multiplexer::new("tmux");
        let result = mux
            .spawn("x", Path::new("/definitely/does/not/exist"), None, 24, 80)
            .await;
        assert!(matches!(result, Err(TerminalError::InvalidWorkingDir(_))));
    }

    #[tokio::test]
    async fn spawn_rejects_non_uuid_resume_id() {
        let dir = tempfile::tempdir().unwrap();
        let mux = Multiplexer::new("tmux");
        let result = mux.spawn("x", dir.path(), Some("'; rm -rf /"), 24, 80).await;
        assert!(matches!(result, Err(TerminalError::InvalidResumeId(_))));
    }

    #[test]
    fn list_parses_well_formed_lines_and_skips_foreign_sessions() {
        let lines = "fleetdeck-abc|1700000000|/tmp/demo|1234\nother-session|1700000001|/tmp|5678";
        let mut sessions = Vec::new();
        for line in lines.lines() {
            let fields: Vec<&str> = line.splitn(4, '|').collect();
            let [name, created, cwd, pid] = fields[..] else { continue };
            if !name.starts_with(SESSION_PREFIX) {
                continue;
            }
            let (Ok(created_unix), Ok(pid)) = (created.parse::<i64>(), pid.parse::<u32>()) else {
                continue;
            };
            sessions.push(MultiplexerSession {
                name: name.to_string(),
                created_unix,
                cwd: cwd.to_string(),
                pid,
            });
        }
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "fleetdeck-abc");
    }
}
