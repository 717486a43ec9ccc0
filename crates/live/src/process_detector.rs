//! OS-portable discovery of live assistant processes.
//!
//! Two back-ends dispatched by host OS: `/proc` scanning on Linux, `ps aux`
//! parsing elsewhere. The excluded command-line markers are configuration
//! (a `Vec<String>`), not a compiled constant — a renamed assistant binary
//! or self-process-name collision is a deployment concern, not a code
//! change. The two back-ends see different `ps`/`/proc` cmdline shapes, so
//! each carries its own marker set rather than sharing one merged list:
//! `/proc`'s cmdline is the exact argv the assistant process was exec'd
//! with, while a `ps aux` line can also capture an unrelated `grep
//! claude`-style invocation racing the scan, which only the POSIX back-end
//! needs to guard against.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetdeck_core::path_to_project_dir;
use tracing::warn;

const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Markers that disqualify an otherwise `claude`-looking process — the
/// assistant's own helper processes and this server's own process name, so
/// it never mistakes itself for a session it should report on. Kept as two
/// separate lists because the two candidate-gathering back-ends see
/// different cmdline shapes: `grep` and `--claude-in-chrome-mcp` only show
/// up as false positives in a `ps aux` line, never in a `/proc` cmdline.
#[derive(Debug, Clone)]
pub struct ProcessDetectorConfig {
    pub linux_excluded_markers: Vec<String>,
    pub posix_excluded_markers: Vec<String>,
}

impl Default for ProcessDetectorConfig {
    fn default() -> Self {
        ProcessDetectorConfig {
            linux_excluded_markers: vec!["--chrome-native-host".to_string(), "server.py".to_string()],
            posix_excluded_markers: vec![
                "--chrome-native-host".to_string(),
                "server.py".to_string(),
                "grep".to_string(),
                "--claude-in-chrome-mcp".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    #[allow(dead_code)]
    pid: u32,
    cmdline: Vec<String>,
    cwd: Option<PathBuf>,
}

/// Returns the set of `session_id`s currently bound to a live assistant
/// process, resolved against `log_root` when a candidate only carries a
/// `cwd` rather than an explicit session flag.
pub async fn detect_live_sessions(
    log_root: &Path,
    config: &ProcessDetectorConfig,
) -> HashSet<String> {
    let markers: &[String] = if cfg!(target_os = "linux") {
        &config.linux_excluded_markers
    } else {
        &config.posix_excluded_markers
    };

    let candidates = match tokio::time::timeout(SUBPROCESS_TIMEOUT, gather_candidates()).await {
        Ok(c) => c,
        Err(_) => {
            warn!("process detector timed out after {SUBPROCESS_TIMEOUT:?}");
            return HashSet::new();
        }
    };

    let mut sessions = HashSet::new();
    for candidate in candidates {
        if !is_assistant_process(&candidate, markers) {
            continue;
        }
        if let Some(id) = resolve_session_id(&candidate, log_root).await {
            sessions.insert(id);
        }
    }
    sessions
}

async fn gather_candidates() -> Vec<Candidate> {
    if cfg!(target_os = "linux") {
        tokio::task::spawn_blocking(linux_candidates)
            .await
            .unwrap_or_default()
    } else {
        tokio::task::spawn_blocking(posix_candidates)
            .await
            .unwrap_or_default()
    }
}

fn is_assistant_process(candidate: &Candidate, excluded_markers: &[String]) -> bool {
    let joined = candidate.cmdline.join(" ");
    if !joined.contains("claude") {
        return false;
    }
    !excluded_markers.iter().any(|marker| joined.contains(marker.as_str()))
}

async fn resolve_session_id(candidate: &Candidate, log_root: &Path) -> Option<String> {
    if let Some(id) = flag_value(&candidate.cmdline, "--resume") {
        if is_uuid_like(&id) {
            return Some(id);
        }
    }
    if let Some(id) = flag_value(&candidate.cmdline, "--session-id") {
        if is_uuid_like(&id) {
            return Some(id);
        }
    }
    let cwd = candidate.cwd.as_ref()?;
    let project_dir = path_to_project_dir(&cwd.to_string_lossy());
    most_recent_jsonl_stem(&log_root.join(project_dir)).await
}

fn flag_value(cmdline: &[String], flag: &str) -> Option<String> {
    cmdline
        .iter()
        .position(|arg| arg == flag)
        .and_then(|i| cmdline.get(i + 1))
        .cloned()
}

fn is_uuid_like(s: &str) -> bool {
    uuid::Uuid::parse_str(s).is_ok()
}

async fn most_recent_jsonl_stem(project_dir: &Path) -> Option<String> {
    let mut entries = tokio::fs::read_dir(project_dir).await.ok()?;
    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let Ok(meta) = entry.metadata().await else { continue };
        let Ok(modified) = meta.modified() else { continue };
        match &best {
            Some((_, best_mtime)) if *best_mtime >= modified => {}
            _ => best = Some((path, modified)),
        }
    }
    best.and_then(|(path, _)| path.file_stem().map(|s| s.to_string_lossy().to_string()))
}

#[cfg(target_os = "linux")]
fn linux_candidates() -> Vec<Candidate> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return out;
    };
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let cmdline_path = entry.path().join("cmdline");
        let Ok(raw) = std::fs::read(&cmdline_path) else {
            continue;
        };
        let cmdline: Vec<String> = raw
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).to_string())
            .collect();
        if cmdline.is_empty() {
            continue;
        }
        let cwd = std::fs::read_link(entry.path().join("cwd")).ok();
        out.push(Candidate { pid, cmdline, cwd });
    }
    out
}

#[cfg(not(target_os = "linux"))]
fn linux_candidates() -> Vec<Candidate> {
    Vec::new()
}

/// `ps aux` fallback for non-Linux POSIX hosts (no portable `cwd`, so
/// candidates without `--resume`/`--session-id` fall back to the
/// log-directory heuristic only when a cwd happens to be inferable — which
/// `ps aux` alone cannot provide).
fn posix_candidates() -> Vec<Candidate> {
    let Ok(output) = std::process::Command::new("ps").arg("aux").output() else {
        return Vec::new();
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut out = Vec::new();
    for line in stdout.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 11 {
            continue;
        }
        let Ok(pid) = fields[1].parse::<u32>() else { continue };
        let cmdline: Vec<String> = fields[10..].iter().map(|s| s.to_string()).collect();
        out.push(Candidate {
            pid,
            cmdline,
            cwd: None,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_markers_configured_not_hardcoded() {
        let markers = vec!["--blocked".to_string()];
        let candidate = Candidate {
            pid: 1,
            cmdline: vec!["claude".to_string(), "--blocked".to_string()],
            cwd: None,
        };
        assert!(!is_assistant_process(&candidate, &markers));

        let candidate2 = Candidate {
            pid: 2,
            cmdline: vec!["claude".to_string(), "--resume".to_string()],
            cwd: None,
        };
        assert!(is_assistant_process(&candidate2, &markers));
    }

    #[test]
    fn non_claude_process_is_rejected() {
        let config = ProcessDetectorConfig::default();
        let candidate = Candidate {
            pid: 3,
            cmdline: vec!["bash".to_string()],
            cwd: None,
        };
        assert!(!is_assistant_process(&candidate, &config.posix_excluded_markers));
    }

    #[test]
    fn linux_backend_does_not_exclude_on_bare_grep() {
        let config = ProcessDetectorConfig::default();
        let candidate = Candidate {
            pid: 4,
            cmdline: vec!["claude".to_string(), "--grep-session".to_string()],
            cwd: None,
        };
        assert!(is_assistant_process(&candidate, &config.linux_excluded_markers));
        assert!(!is_assistant_process(&candidate, &config.posix_excluded_markers));
    }

    #[test]
    fn flag_value_extracts_following_argument() {
        let cmdline = vec![
            "claude".to_string(),
            "--resume".to_string(),
            "11111111-1111-1111-1111-111111111111".to_string(),
        ];
        assert_eq!(
            flag_value(&cmdline, "--resume"),
            Some("11111111-1111-1111-1111-111111111111".to_string())
        );
        assert_eq!(flag_value(&cmdline, "--session-id"), None);
    }

    #[test]
    fn uuid_like_checks_length_and_dash_count() {
        assert!(is_uuid_like("11111111-1111-1111-1111-111111111111"));
        assert!(!is_uuid_like("not-a-uuid"));
    }

    #[tokio::test]
    async fn resolve_session_id_prefers_resume_flag() {
        let candidate = Candidate {
            pid: 1,
            cmdline: vec![
                "claude".to_string(),
                "--resume".to_string(),
                "22222222-2222-2222-2222-222222222222".to_string(),
            ],
            cwd: None,
        };
        let id = resolve_session_id(&candidate, Path::new("/tmp")).await;
        assert_eq!(id, Some("22222222-2222-2222-2222-222222222222".to_string()));
    }

    #[tokio::test]
    async fn resolve_session_id_falls_back_to_most_recent_log_in_cwd_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = PathBuf::from("/tmp/demo");
        let project_dir_name = path_to_project_dir(&cwd.to_string_lossy());
        let project_dir = dir.path().join(&project_dir_name);
        tokio::fs::create_dir_all(&project_dir).await.unwrap();
        tokio::fs::write(project_dir.join("s1.jsonl"), "").await.unwrap();

        let candidate = Candidate {
            pid: 1,
            cmdline: vec!["claude".to_string()],
            cwd: Some(cwd),
        };
        let id = resolve_session_id(&candidate, dir.path()).await;
        assert_eq!(id, Some("s1".to_string()));
    }
}
