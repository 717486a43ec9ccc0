//! Layered configuration: compiled-in defaults → config-directory
//! JSON roster → environment variables → CLI flags, in that precedence
//! order (flags win).

use std::path::PathBuf;

use clap::Parser;

const DEFAULT_PORT: u16 = 7860;

/// `fleetdeck` — local-first observability and control plane for a fleet of
/// AI coding assistant sessions.
#[derive(Debug, Parser)]
#[command(name = "fleetdeck", version, about)]
pub struct Cli {
    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Act as a coordinator, federating the peers listed in `machines.json`.
    #[arg(long)]
    pub coordinator: bool,

    /// Serve over HTTPS if a matching certificate/key pair is found under
    /// the platform-standard locations; falls back to HTTP otherwise.
    #[arg(long)]
    pub https: bool,

    /// Override the assistant transcript root directory
    /// (default `~/.claude/projects`).
    #[arg(long)]
    pub log_root: Option<PathBuf>,

    /// Override the config/data directory (default platform cache dir).
    #[arg(long)]
    pub config_dir: Option<PathBuf>,
}

/// Fully resolved configuration used to build the app and background tasks.
#[derive(Debug, Clone)]
pub struct Config {
    pub hostname: String,
    pub port: u16,
    pub coordinator: bool,
    pub https: bool,
    pub log_root: PathBuf,
    pub config_dir: PathBuf,
}

impl Config {
    /// Resolve from CLI flags, falling back to environment variables and
    /// then compiled-in defaults in that precedence order.
    pub fn resolve(cli: Cli) -> Self {
        let port = cli
            .port
            .or_else(|| std::env::var("FLEETDECK_PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(DEFAULT_PORT);

        let log_root = cli
            .log_root
            .or_else(|| std::env::var("FLEETDECK_LOG_ROOT").ok().map(PathBuf::from))
            .unwrap_or_else(fleetdeck_core::default_log_root);

        let config_dir = cli
            .config_dir
            .or_else(|| std::env::var("FLEETDECK_CONFIG_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(fleetdeck_core::config_dir);

        Config {
            hostname: local_hostname(),
            port,
            coordinator: cli.coordinator,
            https: cli.https,
            log_root,
            config_dir,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.config_dir.join("index.db")
    }

    pub fn machines_config_path(&self) -> PathBuf {
        self.config_dir.join("machines.json")
    }

    pub fn vapid_keys_path(&self) -> PathBuf {
        self.config_dir.join("vapid_keys.json")
    }

    /// Look up a TLS cert/key pair for `--https`: `<hostname>*.crt` under the
    /// config directory or the user's home directory, with a sibling
    /// `.key` file of the same stem. `None` when no such pair exists, in
    /// which case the caller falls back to plain HTTP.
    pub fn tls_pair(&self) -> Option<(PathBuf, PathBuf)> {
        for dir in [self.config_dir.clone(), dirs::home_dir()?] {
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
                if !name.starts_with(&self.hostname) || !name.ends_with(".crt") {
                    continue;
                }
                let key = path.with_extension("key");
                if key.is_file() {
                    return Some((path, key));
                }
            }
        }
        None
    }
}

fn local_hostname() -> String {
    gethostname::gethostname()
        .to_str()
        .map(str::to_owned)
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_take_precedence_over_env() {
        std::env::set_var("FLEETDECK_PORT", "9999");
        let cli = Cli {
            port: Some(1234),
            coordinator: false,
            https: false,
            log_root: None,
            config_dir: None,
        };
        let config = Config::resolve(cli);
        assert_eq!(config.port, 1234);
        std::env::remove_var("FLEETDECK_PORT");
    }

    #[test]
    fn defaults_apply_with_nothing_set() {
        std::env::remove_var("FLEETDECK_PORT");
        let cli = Cli {
            port: None,
            coordinator: false,
            https: false,
            log_root: None,
            config_dir: None,
        };
        let config = Config::resolve(cli);
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
