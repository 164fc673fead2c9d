//! Configuration types and loading
//!
//! Path precedence: `--config` > `CONFIG_PATH` > `edge-gate.toml`.
//! `UPSTREAM_URL` in the environment overrides `proxy.upstream_url`.

use admission::AdmissionConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    pub proxy: ProxyConfig,
}

/// Listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Upstream application server
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub upstream_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_connections() -> usize {
    1000
}

fn default_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, overlay the environment, validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("UPSTREAM_URL") {
            if !url.trim().is_empty() {
                config.proxy.upstream_url = url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> common::Result<()> {
        if !self.proxy.upstream_url.starts_with("http://")
            && !self.proxy.upstream_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "upstream_url must start with http:// or https://, got: {}",
                self.proxy.upstream_url
            )));
        }

        if self.proxy.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.admission.window_secs == 0 {
            return Err(common::Error::invalid(
                "admission.window_secs",
                "must be greater than 0",
            ));
        }

        if self.admission.limit == 0 {
            return Err(common::Error::invalid(
                "admission.limit",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("edge-gate.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge-gate.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn valid_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:3000"

[admission]
limit = 50
blocklist = ["AhrefsBot", "PetalBot"]

[proxy]
upstream_url = "http://127.0.0.1:3001"
"#
    }

    #[test]
    fn test_load_valid_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("UPSTREAM_URL") };
        let (_dir, path) = write_config(valid_toml());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr.port(), 3000);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.admission.window_secs, 60);
        assert_eq!(config.admission.limit, 50);
        assert_eq!(config.admission.blocklist, vec!["AhrefsBot", "PetalBot"]);
        assert_eq!(config.proxy.upstream_url, "http://127.0.0.1:3001");
        assert_eq!(config.proxy.timeout_secs, 60);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("UPSTREAM_URL") };
        let (_dir, path) = write_config("[proxy]\nupstream_url = \"http://app:3000\"\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr, default_listen_addr());
        assert_eq!(config.admission.limit, 100);
        assert_eq!(config.admission.blocklist.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/edge-gate.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let (_dir, path) = write_config("not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_upstream_url_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let (_dir, path) = write_config(valid_toml());

        unsafe { set_env("UPSTREAM_URL", "https://app.internal:8443") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("UPSTREAM_URL") };

        assert_eq!(config.proxy.upstream_url, "https://app.internal:8443");
    }

    #[test]
    fn test_invalid_upstream_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("UPSTREAM_URL") };
        let (_dir, path) = write_config("[proxy]\nupstream_url = \"app:3000\"\n");

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("upstream_url"), "got: {err}");
    }

    #[test]
    fn test_zero_values_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("UPSTREAM_URL") };

        for body in [
            "[server]\nmax_connections = 0\n[proxy]\nupstream_url = \"http://app\"\n",
            "[admission]\nwindow_secs = 0\n[proxy]\nupstream_url = \"http://app\"\n",
            "[admission]\nlimit = 0\n[proxy]\nupstream_url = \"http://app\"\n",
            "[proxy]\nupstream_url = \"http://app\"\ntimeout_secs = 0\n",
        ] {
            let (_dir, path) = write_config(body);
            assert!(Config::load(&path).is_err(), "should reject: {body}");
        }
    }

    #[test]
    fn test_resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();

        unsafe { set_env("CONFIG_PATH", "/etc/edge/from-env.toml") };
        assert_eq!(
            Config::resolve_path(Some("/cli.toml")),
            PathBuf::from("/cli.toml")
        );
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("/etc/edge/from-env.toml")
        );

        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("edge-gate.toml"));
    }
}
