// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client configuration.
//
// Settings are layered the way the CUPS client library layers them: built-in
// defaults, then the system and per-user `client.conf`, then environment
// variables.  The result is resolved once into a `ServerEndpoint`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SpoolgateError};
use crate::types::{DEFAULT_IPP_PORT, EncryptionMode, ServerEndpoint};

/// System-wide client configuration file.
pub const SYSTEM_CLIENT_CONF: &str = "/etc/cups/client.conf";

/// Client settings for talking to a CUPS server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server hostname, IP literal, or local socket path.
    pub server: String,
    /// Server port (default 631).
    pub port: u16,
    /// Encryption policy applied to every connection.
    pub encryption: EncryptionMode,
    /// Acting user for print submissions.
    pub user: String,
    /// Timeout for connecting and for each socket read/write.
    pub connect_timeout_secs: u64,
    /// Where downloaded PPD files are written (system temp dir if unset).
    pub ppd_dir: Option<PathBuf>,
    /// PEM bundle of extra CA certificates trusted for TLS, e.g. the
    /// self-signed certificate a stock cupsd serves.
    pub ca_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: DEFAULT_IPP_PORT,
            encryption: EncryptionMode::IfRequested,
            user: "anonymous".to_string(),
            connect_timeout_secs: 30,
            ppd_dir: None,
            ca_file: None,
        }
    }
}

impl ClientConfig {
    /// Resolve configuration from `client.conf` files and the process
    /// environment.
    pub fn from_env() -> Self {
        let mut files = vec![PathBuf::from(SYSTEM_CLIENT_CONF)];
        if let Ok(home) = std::env::var("HOME") {
            files.push(Path::new(&home).join(".cups").join("client.conf"));
        }
        Self::resolve(|key| std::env::var(key).ok(), &files)
    }

    /// Layer `client.conf` files (in order) and then variables from `lookup`
    /// over the defaults.  Missing files are skipped.
    pub fn resolve<F>(lookup: F, conf_files: &[PathBuf]) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(user) = lookup("USER").filter(|u| !u.is_empty()) {
            config.user = user;
        }

        for path in conf_files {
            match fs::read_to_string(path) {
                Ok(text) => {
                    debug!(path = %path.display(), "applying client.conf");
                    config.apply_client_conf(&text);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "cannot read client.conf"),
            }
        }

        if let Some(port) = lookup("IPP_PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) if p > 0 => config.port = p,
                _ => warn!(value = %port, "ignoring invalid IPP_PORT"),
            }
        }
        if let Some(server) = lookup("CUPS_SERVER").filter(|s| !s.trim().is_empty()) {
            config.set_server_name(&server);
        }
        if let Some(mode) = lookup("CUPS_ENCRYPTION") {
            config.encryption = EncryptionMode::parse(&mode);
        }
        if let Some(user) = lookup("CUPS_USER").filter(|u| !u.is_empty()) {
            config.user = user;
        }

        config
    }

    /// Apply the directives of a `client.conf` document.
    ///
    /// Recognised: `ServerName`, `Encryption`, `User`.  Other directives and
    /// `#` comments are ignored.
    pub fn apply_client_conf(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((directive, value)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            let value = value.trim();
            match directive.to_ascii_lowercase().as_str() {
                "servername" => self.set_server_name(value),
                "encryption" => self.encryption = EncryptionMode::parse(value),
                "user" => self.user = value.to_string(),
                _ => {}
            }
        }
    }

    /// Set server (and optionally port) from `host`, `host:port`,
    /// `[v6]:port` or `/socket/path`.  A trailing `/version=..` is dropped.
    pub fn set_server_name(&mut self, value: &str) {
        let value = value.trim();
        if value.starts_with('/') {
            self.server = value.to_string();
            return;
        }
        let value = value.split('/').next().unwrap_or(value);

        let (host, port) = if let Some(rest) = value.strip_prefix('[') {
            match rest.split_once(']') {
                Some((host, tail)) => (host, tail.strip_prefix(':')),
                None => (rest, None),
            }
        } else if value.matches(':').count() == 1 {
            match value.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (value, None),
            }
        } else {
            (value, None)
        };

        self.server = host.to_string();
        if let Some(port) = port {
            match port.parse::<u16>() {
                Ok(p) if p > 0 => self.port = p,
                _ => warn!(value = %port, "ignoring invalid server port"),
            }
        }
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Persist settings as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Freeze the address and encryption policy into an endpoint.
    pub fn endpoint(&self) -> Result<ServerEndpoint> {
        if self.server.is_empty() {
            return Err(SpoolgateError::Config("server name is empty".into()));
        }
        if self.port == 0 {
            return Err(SpoolgateError::Config("server port is 0".into()));
        }
        let encryption = if self.server.starts_with('/') {
            EncryptionMode::Never
        } else {
            self.encryption
        };
        Ok(ServerEndpoint::new(self.server.clone(), self.port, encryption))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_any_source() {
        let config = ClientConfig::resolve(env(&[]), &[]);
        assert_eq!(config.server, "localhost");
        assert_eq!(config.port, 631);
        assert_eq!(config.encryption, EncryptionMode::IfRequested);
        assert!(config.ca_file.is_none());
    }

    #[test]
    fn environment_overrides_client_conf() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("client.conf");
        fs::write(
            &conf,
            "# site defaults\nServerName print.example.com:8631\nEncryption Always\nUser alice\n",
        )
        .unwrap();

        let config = ClientConfig::resolve(
            env(&[("CUPS_ENCRYPTION", "Never"), ("CUPS_USER", "bob")]),
            &[conf],
        );
        assert_eq!(config.server, "print.example.com");
        assert_eq!(config.port, 8631);
        assert_eq!(config.encryption, EncryptionMode::Never);
        assert_eq!(config.user, "bob");
    }

    #[test]
    fn cups_server_with_port_and_ipp_port() {
        let config = ClientConfig::resolve(
            env(&[("IPP_PORT", "8000"), ("CUPS_SERVER", "cups.local")]),
            &[],
        );
        assert_eq!(config.server, "cups.local");
        assert_eq!(config.port, 8000);

        let config = ClientConfig::resolve(
            env(&[("IPP_PORT", "8000"), ("CUPS_SERVER", "[fe80::1]:9631")]),
            &[],
        );
        assert_eq!(config.server, "fe80::1");
        assert_eq!(config.port, 9631);
    }

    #[test]
    fn unknown_encryption_in_environment_is_required() {
        let config = ClientConfig::resolve(env(&[("CUPS_ENCRYPTION", "sometimes")]), &[]);
        assert_eq!(config.encryption, EncryptionMode::Required);
    }

    #[test]
    fn socket_path_endpoint_is_never_encrypted() {
        let mut config = ClientConfig::default();
        config.set_server_name("/run/cups/cups.sock");
        config.encryption = EncryptionMode::Always;
        let endpoint = config.endpoint().unwrap();
        assert!(endpoint.is_local_socket());
        assert_eq!(endpoint.encryption, EncryptionMode::Never);
    }

    #[test]
    fn empty_server_is_rejected() {
        let config = ClientConfig {
            server: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.endpoint(), Err(SpoolgateError::Config(_))));
    }

    #[test]
    fn json_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spoolgate.json");
        let config = ClientConfig {
            server: "print.example.com".into(),
            encryption: EncryptionMode::Required,
            ca_file: Some(PathBuf::from("/etc/cups/ssl/print.example.com.crt")),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ClientConfig::load(&path).unwrap(), config);
    }
}
