use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use scomms_shared::constants::{
    CERT_FILENAME, DEFAULT_PORT, IDENTITY_FILENAME, KEY_FILENAME,
};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Directory holding `scomms.id`, the transport keypair, the trust
    /// database, and the spool.
    pub data_dir: PathBuf,
    /// Listen addresses; an empty host or `*` binds both families.
    pub listen_addrs: Vec<String>,
    /// Port used when dialing peers and as the default listen port.
    pub port: u16,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            listen_addrs: vec![format!(":{DEFAULT_PORT}")],
            port: DEFAULT_PORT,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("SCOMMS_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(addrs) = std::env::var("SCOMMS_LISTEN") {
            let parsed: Vec<String> = addrs
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !parsed.is_empty() {
                config.listen_addrs = parsed;
            }
        }

        if let Ok(port) = std::env::var("SCOMMS_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                config.port = parsed;
            } else {
                tracing::warn!(value = %port, "Invalid SCOMMS_PORT, using default");
            }
        }

        config
    }

    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join(IDENTITY_FILENAME)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.data_dir.join(CERT_FILENAME)
    }

    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join(KEY_FILENAME)
    }

    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.data_dir = dir.to_path_buf();
        self
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("us", "scomms", "scomms")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("scomms"))
}
