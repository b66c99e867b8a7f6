// SPDX-License-Identifier: Apache-2.0

//! Relay configuration file.

use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cryptoport::channel::Options;
use serde::{Deserialize, Serialize};

/// Configuration file template
pub const CONFIG_TEMPLATE: &str = r#"## Configuration for the vcryptodev relay

## Host backend ("cryptodev" or "soft"); probed when unset
# backend = "soft"

## Number of guest devices, registered as minors 0..devices
devices = 1

## Requests a queue holds before submitters block
queue_size = 64

## Bound on the wait for each request, in milliseconds
# timeout_ms = 5000
"#;

/// Relay settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Backend name; probed when unset
    pub backend: Option<String>,

    /// Number of guest devices
    pub devices: u32,

    /// Queue depth of each channel
    pub queue_size: usize,

    /// Wait bound per request in milliseconds; unbounded when unset
    pub timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: None,
            devices: 1,
            queue_size: Options::default().queue_size,
            timeout_ms: None,
        }
    }
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_to_string(path)
            .with_context(|| format!("failed to read config `{}`", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config `{}`", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.devices == 0 {
            bail!("at least one device is required");
        }
        if self.queue_size == 0 {
            bail!("queue_size must be positive");
        }
        if self.timeout_ms == Some(0) {
            bail!("timeout_ms must be positive");
        }
        Ok(())
    }

    /// Channel settings derived from this configuration.
    pub fn channel_options(&self) -> Options {
        Options {
            queue_size: self.queue_size,
            timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use tempfile::NamedTempFile;

    fn write(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn template() {
        let config: Config = toml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.channel_options(), Options::default());
    }

    #[test]
    fn load() {
        let file = write(
            r#"
            backend = "soft"
            devices = 3
            timeout_ms = 250
            "#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(
            config,
            Config {
                backend: Some("soft".into()),
                devices: 3,
                queue_size: 64,
                timeout_ms: Some(250),
            }
        );
        assert_eq!(
            config.channel_options().timeout,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn invalid() {
        for contents in [
            "devices = 0",
            "queue_size = 0",
            "timeout_ms = 0",
            "ring = 4",
        ] {
            let file = write(contents);
            assert!(Config::load(file.path()).is_err(), "{contents}");
        }
        assert!(Config::load(Path::new("/nonexistent/vcryptodev.toml")).is_err());
    }
}
