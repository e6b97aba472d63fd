use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::info;
use serde_derive::{Deserialize, Serialize};
use shellexpand::tilde;
use strum_macros::Display;

use crate::error::Error;

/// Hostname of the production push gateway.
pub const PRODUCTION_GATEWAY_HOST: &str = "gateway.push.apple.com";
/// Hostname of the sandbox push gateway, used with development certificates.
pub const SANDBOX_GATEWAY_HOST: &str = "gateway.sandbox.push.apple.com";
/// The gateway port. It's the same for both environments.
pub const GATEWAY_PORT: u16 = 2195;

/// Hostname of the production feedback service.
pub const PRODUCTION_FEEDBACK_HOST: &str = "feedback.push.apple.com";
/// Hostname of the sandbox feedback service.
pub const SANDBOX_FEEDBACK_HOST: &str = "feedback.sandbox.push.apple.com";
/// The feedback service port, shared by both environments.
pub const FEEDBACK_PORT: u16 = 2196;

/// The two well-known gateway environments.
/// Which one to use is determined by the kind of certificate you own:
/// production certificates only work against the production gateway,
/// development certificates only against the sandbox.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Sandbox,
}

/// All settings of the push client.
#[derive(PartialEq, Clone, Debug, Deserialize, Serialize)]
pub struct Shared {
    /// Which of the two well-known gateways to talk to.
    #[serde(default)]
    pub environment: Environment,
    /// Overrides the well-known gateway hostname. Mostly useful for tests.
    pub host: Option<String>,
    /// Overrides the default gateway port.
    pub port: Option<u16>,

    /// Don't access this property directly, but rather use the getter with
    /// the same name.
    ///
    /// The path to the client certificate (PEM) the gateway authenticates
    /// us with.
    pub certificate: Option<PathBuf>,
    /// Don't access this property directly, but rather use the getter with
    /// the same name.
    ///
    /// The path to the client's private key (unencrypted PKCS#8 or RSA PEM).
    pub private_key: Option<PathBuf>,
    /// Don't access this property directly, but rather use the getter with
    /// the same name.
    ///
    /// The path to the CA certificate used to verify the gateway's identity.
    pub gateway_ca: Option<PathBuf>,

    /// How long to wait for an error response after each packet, in
    /// milliseconds.
    ///
    /// The wire protocol is silent on success and only sends a frame to
    /// reject a packet, so this wait decides when silence counts as
    /// success. Shorter values risk missing late rejections on slow
    /// networks, longer values stall the whole queue on every successful
    /// send.
    #[serde(default = "default_response_wait_ms")]
    pub response_wait_ms: u64,
    /// How often a single (message, recipient) pair is attempted before it's
    /// recorded as permanently failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for Shared {
    fn default() -> Self {
        Shared {
            environment: Environment::default(),
            host: None,
            port: None,
            certificate: None,
            private_key: None,
            gateway_ca: None,
            response_wait_ms: default_response_wait_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// The parent settings struct.
#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "Default::default")]
    pub shared: Shared,
}

/// Little helper which expands a given path's `~` characters to a fully
/// qualified path.
pub fn expand_home(old_path: &Path) -> PathBuf {
    PathBuf::from(tilde(&old_path.to_string_lossy()).into_owned())
}

impl Shared {
    /// The gateway hostname: either the explicit override or the well-known
    /// hostname of the configured environment.
    pub fn host(&self) -> String {
        if let Some(host) = &self.host {
            return host.clone();
        }
        match self.environment {
            Environment::Production => PRODUCTION_GATEWAY_HOST.to_string(),
            Environment::Sandbox => SANDBOX_GATEWAY_HOST.to_string(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(GATEWAY_PORT)
    }

    /// The feedback service hostname for the configured environment.
    /// A `host` override applies to the gateway only, not to the feedback
    /// service.
    pub fn feedback_host(&self) -> String {
        match self.environment {
            Environment::Production => PRODUCTION_FEEDBACK_HOST.to_string(),
            Environment::Sandbox => SANDBOX_FEEDBACK_HOST.to_string(),
        }
    }

    pub fn feedback_port(&self) -> u16 {
        FEEDBACK_PORT
    }

    pub fn certificate(&self) -> PathBuf {
        if let Some(path) = &self.certificate {
            expand_home(path)
        } else {
            default_directory().join("certs").join("push.cert")
        }
    }

    pub fn private_key(&self) -> PathBuf {
        if let Some(path) = &self.private_key {
            expand_home(path)
        } else {
            default_directory().join("certs").join("push.key")
        }
    }

    pub fn gateway_ca(&self) -> PathBuf {
        if let Some(path) = &self.gateway_ca {
            expand_home(path)
        } else {
            default_directory().join("certs").join("gateway_ca.cert")
        }
    }
}

impl Settings {
    /// Try to read existing config files, while using default values for
    /// non-existing fields. If successful, this will return a full config as
    /// well as a boolean on whether we found an existing configuration file
    /// or not.
    pub fn read(from_file: &Option<PathBuf>) -> Result<(Settings, bool), Error> {
        // Load the config from a very specific file path
        if let Some(path) = from_file {
            if !path.exists() || !path.is_file() {
                return Err(Error::FileNotFound(format!(
                    "Couldn't find config at path {path:?}"
                )));
            }

            let settings = parse_config_file(path)?;
            return Ok((settings, true));
        };

        info!("Parsing config files");
        for directory in config_directories() {
            let path = directory.join("pushq.yml");
            info!("Checking path: {path:?}");

            if path.exists() && path.is_file() {
                info!("Found config file at: {path:?}");
                let settings = parse_config_file(&path)?;
                return Ok((settings, true));
            }
        }

        info!("No config file found. Use default config.");
        Ok((Settings::default(), false))
    }
}

fn parse_config_file(path: &Path) -> Result<Settings, Error> {
    // Open the file in read-only mode with buffer.
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    serde_yaml::from_reader(reader).map_err(|err| Error::ConfigDeserialization(err.to_string()))
}

/// The directories that are searched for a `pushq.yml`, in order.
fn config_directories() -> Vec<PathBuf> {
    let mut directories = Vec::new();
    if let Some(config_dir) = dirs::config_dir() {
        directories.push(config_dir.join("pushq"));
    }
    directories.push(PathBuf::from("."));

    directories
}

/// The directory that is used for all of pushq's state, e.g. the default
/// certificate location.
fn default_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pushq")
}

fn default_response_wait_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_settings_target_production() {
        let settings = Settings::default();

        assert_eq!(settings.shared.environment, Environment::Production);
        assert_eq!(settings.shared.host(), PRODUCTION_GATEWAY_HOST);
        assert_eq!(settings.shared.feedback_host(), PRODUCTION_FEEDBACK_HOST);
        assert_eq!(settings.shared.port(), GATEWAY_PORT);
        assert_eq!(settings.shared.response_wait_ms, 1000);
        assert_eq!(settings.shared.max_attempts, 3);
    }

    #[test]
    fn sandbox_environment_selects_sandbox_hosts() {
        let settings: Settings =
            serde_yaml::from_str("shared:\n  environment: sandbox\n").unwrap();

        assert_eq!(settings.shared.environment, Environment::Sandbox);
        assert_eq!(settings.shared.host(), SANDBOX_GATEWAY_HOST);
        assert_eq!(settings.shared.feedback_host(), SANDBOX_FEEDBACK_HOST);
    }

    #[test]
    fn overrides_beat_well_known_hosts() {
        let settings: Settings = serde_yaml::from_str(
            "shared:\n  host: localhost\n  port: 12345\n  response_wait_ms: 50\n",
        )
        .unwrap();

        assert_eq!(settings.shared.host(), "localhost");
        assert_eq!(settings.shared.port(), 12345);
        assert_eq!(settings.shared.response_wait_ms, 50);
        // Unset fields fall back to their defaults.
        assert_eq!(settings.shared.max_attempts, 3);
    }
}
