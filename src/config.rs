use std::path::Path;

use serde_derive::Deserialize;
use uuid::Uuid;

use crate::beacon::{BeaconIdentity, IdentityError};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid beacon identity: {0}")]
    Identity(#[from] IdentityError),
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub beacon: BeaconConfig,
    pub mqtt: Option<MqttConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BeaconConfig {
    pub uuid: Uuid,
    pub major: Option<u16>,
    pub minor: Option<u16>,
    pub identifier: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::de::from_str(contents)?;
        // Surface a bad major/minor combination at startup, not on first use.
        config.beacon.identity()?;
        Ok(config)
    }
}

impl BeaconConfig {
    pub fn identity(&self) -> Result<BeaconIdentity, IdentityError> {
        let identity = BeaconIdentity::new(self.uuid, self.major, self.minor)?;
        Ok(match &self.identifier {
            Some(identifier) => identity.with_identifier(identifier.clone()),
            None => identity,
        })
    }
}
