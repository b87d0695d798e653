use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("beacon minor {0} given without a major")]
    MinorWithoutMajor(u16),
}

/// The family of beacon signals to watch: a UUID, optionally narrowed by
/// major and then minor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeaconIdentity {
    uuid: Uuid,
    major: Option<u16>,
    minor: Option<u16>,
    identifier: String,
}

pub const DEFAULT_REGION_IDENTIFIER: &str = "MyBeacon";

impl BeaconIdentity {
    pub fn new(
        uuid: Uuid,
        major: Option<u16>,
        minor: Option<u16>,
    ) -> Result<Self, IdentityError> {
        if let (None, Some(minor)) = (major, minor) {
            return Err(IdentityError::MinorWithoutMajor(minor));
        }
        Ok(BeaconIdentity {
            uuid,
            major,
            minor,
            identifier: DEFAULT_REGION_IDENTIFIER.to_string(),
        })
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn major(&self) -> Option<u16> {
        self.major
    }

    pub fn minor(&self) -> Option<u16> {
        self.minor
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Unset major/minor components act as wildcards.
    pub fn matches(&self, beacon: &RangedBeacon) -> bool {
        self.uuid == beacon.uuid
            && self.major.is_none_or(|major| beacon.major == Some(major))
            && self.minor.is_none_or(|minor| beacon.minor == Some(minor))
    }
}

impl std::fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}", self.identifier(), self.uuid().hyphenated())?;
        if let Some(major) = self.major() {
            write!(f, " major={major}")?;
        }
        if let Some(minor) = self.minor() {
            write!(f, " minor={minor}")?;
        }
        write!(f, ")")
    }
}

/// Coarse distance bucket reported by the location subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "RawProximity")]
pub enum ProximityClass {
    #[default]
    Unknown,
    Far,
    Near,
    Immediate,
}

impl ProximityClass {
    #[cfg(test)]
    pub const ALL: [ProximityClass; 4] = [
        ProximityClass::Unknown,
        ProximityClass::Far,
        ProximityClass::Near,
        ProximityClass::Immediate,
    ];

    /// Host framework codes: 0 unknown, 1 immediate, 2 near, 3 far.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ProximityClass::Immediate,
            2 => ProximityClass::Near,
            3 => ProximityClass::Far,
            _ => ProximityClass::Unknown,
        }
    }

    /// Accepts the names as well as codes sent as strings, e.g. `"2"`.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if let Ok(code) = name.parse::<i64>() {
            return ProximityClass::from_code(code);
        }
        match name.to_ascii_lowercase().as_str() {
            "far" => ProximityClass::Far,
            "near" => ProximityClass::Near,
            "immediate" => ProximityClass::Immediate,
            _ => ProximityClass::Unknown,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProximity {
    Code(i64),
    Name(String),
    // Floats, nulls, objects: anything the subsystem might grow into.
    Other(serde::de::IgnoredAny),
}

impl From<RawProximity> for ProximityClass {
    fn from(raw: RawProximity) -> Self {
        match raw {
            RawProximity::Code(code) => ProximityClass::from_code(code),
            RawProximity::Name(name) => ProximityClass::from_name(&name),
            RawProximity::Other(_) => ProximityClass::Unknown,
        }
    }
}

/// One entry of a ranging result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RangedBeacon {
    pub uuid: Uuid,
    #[serde(default)]
    pub major: Option<u16>,
    #[serde(default)]
    pub minor: Option<u16>,
    #[serde(default)]
    pub proximity: ProximityClass,
}
