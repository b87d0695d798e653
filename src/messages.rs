use serde_derive::{Deserialize, Serialize};

use crate::beacon::{BeaconIdentity, RangedBeacon};
use crate::notifier::DisplayState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedWhenInUse,
    AuthorizedAlways,
}

impl AuthorizationStatus {
    /// Monitoring keeps running in the background, so only "always" will do.
    pub fn permits_monitoring(self) -> bool {
        self == AuthorizationStatus::AuthorizedAlways
    }
}

impl From<String> for AuthorizationStatus {
    fn from(status: String) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "authorized_always" | "always" => AuthorizationStatus::AuthorizedAlways,
            "authorized_when_in_use" | "when_in_use" => AuthorizationStatus::AuthorizedWhenInUse,
            "denied" => AuthorizationStatus::Denied,
            "restricted" => AuthorizationStatus::Restricted,
            _ => AuthorizationStatus::NotDetermined,
        }
    }
}

fn available() -> bool {
    true
}

/// Callbacks from the location subsystem.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "event")]
pub enum LocationEvent {
    #[serde(rename = "authorization")]
    AuthorizationChanged {
        status: AuthorizationStatus,
        #[serde(default = "available")]
        monitoring_available: bool,
        #[serde(default = "available")]
        ranging_available: bool,
    },
    #[serde(rename = "ranging")]
    Ranged {
        #[serde(default)]
        beacons: Vec<RangedBeacon>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: &'static str,
    pub message: &'static str,
    pub action: &'static str,
}

pub const BEACON_DETECTED: Alert = Alert {
    title: "Beacon detected",
    message: "",
    action: "Continue",
};

/// Requests for the presentation layer and the location subsystem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PresenterCommand {
    RequestAlwaysAuthorization,
    StartMonitoring { identity: BeaconIdentity },
    StartRanging { identity: BeaconIdentity },
    UpdateDisplay { display: DisplayState },
    PresentAlert { alert: Alert },
}
