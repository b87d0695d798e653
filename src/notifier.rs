use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use serde_derive::Serialize;

use crate::beacon::ProximityClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Gray,
    Blue,
    Orange,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    pub background: Color,
    pub label: &'static str,
}

impl DisplayState {
    pub fn for_class(class: ProximityClass) -> Self {
        let (background, label) = match class {
            ProximityClass::Unknown => (Color::Gray, "UNKNOWN"),
            ProximityClass::Far => (Color::Blue, "FAR"),
            ProximityClass::Near => (Color::Orange, "NEAR"),
            ProximityClass::Immediate => (Color::Red, "RIGHT HERE"),
        };
        DisplayState { background, label }
    }
}

/// Every class except Unknown counts as a detection.
pub fn is_alert_eligible(class: ProximityClass) -> bool {
    !matches!(class, ProximityClass::Unknown)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub display: DisplayState,
    pub fire_alert: bool,
}

/// Maps proximity classifications to display states and fires the
/// "first detection" alert at most once for its lifetime.
#[derive(Debug, Default)]
pub struct ProximityNotifier {
    alerted: AtomicBool,
}

impl ProximityNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    pub fn on_classification(&self, class: ProximityClass) -> Classification {
        let display = DisplayState::for_class(class);
        let fire_alert = is_alert_eligible(class)
            && self
                .alerted
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();

        if fire_alert {
            info!("First detection: beacon is {}", display.label);
        }

        Classification {
            display,
            fire_alert,
        }
    }
}
