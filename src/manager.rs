use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::beacon::{BeaconIdentity, ProximityClass, RangedBeacon};
use crate::messages::{AuthorizationStatus, BEACON_DETECTED, LocationEvent, PresenterCommand};
use crate::notifier::{DisplayState, ProximityNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingAuthorization,
    Ranging,
    /// Authorized, but the subsystem can't monitor or range. Idle until a
    /// later grant reports both as available.
    Unavailable,
}

/// Handles location subsystem callbacks for one beacon identity.
pub struct Session {
    identity: BeaconIdentity,
    notifier: ProximityNotifier,
    state: SessionState,
}

impl Session {
    pub fn new(identity: BeaconIdentity) -> Self {
        Session {
            identity,
            notifier: ProximityNotifier::new(),
            state: SessionState::AwaitingAuthorization,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn start(&self) -> Vec<PresenterCommand> {
        vec![
            PresenterCommand::UpdateDisplay {
                display: DisplayState::for_class(ProximityClass::Unknown),
            },
            PresenterCommand::RequestAlwaysAuthorization,
        ]
    }

    pub fn handle(&mut self, event: LocationEvent) -> Vec<PresenterCommand> {
        match event {
            LocationEvent::AuthorizationChanged {
                status,
                monitoring_available,
                ranging_available,
            } => self.on_authorization(status, monitoring_available, ranging_available),
            LocationEvent::Ranged { beacons } => self.on_ranged(&beacons),
        }
    }

    fn on_authorization(
        &mut self,
        status: AuthorizationStatus,
        monitoring_available: bool,
        ranging_available: bool,
    ) -> Vec<PresenterCommand> {
        debug!("Authorization changed to {:?}", status);

        if !status.permits_monitoring() || self.state == SessionState::Ranging {
            return vec![];
        }

        if !(monitoring_available && ranging_available) {
            warn!(
                "Beacon monitoring unavailable (monitoring: {}, ranging: {}), staying idle",
                monitoring_available, ranging_available
            );
            self.state = SessionState::Unavailable;
            return vec![];
        }

        info!("Starting monitoring and ranging for {}", self.identity);
        self.state = SessionState::Ranging;
        vec![
            PresenterCommand::StartMonitoring {
                identity: self.identity.clone(),
            },
            PresenterCommand::StartRanging {
                identity: self.identity.clone(),
            },
        ]
    }

    fn on_ranged(&mut self, beacons: &[RangedBeacon]) -> Vec<PresenterCommand> {
        if self.state != SessionState::Ranging {
            debug!("Dropping ranging result received before ranging started");
            return vec![];
        }

        let class = beacons
            .iter()
            .find(|beacon| self.identity.matches(beacon))
            .map(|beacon| beacon.proximity)
            .unwrap_or_default();

        let classification = self.notifier.on_classification(class);
        debug!("Beacon proximity: {:?}", class);

        let mut commands = vec![PresenterCommand::UpdateDisplay {
            display: classification.display,
        }];
        if classification.fire_alert {
            commands.push(PresenterCommand::PresentAlert {
                alert: BEACON_DETECTED,
            });
        }
        commands
    }
}

pub struct Manager {
    session: Session,
    events: mpsc::Receiver<LocationEvent>,
    commands: mpsc::Sender<PresenterCommand>,
}

impl Manager {
    pub fn new(
        identity: BeaconIdentity,
        events: mpsc::Receiver<LocationEvent>,
        commands: mpsc::Sender<PresenterCommand>,
    ) -> Self {
        Manager {
            session: Session::new(identity),
            events,
            commands,
        }
    }

    /// Runs until the event channel closes or the presenter goes away.
    pub async fn run_loop(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for command in self.session.start() {
            self.commands.send(command).await?;
        }

        while let Some(event) = self.events.recv().await {
            for command in self.session.handle(event) {
                debug!("Presenter command: {:?}", command);
                self.commands.send(command).await?;
            }
        }

        debug!(
            "Location event stream closed in state {:?} (alerted: {})",
            self.session.state(),
            self.session.notifier.alerted()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Color;

    const REFERENCE_UUID: uuid::Uuid = uuid::uuid!("5A4BCFCE-174E-4BAC-A814-092E77F6B7E5");

    fn identity() -> BeaconIdentity {
        BeaconIdentity::new(REFERENCE_UUID, Some(123), Some(456)).unwrap()
    }

    fn authorized(status: AuthorizationStatus) -> LocationEvent {
        LocationEvent::AuthorizationChanged {
            status,
            monitoring_available: true,
            ranging_available: true,
        }
    }

    fn ranged(proximities: &[ProximityClass]) -> LocationEvent {
        LocationEvent::Ranged {
            beacons: proximities
                .iter()
                .map(|proximity| RangedBeacon {
                    uuid: REFERENCE_UUID,
                    major: Some(123),
                    minor: Some(456),
                    proximity: *proximity,
                })
                .collect(),
        }
    }

    fn ranging_session() -> Session {
        let mut session = Session::new(identity());
        session.handle(authorized(AuthorizationStatus::AuthorizedAlways));
        session
    }

    fn display_of(commands: &[PresenterCommand]) -> Option<DisplayState> {
        commands.iter().find_map(|command| match command {
            PresenterCommand::UpdateDisplay { display } => Some(*display),
            _ => None,
        })
    }

    fn has_alert(commands: &[PresenterCommand]) -> bool {
        commands
            .iter()
            .any(|command| matches!(command, PresenterCommand::PresentAlert { .. }))
    }

    #[test]
    fn test_start_shows_unknown_and_requests_authorization() {
        let session = Session::new(identity());
        let commands = session.start();
        assert_eq!(
            display_of(&commands).map(|d| d.background),
            Some(Color::Gray)
        );
        assert!(commands.contains(&PresenterCommand::RequestAlwaysAuthorization));
    }

    #[test]
    fn test_always_authorization_starts_ranging() {
        let mut session = Session::new(identity());
        let commands = session.handle(authorized(AuthorizationStatus::AuthorizedAlways));
        assert_eq!(
            commands,
            vec![
                PresenterCommand::StartMonitoring {
                    identity: identity()
                },
                PresenterCommand::StartRanging {
                    identity: identity()
                },
            ]
        );
        assert_eq!(session.state(), SessionState::Ranging);

        // A second grant doesn't restart anything.
        assert!(
            session
                .handle(authorized(AuthorizationStatus::AuthorizedAlways))
                .is_empty()
        );
    }

    #[test]
    fn test_other_authorizations_do_not_start() {
        for status in [
            AuthorizationStatus::NotDetermined,
            AuthorizationStatus::Restricted,
            AuthorizationStatus::Denied,
            AuthorizationStatus::AuthorizedWhenInUse,
        ] {
            let mut session = Session::new(identity());
            assert!(session.handle(authorized(status)).is_empty(), "{status:?}");
            assert_eq!(session.state(), SessionState::AwaitingAuthorization);
            assert!(session.handle(ranged(&[ProximityClass::Near])).is_empty());
        }
    }

    #[test]
    fn test_unavailable_apis_idle_until_available() {
        for (monitoring_available, ranging_available) in [(false, true), (true, false)] {
            let mut session = Session::new(identity());
            let commands = session.handle(LocationEvent::AuthorizationChanged {
                status: AuthorizationStatus::AuthorizedAlways,
                monitoring_available,
                ranging_available,
            });
            assert!(commands.is_empty());
            assert_eq!(session.state(), SessionState::Unavailable);
            assert!(session.handle(ranged(&[ProximityClass::Far])).is_empty());

            let commands = session.handle(authorized(AuthorizationStatus::AuthorizedAlways));
            assert_eq!(commands.len(), 2);
            assert_eq!(session.state(), SessionState::Ranging);
            assert!(has_alert(&session.handle(ranged(&[ProximityClass::Far]))));
        }
    }

    #[test]
    fn test_revoked_authorization_keeps_ranging() {
        let mut session = ranging_session();
        assert!(
            session
                .handle(authorized(AuthorizationStatus::Denied))
                .is_empty()
        );
        assert_eq!(session.state(), SessionState::Ranging);
    }

    #[test]
    fn test_first_detection_alerts_once() {
        let mut session = ranging_session();

        let commands = session.handle(ranged(&[ProximityClass::Unknown]));
        assert_eq!(display_of(&commands).map(|d| d.label), Some("UNKNOWN"));
        assert!(!has_alert(&commands));

        let commands = session.handle(ranged(&[ProximityClass::Far]));
        assert_eq!(display_of(&commands).map(|d| d.label), Some("FAR"));
        assert!(has_alert(&commands));

        let commands = session.handle(ranged(&[ProximityClass::Immediate]));
        assert_eq!(display_of(&commands).map(|d| d.label), Some("RIGHT HERE"));
        assert!(!has_alert(&commands));
    }

    #[test]
    fn test_empty_ranging_result_is_unknown() {
        let mut session = ranging_session();
        let commands = session.handle(ranged(&[]));
        assert_eq!(
            commands,
            vec![PresenterCommand::UpdateDisplay {
                display: DisplayState::for_class(ProximityClass::Unknown)
            }]
        );
    }

    #[test]
    fn test_first_matching_beacon_wins() {
        let mut session = ranging_session();
        let stranger = RangedBeacon {
            uuid: REFERENCE_UUID,
            major: Some(999),
            minor: Some(1),
            proximity: ProximityClass::Immediate,
        };
        let LocationEvent::Ranged { beacons: mut ours } =
            ranged(&[ProximityClass::Near, ProximityClass::Far])
        else {
            unreachable!()
        };
        ours.insert(0, stranger.clone());

        let commands = session.handle(LocationEvent::Ranged { beacons: ours });
        assert_eq!(display_of(&commands).map(|d| d.label), Some("NEAR"));

        let commands = session.handle(LocationEvent::Ranged {
            beacons: vec![stranger],
        });
        assert_eq!(display_of(&commands).map(|d| d.label), Some("UNKNOWN"));
    }

    #[tokio::test]
    async fn test_run_loop() {
        let (event_tx, event_rx) = mpsc::channel(10);
        let (command_tx, mut command_rx) = mpsc::channel(10);

        let manager = Manager::new(identity(), event_rx, command_tx);
        let handle = tokio::spawn(manager.run_loop());

        for event in [
            ranged(&[ProximityClass::Far]),
            authorized(AuthorizationStatus::AuthorizedAlways),
            ranged(&[ProximityClass::Near]),
            ranged(&[ProximityClass::Immediate]),
        ] {
            event_tx.send(event).await.unwrap();
        }
        drop(event_tx);

        let mut commands = vec![];
        while let Some(command) = command_rx.recv().await {
            commands.push(command);
        }
        handle.await.unwrap().unwrap();

        let near = DisplayState::for_class(ProximityClass::Near);
        let immediate = DisplayState::for_class(ProximityClass::Immediate);
        assert_eq!(
            commands,
            vec![
                PresenterCommand::UpdateDisplay {
                    display: DisplayState::for_class(ProximityClass::Unknown)
                },
                PresenterCommand::RequestAlwaysAuthorization,
                PresenterCommand::StartMonitoring {
                    identity: identity()
                },
                PresenterCommand::StartRanging {
                    identity: identity()
                },
                PresenterCommand::UpdateDisplay { display: near },
                PresenterCommand::PresentAlert {
                    alert: BEACON_DETECTED
                },
                PresenterCommand::UpdateDisplay { display: immediate },
            ]
        );
    }
}
