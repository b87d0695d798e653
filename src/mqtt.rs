use std::time::Duration;

use log::{debug, error, warn};
use rumqttc::{MqttOptions, QoS, SubscribeFilter};
use serde_derive::Deserialize;
use tokio::sync::mpsc;

use crate::beacon::RangedBeacon;
use crate::config;
use crate::messages::{AuthorizationStatus, LocationEvent, PresenterCommand};

const DEFAULT_PUBLISHER_ID: &str = "beacon-proximity";
const DEFAULT_TOPIC_PATH: &str = "beacon";

#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    publisher_id: String,
    topic_path: String,
}

#[derive(Debug, Deserialize)]
struct AuthorizationPayload {
    status: AuthorizationStatus,
    monitoring_available: Option<bool>,
    ranging_available: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RangingPayload {
    #[serde(default)]
    beacons: Vec<RangedBeacon>,
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("unexpected topic {0}")]
    UnknownTopic(String),
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes a message published by the location subsystem.
fn decode_event(
    topic_path: &str,
    topic: &str,
    payload: &[u8],
) -> Result<LocationEvent, PayloadError> {
    let suffix = topic
        .strip_prefix(topic_path)
        .and_then(|rest| rest.strip_prefix('/'));

    match suffix {
        Some("authorization") => {
            let p: AuthorizationPayload = serde_json::from_slice(payload)?;
            Ok(LocationEvent::AuthorizationChanged {
                status: p.status,
                monitoring_available: p.monitoring_available.unwrap_or(true),
                ranging_available: p.ranging_available.unwrap_or(true),
            })
        }
        Some("ranging") => {
            let p: RangingPayload = serde_json::from_slice(payload)?;
            Ok(LocationEvent::Ranged { beacons: p.beacons })
        }
        _ => Err(PayloadError::UnknownTopic(topic.to_string())),
    }
}

impl MqttClient {
    pub fn new(config: &config::MqttConfig) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .clone()
            .unwrap_or_else(|| DEFAULT_PUBLISHER_ID.to_string());
        let topic_path = config
            .topic_path
            .clone()
            .unwrap_or_else(|| DEFAULT_TOPIC_PATH.to_string());

        let mut mqttoptions = MqttOptions::new(
            publisher_id.clone(),
            config.host.clone(),
            config.port.unwrap_or(1883),
        );

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        (
            MqttClient {
                client,
                publisher_id,
                topic_path,
            },
            eventloop,
        )
    }

    pub async fn subscribe(&self) -> Result<(), rumqttc::ClientError> {
        self.client
            .subscribe_many(vec![
                SubscribeFilter::new(
                    format!("{}/authorization", self.topic_path),
                    QoS::AtLeastOnce,
                ),
                SubscribeFilter::new(format!("{}/ranging", self.topic_path), QoS::AtMostOnce),
            ])
            .await
    }

    /// Polls the broker connection, forwarding location events until the
    /// session stops listening.
    pub async fn event_loop(
        &self,
        eventloop: &mut rumqttc::EventLoop,
        tx: mpsc::Sender<LocationEvent>,
    ) {
        loop {
            match eventloop.poll().await {
                Ok(notification) => match notification {
                    rumqttc::Event::Incoming(rumqttc::Packet::Publish(p)) => {
                        debug!("Received MQTT message on topic {}: {:?}", p.topic, p.payload);

                        match decode_event(&self.topic_path, &p.topic, &p.payload) {
                            Ok(event) => {
                                if tx.send(event).await.is_err() {
                                    debug!("Session closed, leaving MQTT event loop");
                                    return;
                                }
                            }
                            Err(err) => warn!("Ignoring MQTT message on {}: {}", p.topic, err),
                        }
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::SubAck(_)) => {
                        debug!("Subscription acknowledged");
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
                        debug!("Connection acknowledged");
                        if let Err(err) = self.subscribe().await {
                            error!("Error subscribing to MQTT topics: {:?}", err);
                        }
                    }
                    _ => {}
                },
                Err(e) => {
                    error!("Error polling MQTT event loop: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    fn command_topic(&self, command: &PresenterCommand) -> String {
        let channel = match command {
            PresenterCommand::UpdateDisplay { .. } => "display",
            PresenterCommand::PresentAlert { .. } => "alert",
            PresenterCommand::RequestAlwaysAuthorization
            | PresenterCommand::StartMonitoring { .. }
            | PresenterCommand::StartRanging { .. } => "command",
        };
        format!("{}/{}/{}", self.topic_path, self.publisher_id, channel)
    }

    pub async fn publish_command(
        &self,
        command: &PresenterCommand,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // The display is state, so late subscribers should see the latest one.
        let retain = matches!(command, PresenterCommand::UpdateDisplay { .. });
        let payload = serde_json::to_string(command)?;
        self.client
            .publish(self.command_topic(command), QoS::AtLeastOnce, retain, payload)
            .await?;
        Ok(())
    }

    /// Publishes commands until the session drops its sender.
    pub async fn presenter_loop(&self, mut rx: mpsc::Receiver<PresenterCommand>) {
        while let Some(command) = rx.recv().await {
            if let Err(err) = self.publish_command(&command).await {
                error!("Error publishing {:?}: {}", command, err);
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await
    }
}
