//! MQTT messenger backed by `rumqttc`.

use std::thread;
use std::time::Duration;

use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::error::RuntimeError;
use crate::queue::CommandSender;

use super::Messenger;

const REQUEST_CAPACITY: usize = 32;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Broker connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: SmolStr,
    pub port: u16,
    pub client_id: SmolStr,
    /// Topic root, e.g. `hearth/kitchen`.
    pub prefix: SmolStr,
    pub keep_alive: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: SmolStr::new("127.0.0.1"),
            port: 1883,
            client_id: SmolStr::new("hearth"),
            prefix: SmolStr::new("hearth"),
            keep_alive: Duration::from_secs(30),
        }
    }
}

impl MqttSettings {
    #[must_use]
    pub fn status_topic(&self, key: &str) -> String {
        format!("{}/{key}/status", self.prefix)
    }

    #[must_use]
    pub fn order_topic(&self, topic: &str) -> String {
        format!("{}/{topic}/order", self.prefix)
    }

    /// Topic whose payload lines are fed to the command queue.
    #[must_use]
    pub fn control_topic(&self) -> String {
        format!("{}/control", self.prefix)
    }
}

/// Publishes over MQTT and feeds the control topic into the command queue.
///
/// The connection is driven on its own thread; incoming control payloads
/// reach the dispatcher only through the queue.
pub struct MqttMessenger {
    client: Client,
    settings: MqttSettings,
    #[allow(dead_code)]
    driver: thread::JoinHandle<()>,
}

impl std::fmt::Debug for MqttMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttMessenger")
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .field("prefix", &self.settings.prefix)
            .finish()
    }
}

impl MqttMessenger {
    pub fn connect(settings: MqttSettings, commands: CommandSender) -> Result<Self, RuntimeError> {
        if settings.host.trim().is_empty() {
            return Err(RuntimeError::InvalidConfig("mqtt.host is empty".into()));
        }
        let mut options = MqttOptions::new(
            settings.client_id.to_string(),
            settings.host.to_string(),
            settings.port,
        );
        options.set_keep_alive(settings.keep_alive);
        let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);

        let control = settings.control_topic();
        let subscriber = client.clone();
        let driver = thread::Builder::new()
            .name("hearth-mqtt".into())
            .spawn(move || {
                for notification in connection.iter() {
                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!(topic = control.as_str(), "mqtt connected");
                            if let Err(err) = subscriber.try_subscribe(control.clone(), QoS::AtMostOnce)
                            {
                                warn!(%err, "mqtt subscribe failed");
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            if publish.topic != control {
                                continue;
                            }
                            let payload = String::from_utf8_lossy(&publish.payload);
                            let queued = commands.add_commands(&payload);
                            debug!(lines = queued, "mqtt control payload queued");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(%err, "mqtt connection error");
                            thread::sleep(RECONNECT_DELAY);
                        }
                    }
                }
                debug!("mqtt driver stopped");
            })
            .map_err(|err| RuntimeError::Messaging(format!("spawn mqtt thread: {err}").into()))?;

        Ok(Self {
            client,
            settings,
            driver,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &MqttSettings {
        &self.settings
    }

    /// Requests a clean disconnect; the driver thread exits afterwards.
    pub fn shutdown(&self) {
        if let Err(err) = self.client.try_disconnect() {
            debug!(%err, "mqtt disconnect");
        }
    }

    fn publish(&self, topic: String, payload: &str) -> Result<(), RuntimeError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|err| RuntimeError::Messaging(format!("{err}").into()))
    }
}

impl Messenger for MqttMessenger {
    fn publish_status(&self, key: &str, value: &str) -> Result<(), RuntimeError> {
        self.publish(self.settings.status_topic(key), value)
    }

    fn publish_order(&self, topic: &str, payload: &str) -> Result<(), RuntimeError> {
        self.publish(self.settings.order_topic(topic), payload)
    }
}

impl Drop for MqttMessenger {
    fn drop(&mut self) {
        self.shutdown();
    }
}
