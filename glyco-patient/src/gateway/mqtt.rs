use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{Faults, GatewayError, Handler, HandlerRegistry, Message, MessagingGateway, QoS};

/// Capacity of the request channel between the client and its event loop.
const REQUEST_CAPACITY: usize = 64;

/// How long `disconnect` waits for the event loop to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Broker connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Username and password.
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
}

/// A gateway to an MQTT broker.
///
/// The event loop runs on its own tokio task once connected. That task is
/// the delivery context: it dispatches inbound publishes to handlers, sends
/// their replies, and reports transport and handler failures.
pub struct MqttGateway {
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    task: Mutex<Option<JoinHandle<()>>>,
    registry: Arc<RwLock<HandlerRegistry>>,
    faults: Arc<Faults>,
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::AtMostOnce,
            QoS::AtLeastOnce => Self::AtLeastOnce,
            QoS::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

impl MqttSettings {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            credentials: None,
            keep_alive: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username, password);
        }
        options
    }
}

impl MqttGateway {
    /// Creates a gateway. Nothing touches the network until
    /// [`connect`](MessagingGateway::connect).
    #[must_use]
    pub fn new(settings: &MqttSettings) -> Self {
        let (client, event_loop) = AsyncClient::new(settings.options(), REQUEST_CAPACITY);
        Self {
            client,
            event_loop: Mutex::new(Some(event_loop)),
            task: Mutex::new(None),
            registry: Arc::new(RwLock::new(HandlerRegistry::new())),
            faults: Arc::new(Faults::new()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl MessagingGateway for MqttGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        let Some(event_loop) = lock(&self.event_loop).take() else {
            return Err(GatewayError::Closed);
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let delivery = Delivery {
            client: self.client.clone(),
            registry: Arc::clone(&self.registry),
            faults: Arc::clone(&self.faults),
        };
        *lock(&self.task) = Some(tokio::spawn(delivery.run(event_loop, ready_tx)));

        ready_rx.await.unwrap_or(Err(GatewayError::Closed))
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), GatewayError> {
        self.client
            .subscribe(filter, qos.into())
            .await
            .map_err(|error| GatewayError::transport(format!("subscribe {filter}"), error))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), GatewayError> {
        self.client
            .publish(topic, qos.into(), false, payload)
            .await
            .map_err(|error| GatewayError::transport(format!("publish {topic}"), error))
    }

    fn on_message(&self, filter: &str, handler: Handler) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(filter, handler);
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        let Some(mut task) = lock(&self.task).take() else {
            return Ok(());
        };

        info!("[Mqtt] Disconnecting from the broker");
        let requested = self.client.disconnect().await;

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("[Mqtt] Event loop did not stop in time, aborting it");
            task.abort();
        }

        requested.map_err(|error| GatewayError::transport("disconnect", error))
    }

    async fn failed(&self) -> GatewayError {
        self.faults.next().await
    }
}

/// State moved onto the event-loop task.
struct Delivery {
    client: AsyncClient,
    registry: Arc<RwLock<HandlerRegistry>>,
    faults: Arc<Faults>,
}

impl Delivery {
    async fn run(
        self,
        mut event_loop: EventLoop,
        ready: oneshot::Sender<Result<(), GatewayError>>,
    ) {
        let mut ready = Some(ready);

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    let result = if ack.code == ConnectReturnCode::Success {
                        info!("[Mqtt] Connected");
                        Ok(())
                    } else {
                        Err(GatewayError::Transport {
                            context: format!("broker refused connection: {:?}", ack.code),
                            source: "connection refused".into(),
                        })
                    };
                    match ready.take() {
                        Some(ready) => {
                            let _ = ready.send(result);
                        }
                        None => {
                            if let Err(error) = result {
                                self.faults.report(error);
                            }
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = Message {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    };
                    debug!("[Mqtt] Received {} bytes on {}", message.payload.len(), message.topic);
                    self.deliver(&message);
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    debug!("[Mqtt] Event loop stopping");
                    break;
                }
                Ok(_) => {}
                Err(source) => {
                    error!("[Mqtt] Connection error: {source}");
                    let error = GatewayError::transport("event loop", source);
                    match ready.take() {
                        Some(ready) => {
                            let _ = ready.send(Err(error));
                        }
                        None => self.faults.report(error),
                    }
                    break;
                }
            }
        }
    }

    fn deliver(&self, message: &Message) {
        let dispatched = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatch(message);

        match dispatched {
            Ok(replies) => {
                for reply in replies {
                    if let Err(error) = self.client.try_publish(
                        reply.topic.as_str(),
                        reply.qos.into(),
                        false,
                        reply.payload,
                    ) {
                        self.faults.report(GatewayError::transport(
                            format!("reply on {}", reply.topic),
                            error,
                        ));
                    }
                }
            }
            Err(error) => {
                error!("[Mqtt] {error}");
                self.faults.report(error);
            }
        }
    }
}
