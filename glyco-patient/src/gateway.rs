//! Pub/sub transport behind a small async contract.
//!
//! The controller only ever talks to a [`MessagingGateway`]. Inbound messages
//! are routed to [`Handler`]s through a [`HandlerRegistry`]; a handler may
//! answer with one [`Outbound`] message, which the gateway publishes. Failures
//! in the delivery context (a broken connection or a failing handler) surface
//! through [`MessagingGateway::failed`].

mod loopback;
#[cfg(feature = "mqtt")]
mod mqtt;
mod registry;

use std::{error::Error as StdError, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

pub use loopback::LoopbackGateway;
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttGateway, MqttSettings};
pub use registry::{HandlerRegistry, topic_matches};

/// Error a handler may return; boxed so handlers can fail in their own terms.
pub type HandlerError = Box<dyn StdError + Send + Sync + 'static>;

/// Callback for inbound messages.
pub type Handler = Arc<dyn Fn(&Message) -> Result<Option<Outbound>, HandlerError> + Send + Sync>;

/// Delivery guarantee for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

/// An inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A message to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway is not connected")]
    NotConnected,
    #[error("transport failure: {context}")]
    Transport {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
    #[error("handler for `{topic}` failed")]
    Handler {
        topic: String,
        #[source]
        source: HandlerError,
    },
    #[error("gateway closed")]
    Closed,
}

/// Connect/subscribe/publish capabilities of a pub/sub transport.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Opens the connection, returning once the broker has accepted it.
    async fn connect(&self) -> Result<(), GatewayError>;

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), GatewayError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), GatewayError>;

    /// Routes inbound messages matching `filter` to `handler`.
    ///
    /// Handlers should be installed before [`connect`](Self::connect) so no
    /// early message is missed.
    fn on_message(&self, filter: &str, handler: Handler);

    /// Closes the connection. Safe to call when not connected.
    async fn disconnect(&self) -> Result<(), GatewayError>;

    /// Resolves with the next failure in the delivery context.
    ///
    /// Pending forever while nothing goes wrong, and safe to drop and call
    /// again at any point.
    async fn failed(&self) -> GatewayError;
}

impl GatewayError {
    pub fn transport<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Transport {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Failures reported by a delivery context, awaited by [`MessagingGateway::failed`].
#[derive(Debug)]
struct Faults {
    tx: mpsc::UnboundedSender<GatewayError>,
    rx: Mutex<mpsc::UnboundedReceiver<GatewayError>>,
}

impl Faults {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn report(&self, error: GatewayError) {
        // The receiver lives as long as `self`, so this cannot fail.
        let _ = self.tx.send(error);
    }

    async fn next(&self) -> GatewayError {
        self.rx.lock().await.recv().await.unwrap_or(GatewayError::Closed)
    }
}
