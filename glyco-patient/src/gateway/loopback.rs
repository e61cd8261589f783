use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{
    Faults, GatewayError, Handler, HandlerRegistry, Message, MessagingGateway, Outbound, QoS,
    registry::{dispatch_to, topic_matches},
};

/// An in-process gateway.
///
/// Every publish is recorded. Messages pushed in with
/// [`inject`](Self::inject) are delivered, on the caller's task, to the
/// handlers whose filters are both registered and subscribed; replies are
/// recorded like any other publish and handler failures are reported
/// through [`failed`](MessagingGateway::failed).
#[derive(Debug)]
pub struct LoopbackGateway {
    inner: Mutex<Inner>,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Inner {
    connected: bool,
    connects: usize,
    disconnects: usize,
    subscriptions: Vec<(String, QoS)>,
    registry: HandlerRegistry,
    published: Vec<Outbound>,
}

impl Default for LoopbackGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            faults: Faults::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers an inbound message as if it arrived from a broker.
    ///
    /// Returns how many handlers received it. Nothing is delivered while
    /// disconnected or when no subscription matches.
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>) -> usize {
        let message = Message {
            topic: topic.to_owned(),
            payload: payload.into(),
        };

        let handlers = {
            let inner = self.lock();
            let subscribed = inner
                .subscriptions
                .iter()
                .any(|(filter, _)| topic_matches(filter, topic));
            if !inner.connected || !subscribed {
                return 0;
            }
            inner.registry.handlers_for(topic)
        };

        match dispatch_to(&handlers, &message) {
            Ok(replies) => self.lock().published.extend(replies),
            Err(error) => self.faults.report(error),
        }
        handlers.len()
    }

    /// Reports a failure as if the transport had broken.
    pub fn fail(&self, error: GatewayError) {
        self.faults.report(error);
    }

    /// Every message published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<Outbound> {
        self.lock().published.clone()
    }

    /// Messages published to exactly `topic`, in order.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<Outbound> {
        self.lock()
            .published
            .iter()
            .filter(|outbound| outbound.topic == topic)
            .cloned()
            .collect()
    }

    /// Every subscription made so far, including those from earlier
    /// connections.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.lock().subscriptions.clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }
}

#[async_trait]
impl MessagingGateway for LoopbackGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        inner.connected = true;
        inner.connects += 1;
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(GatewayError::NotConnected);
        }
        inner.subscriptions.push((filter.to_owned(), qos));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(GatewayError::NotConnected);
        }
        inner.published.push(Outbound {
            topic: topic.to_owned(),
            payload,
            qos,
        });
        Ok(())
    }

    fn on_message(&self, filter: &str, handler: Handler) {
        self.lock().registry.register(filter, handler);
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        inner.connected = false;
        inner.disconnects += 1;
        Ok(())
    }

    async fn failed(&self) -> GatewayError {
        self.faults.next().await
    }
}
