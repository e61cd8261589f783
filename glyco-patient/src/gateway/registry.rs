use std::fmt;

use super::{GatewayError, Handler, Message, Outbound};

/// Returns whether an MQTT topic filter matches a concrete topic.
///
/// `+` matches exactly one level and `#`, which must be last, matches the
/// rest of the topic including its parent level. A filter starting with a
/// wildcard never matches a `$` topic.
///
/// The loopback gateway routes through this too, so it cannot depend on the
/// optional MQTT client. It agrees with `rumqttc::matches` on valid filters
/// and ordinary topics.
///
/// ```
/// use glyco_patient::gateway::topic_matches;
///
/// assert!(topic_matches("vp/request/+", "vp/request/42"));
/// assert!(!topic_matches("vp/request/+", "vp/request/42/extra"));
/// assert!(topic_matches("vp/#", "vp/request/42"));
/// assert!(topic_matches("vp/#", "vp"));
/// ```
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Handlers keyed by topic filter.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    routes: Vec<(String, Handler)>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler; several handlers may share a filter.
    pub fn register(&mut self, filter: impl Into<String>, handler: Handler) {
        self.routes.push((filter.into(), handler));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Handlers whose filter matches `topic`, in registration order.
    #[must_use]
    pub fn handlers_for(&self, topic: &str) -> Vec<Handler> {
        self.routes
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, handler)| Handler::clone(handler))
            .collect()
    }

    /// Runs every matching handler and collects their replies.
    ///
    /// # Errors
    ///
    /// Stops at the first failing handler and returns
    /// [`GatewayError::Handler`].
    pub fn dispatch(&self, message: &Message) -> Result<Vec<Outbound>, GatewayError> {
        dispatch_to(&self.handlers_for(&message.topic), message)
    }
}

/// Calls `handlers` in order on `message`.
pub(super) fn dispatch_to(
    handlers: &[Handler],
    message: &Message,
) -> Result<Vec<Outbound>, GatewayError> {
    let mut replies = Vec::new();
    for handler in handlers {
        match handler(message) {
            Ok(Some(reply)) => replies.push(reply),
            Ok(None) => {}
            Err(source) => {
                return Err(GatewayError::Handler {
                    topic: message.topic.clone(),
                    source,
                });
            }
        }
    }
    Ok(replies)
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|(filter, _)| filter))
            .finish()
    }
}
