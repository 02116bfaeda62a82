//! Per-message state carried through the middleware chain.

use std::collections::HashMap;

use chatbridge_core::{BridgeError, Envelope};
use serde_json::Value;

/// Mutable state for one pass through the middleware chain.
///
/// Created fresh for every message and dropped when the chain unwinds.
/// Cancellation is one-way: once [`cancel`](Self::cancel) has been called the
/// context stays cancelled.
#[derive(Debug)]
pub struct DispatchContext {
    message: Envelope,
    metadata: HashMap<String, Value>,
    cancelled: bool,
    error: Option<BridgeError>,
}

impl DispatchContext {
    pub fn new(message: Envelope) -> Self {
        Self {
            message,
            metadata: HashMap::new(),
            cancelled: false,
            error: None,
        }
    }

    /// The message being dispatched.
    pub fn message(&self) -> &Envelope {
        &self.message
    }

    /// Rewrites the message content seen by later middleware and the terminal.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.message.content = content.into();
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Stores a metadata value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.metadata.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    /// Marks the message as deliberately cancelled.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The error reported by the terminal, once it has run.
    pub fn error(&self) -> Option<&BridgeError> {
        self.error.as_ref()
    }

    pub(crate) fn set_error(&mut self, error: BridgeError) {
        self.error = Some(error);
    }

    pub(crate) fn take_error(&mut self) -> Option<BridgeError> {
        self.error.take()
    }

    pub(crate) fn into_message(self) -> Envelope {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbridge_core::testing::RecordingOutbound;
    use chatbridge_core::{DeliveryChannel, RawMessage};
    use std::sync::Arc;

    fn context(text: &str) -> DispatchContext {
        let delivery = DeliveryChannel::new(1, Arc::new(RecordingOutbound::default()));
        DispatchContext::new(Envelope::from_raw(RawMessage::new(2, 1, text), "!", delivery))
    }

    #[test]
    fn test_metadata_roundtrip() {
        let mut ctx = context("!hello");
        assert!(ctx.insert("start", 12).is_none());
        assert_eq!(ctx.get("start"), Some(&Value::from(12)));
        assert_eq!(ctx.insert("start", "later"), Some(Value::from(12)));
        assert_eq!(ctx.remove("start"), Some(Value::from("later")));
        assert!(ctx.metadata().is_empty());
    }

    #[test]
    fn test_cancel_is_sticky() {
        let mut ctx = context("!hello");
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_terminal_error_is_recorded() {
        let mut ctx = context("!kick");
        assert!(ctx.error().is_none());
        ctx.set_error(BridgeError::handler("missing argument: user"));
        assert!(matches!(ctx.error(), Some(BridgeError::Handler(_))));
        assert!(ctx.take_error().is_some());
        assert!(ctx.error().is_none());
    }

    #[test]
    fn test_set_content() {
        let mut ctx = context("!HELLO");
        ctx.set_content("hello");
        assert_eq!(ctx.message().content, "hello");
        assert_eq!(ctx.into_message().content, "hello");
    }
}
