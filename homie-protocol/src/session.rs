//! The abstract MQTT session port consumed by the device and controller engines.
//!
//! Neither engine talks to a broker directly. Instead the embedding application supplies an
//! implementation of [`MqttSession`] wrapping whatever MQTT client it prefers, and feeds incoming
//! broker events to the engine by calling the matching method of [`MqttEventHandler`]. This keeps
//! connection management, QoS plumbing, reconnect backoff and TLS configuration entirely outside
//! this crate, which only ever asks for retained QoS 1 publishes and plain subscribes.

use std::sync::Arc;
use thiserror::Error;

/// An MQTT quality-of-service level. The engine only ever requests `1`.
pub type Qos = u8;

/// An error returned by the MQTT session port.
///
/// The engine never retries a failed publish or subscribe; it propagates this error to whichever
/// public method triggered the call, per the transport's own retry policy.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("MQTT session error: {0}")]
pub struct SessionError(pub String);

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        SessionError(message.into())
    }
}

/// The operations the engine performs against an MQTT session.
///
/// `open`/`open_with_will` request a connection; everything else assumes one is already, or will
/// shortly be, established. A session implementation is free to queue requests made before the
/// underlying transport connects and flush them once `on_connect` fires.
///
/// A session must never deliver a callback synchronously from inside one of these methods (e.g.
/// calling the registered handler's `on_connect` from within `open`/`open_with_will`, or
/// `on_message` from within `publish`). The engine serializes its own mutating entry points
/// behind a single mutex and may still be holding it for the very call the session is in the
/// middle of servicing; a reentrant callback on the same thread would deadlock against that
/// mutex. Deliver callbacks from a separate poll, task or thread, as a real broker connection
/// would.
pub trait MqttSession: Send {
    /// Installs the handler which will receive this session's callbacks. Passing `None` clears
    /// any previously installed handler.
    ///
    /// The handler is an `Arc<dyn MqttEventHandler>` rather than a `Box`: the engine that
    /// implements it needs a second handle to itself to call back out through this same session,
    /// and `Arc<Mutex<Engine>>` cannot be unsize-coerced through the `Mutex`. Implementors
    /// therefore take `&self` in every callback and arrange their own interior mutability (a
    /// single internal mutex, per the engine's serialization discipline).
    fn set_event_handler(&mut self, handler: Option<Arc<dyn MqttEventHandler>>);

    /// Connects with a Last-Will-and-Testament: the broker will publish `will_payload` to
    /// `will_topic`, retained, at `will_qos`, if the connection is lost uncleanly.
    fn open_with_will(
        &mut self,
        will_topic: &str,
        will_payload: &str,
        will_qos: Qos,
        will_retain: bool,
    ) -> Result<(), SessionError>;

    /// Connects without a will. Used by the controller role, which has nothing to announce on an
    /// unclean disconnect.
    fn open(&mut self) -> Result<(), SessionError>;

    fn publish(&mut self, topic: &str, payload: &str, qos: Qos, retain: bool) -> Result<(), SessionError>;

    fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), SessionError>;

    fn unsubscribe(&mut self, topic: &str) -> Result<(), SessionError>;

    fn is_connected(&self) -> bool;
}

/// Callbacks delivered by an [`MqttSession`] implementation.
///
/// These correspond 1:1 to the lifecycle events a real MQTT client exposes. The embedding
/// application is responsible for calling the matching method whenever its client raises the
/// equivalent event; the engine does no polling or waiting of its own.
pub trait MqttEventHandler: Send + Sync {
    /// The session has (re)connected. `session_present` reports whether the broker kept session
    /// state from a previous connection; `is_reconnect` distinguishes the first connection of this
    /// process from a reconnect after a drop. The engine treats both the same way: it
    /// (re)publishes or (re)subscribes its entire state, since retained messages and
    /// subscriptions do not reliably survive every kind of broker-side session loss.
    fn on_connect(&self, session_present: bool, is_reconnect: bool);

    /// A message arrived on a topic the engine is subscribed to.
    fn on_message(&self, topic: &str, payload: &str);

    /// The session is entering an orderly shutdown. This is the engine's last chance to publish
    /// anything before the connection goes away.
    fn on_closing(&self);

    /// The session has finished shutting down. Informational only.
    fn on_closed(&self) {}

    /// The session has gone offline unexpectedly (e.g. the transport detected a drop before
    /// `on_closing` could run). Informational only.
    fn on_offline(&self) {}
}
