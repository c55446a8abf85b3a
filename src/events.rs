//! Event dispatch fabric.
//!
//! Two registries drive the whole server:
//!
//! - the **protocol bus**, keyed by uppercased verb/numeric, fed by parsed
//!   client messages drained from each session's recvq;
//! - the **core bus**, keyed by free-form lifecycle topics such as
//!   `client registered` or `sasl authenticate plain`.
//!
//! Handlers are registered once at bootstrap (`handlers::register_all`) and
//! the buses are immutable afterwards, so dispatch may re-enter freely:
//! a handler can synthesize a message and push it back through the protocol
//! bus as a side effect.

use std::collections::HashMap;
use std::sync::Arc;

use coracle_proto::Message;
use tracing::{debug, error};

use crate::error::HandlerResult;
use crate::state::{ServerContext, Session};

/// A protocol-bus handler for one verb.
pub type ProtocolHandlerFn = fn(&Arc<ServerContext>, &Arc<Session>, &Message) -> HandlerResult;

/// A core-bus handler for one topic.
pub type CoreHandlerFn = fn(&Arc<ServerContext>, &mut CoreEvent) -> HandlerResult;

/// Registration record for a protocol-bus handler.
pub struct ProtocolHandler {
    /// Minimum number of parameters; fewer draws a 461 and stops dispatch.
    pub min_params: usize,
    /// Whether the handler may run before registration completes.
    pub allow_unregistered: bool,
    pub func: ProtocolHandlerFn,
}

/// Payload carried by core-bus topics.
///
/// Topics are strings; the variant names what the topic's handlers receive.
pub enum CoreEvent {
    ServerStart,
    /// `client reglocked`, `client registered`, `client connect`.
    Client { client: Arc<Session> },
    /// `client quit`.
    ClientQuit {
        client: Arc<Session>,
        message: String,
    },
    /// `client killed`; dispatched before the KILL line is written.
    ClientKilled {
        source: Arc<Session>,
        client: Arc<Session>,
        reason: String,
    },
    /// `account change`.
    AccountChange {
        source: Arc<Session>,
        account: String,
    },
    /// `sasl authenticate <mechanism>`; `data` is the decoded payload.
    SaslAuthenticate {
        source: Arc<Session>,
        mechanism: String,
        data: Vec<u8>,
    },
    /// `outbound message postprocess`; handlers may mutate the message
    /// before it is serialized for `client`.
    OutboundPostprocess {
        client: Arc<Session>,
        message: Message,
    },
}

/// The protocol bus: uppercased verb → handlers in registration order.
#[derive(Default)]
pub struct ProtocolBus {
    handlers: HashMap<String, Vec<ProtocolHandler>>,
}

impl ProtocolBus {
    /// Register a handler for a verb or numeric.
    pub fn register(
        &mut self,
        verb: &str,
        min_params: usize,
        allow_unregistered: bool,
        func: ProtocolHandlerFn,
    ) {
        self.handlers
            .entry(verb.to_ascii_uppercase())
            .or_default()
            .push(ProtocolHandler {
                min_params,
                allow_unregistered,
                func,
            });
    }

    /// Dispatch a parsed message on behalf of `session`.
    ///
    /// Handlers that refuse pre-registration traffic are skipped silently;
    /// a parameter-count violation draws numeric 461 and stops the message;
    /// handler errors are logged and never escalate.
    pub fn dispatch(&self, ctx: &Arc<ServerContext>, session: &Arc<Session>, msg: &Message) {
        let event = msg.event_name();

        let Some(handlers) = self.handlers.get(&event) else {
            debug!(verb = %event, nick = %session.nickname(), "unknown command");
            if session.is_registered() {
                session.dump_numeric(ctx, "421", vec![event, "Unknown command".to_string()]);
            }
            return;
        };

        for handler in handlers {
            if !session.is_registered() && !handler.allow_unregistered {
                continue;
            }
            if msg.params.len() < handler.min_params {
                session.dump_numeric(
                    ctx,
                    "461",
                    vec![event, "Not enough parameters".to_string()],
                );
                return;
            }
            if let Err(e) = (handler.func)(ctx, session, msg) {
                error!(verb = %event, nick = %session.nickname(), error = %e, "handler failed");
            }
        }
    }
}

/// The core bus: topic string → handlers in registration order.
#[derive(Default)]
pub struct CoreBus {
    handlers: HashMap<String, Vec<CoreHandlerFn>>,
}

impl CoreBus {
    /// Register a handler for a lifecycle topic.
    pub fn register(&mut self, topic: &str, func: CoreHandlerFn) {
        self.handlers.entry(topic.to_string()).or_default().push(func);
    }

    /// Dispatch `event` to every handler registered for `topic`.
    ///
    /// Handlers may mutate the event (used by `outbound message
    /// postprocess`); errors are logged and swallowed.
    pub fn dispatch(&self, ctx: &Arc<ServerContext>, topic: &str, event: &mut CoreEvent) {
        let Some(handlers) = self.handlers.get(topic) else {
            return;
        };
        for func in handlers {
            if let Err(e) = func(ctx, event) {
                error!(topic = %topic, error = %e, "core handler failed");
            }
        }
    }
}

/// Both buses, built once at bootstrap.
#[derive(Default)]
pub struct Buses {
    pub rfc1459: ProtocolBus,
    pub core: CoreBus,
}
