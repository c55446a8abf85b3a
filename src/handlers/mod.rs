//! Command and lifecycle handlers.
//!
//! Each module exposes `register(&mut Buses)`; the bootstrap calls them all
//! here, once, before the context is built. Extension modules (from
//! `config.extensions`) register only when named.

pub mod cap;
pub mod channel;
pub mod connection;
pub mod messaging;
pub mod metadata;
pub mod mode;
pub mod monitor;
pub mod motd;
pub mod oper;
pub mod sasl;

use std::sync::Arc;

use crate::events::Buses;
use crate::state::ServerContext;

/// Register every handler module on the buses.
pub fn register_all(buses: &mut Buses, extensions: &[String]) {
    connection::register(buses);
    cap::register(buses);
    mode::register(buses);
    motd::register(buses);
    messaging::register(buses);
    channel::register(buses);
    oper::register(buses);
    monitor::register(buses);
    metadata::register(buses);

    for extension in extensions {
        match extension.as_str() {
            "sasl" => sasl::register(buses),
            other => {
                tracing::info!(module = %other, "rejecting unknown extension module");
            }
        }
    }
}

/// Seed the context's capability registry. Runs after the context exists
/// and before `server start` is dispatched.
pub fn install_capabilities(ctx: &Arc<ServerContext>) {
    ctx.add_capability("account-tag", None);
    if ctx.config.extensions.iter().any(|e| e == "sasl") {
        sasl::install_capability(ctx);
    }
}
