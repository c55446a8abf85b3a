//! Server-wide shared state.
//!
//! One [`ServerContext`] is built at startup and handed (by `Arc`) to every
//! component. Handlers receive it explicitly on dispatch; nothing reaches
//! for ambient globals. The configuration and role table are read-only
//! after start; registries are mutated only by `register`/`exit` and the
//! channel handlers.

pub mod casemap;
pub mod channel;
pub mod history;
pub mod session;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use coracle_proto::irc_to_lower;

use crate::config::Config;
use crate::events::Buses;
use crate::security::password::HashHandler;
use crate::store::DataStore;

pub use self::channel::{Channel, ChannelMap, ChannelMembership};
pub use self::history::{ClientHistoryEntry, ExpiringMap};
pub use self::session::{RegistrationLock, Session};

/// Client history bounds: 1024 entries, one day.
const CLIENT_HISTORY_LEN: usize = 1024;
const CLIENT_HISTORY_AGE_SECS: i64 = 86400;

/// A named grant of capability tokens.
#[derive(Debug, Clone, Default)]
pub struct Role {
    pub capabilities: HashSet<String>,
}

/// An advertisable IRCv3 capability.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    /// CAP LS 302 value, e.g. the SASL mechanism list.
    pub value: Option<String>,
}

/// Case-insensitive nickname → live session map.
///
/// A session appears here iff it is registered and connected.
#[derive(Default)]
pub struct ClientRegistry {
    inner: DashMap<String, Arc<Session>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub fn insert(&self, nickname: &str, session: &Arc<Session>) {
        self.inner.insert(irc_to_lower(nickname), Arc::clone(session));
    }

    pub fn remove(&self, nickname: &str) -> Option<Arc<Session>> {
        self.inner.remove(&irc_to_lower(nickname)).map(|(_, s)| s)
    }

    pub fn get(&self, nickname: &str) -> Option<Arc<Session>> {
        self.inner.get(&irc_to_lower(nickname)).map(|s| Arc::clone(&s))
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.inner.contains_key(&irc_to_lower(nickname))
    }

    /// Point-in-time copy of the live sessions.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.inner.iter().map(|s| Arc::clone(&s)).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// The process-wide server context.
pub struct ServerContext {
    pub config: Config,
    pub buses: Buses,
    pub clients: ClientRegistry,
    pub channels: ChannelMap,
    pub client_history: Mutex<ExpiringMap<ClientHistoryEntry>>,
    pub roles: HashMap<String, Role>,
    /// Advertisable capabilities; pruned once at server start.
    pub caps: Mutex<BTreeMap<String, Capability>>,
    pub data: DataStore,
    pub hashing: HashHandler,
    pub shutdown_tx: broadcast::Sender<()>,
    pub startstamp: String,
    isupport: Vec<String>,
    current_ts: AtomicI64,
    shutting_down: AtomicBool,
}

impl ServerContext {
    pub fn new(config: Config, data: DataStore, hashing: HashHandler, buses: Buses) -> Self {
        let roles = config
            .roles
            .iter()
            .map(|(name, role)| {
                (
                    name.clone(),
                    Role {
                        capabilities: role.capabilities.clone(),
                    },
                )
            })
            .collect();

        let isupport = build_isupport(&config);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            buses,
            clients: ClientRegistry::new(),
            channels: ChannelMap::new(),
            client_history: Mutex::new(ExpiringMap::new(
                CLIENT_HISTORY_LEN,
                CLIENT_HISTORY_AGE_SECS,
            )),
            roles,
            caps: Mutex::new(BTreeMap::new()),
            data,
            hashing,
            shutdown_tx,
            startstamp: chrono::Local::now()
                .format("%a %b %d %Y at %H:%M:%S %Z")
                .to_string(),
            isupport,
            current_ts: AtomicI64::new(chrono::Utc::now().timestamp()),
            shutting_down: AtomicBool::new(false),
            config,
        }
    }

    /// The wall-clock tick, refreshed every second by a background task.
    pub fn now(&self) -> i64 {
        self.current_ts.load(Ordering::Relaxed)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Formatted ISUPPORT tokens, ready for the 005 burst.
    pub fn isupport_tokens(&self) -> &[String] {
        &self.isupport
    }

    /// Resolve a session's role, if it has one.
    pub fn role_of(&self, session: &Session) -> Option<Role> {
        let role_name = session.inner().role_name.clone()?;
        self.roles.get(&role_name).cloned()
    }

    /// Register a capability for CAP negotiation.
    pub fn add_capability(&self, name: &str, value: Option<String>) {
        self.caps.lock().insert(
            irc_to_lower(name),
            Capability {
                name: name.to_string(),
                value,
            },
        );
    }

    /// Unregister a capability entirely.
    pub fn remove_capability(&self, name: &str) {
        self.caps.lock().remove(&irc_to_lower(name));
    }

    /// Record a disconnect in the client history (casefolded, overwriting
    /// any previous entry for the nickname).
    pub fn record_history(&self, entry: ClientHistoryEntry) {
        let key = irc_to_lower(&entry.nickname);
        self.client_history.lock().insert(key, entry, self.now());
    }

    /// Spawn the self-scheduling maintenance tasks: the 1 s wall-clock tick
    /// and the periodic datastore save.
    pub fn start_background_tasks(self: &Arc<Self>) {
        {
            let ctx = Arc::clone(self);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            ctx.current_ts
                                .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            });
        }

        {
            let ctx = Arc::clone(self);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let save_interval = self.config.data.save_interval.max(1);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(save_interval));
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = ctx.data.save() {
                                warn!(error = %e, "periodic datastore save failed");
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            if let Err(e) = ctx.data.save() {
                                warn!(error = %e, "final datastore save failed");
                            }
                            debug!("datastore save task stopping");
                            break;
                        }
                    }
                }
            });
        }
    }

    /// Graceful shutdown: notify and exit every live session, then stop the
    /// listeners. New accepts are closed immediately once the flag is set.
    pub fn shutdown(self: &Arc<Self>, reason: &str) {
        self.shutting_down.store(true, Ordering::SeqCst);
        info!(reason = %reason, "server shutting down");

        for client in self.clients.snapshot() {
            if client.is_connected() {
                client.dump_notice(self, &format!("Server Terminating. {reason}"));
            }
            client.exit(self);
        }

        let _ = self.shutdown_tx.send(());
    }
}

/// Assemble the ISUPPORT token list from the configuration.
///
/// Boolean tokens render as bare keys; everything else as `KEY=VALUE`.
fn build_isupport(config: &Config) -> Vec<String> {
    fn token(key: &str, value: Option<String>) -> String {
        match value {
            Some(value) => format!("{key}={value}"),
            None => key.to_string(),
        }
    }

    vec![
        token("NETWORK", Some(config.network.clone())),
        token("METADATA", config.metadata.limit.map(|v| v.to_string())),
        token("MONITOR", config.monitor.limit.map(|v| v.to_string())),
        token("NICKLEN", Some(config.limits.nick.to_string())),
        token("CHANNELLEN", Some(config.limits.channel.to_string())),
        token("TOPICLEN", Some(config.limits.topic.to_string())),
        token("LINELEN", Some(config.limits.line.to_string())),
        token("USERLEN", Some(config.limits.user.to_string())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isupport_renders_bare_and_valued_tokens() {
        let mut config = Config::default();
        config.network = "TestNet".to_string();
        config.metadata.limit = None;
        config.monitor.limit = Some(100);
        let tokens = build_isupport(&config);
        assert!(tokens.contains(&"NETWORK=TestNet".to_string()));
        assert!(tokens.contains(&"METADATA".to_string()));
        assert!(tokens.contains(&"MONITOR=100".to_string()));
        assert!(tokens.contains(&"NICKLEN=31".to_string()));
    }
}
