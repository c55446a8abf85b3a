//! Per-connection client session.
//!
//! A `Session` is the server-side state of one TCP/TLS connection: receive
//! buffering, the parsed-message queue, capability and property sets, the
//! registration lock state machine, the ping scheduler, and the outbound
//! write path with per-recipient post-processing.
//!
//! Locking discipline: `inner` guards the mutable state and is only ever
//! held for short, non-reentrant sections — never across a bus dispatch or
//! a call into another session.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use coracle_proto::Message;

use crate::events::CoreEvent;
use crate::router;
use crate::state::ServerContext;
use crate::state::channel::ChannelMembership;
use crate::state::casemap::{CaseMap, CaseSet};
use crate::state::history::ClientHistoryEntry;

/// Gates that must all release before a session registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationLock {
    /// Released by the NICK handler.
    Nick,
    /// Released by the USER handler.
    User,
    /// Released when the reverse-DNS check finishes (either way).
    Dns,
    /// Installed while CAP negotiation is open, released by CAP END.
    Cap,
}

impl fmt::Display for RegistrationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationLock::Nick => "NICK",
            RegistrationLock::User => "USER",
            RegistrationLock::Dns => "DNS",
            RegistrationLock::Cap => "CAP",
        };
        f.write_str(name)
    }
}

/// The locks installed on every new connection.
pub const CLIENT_REGISTRATION_LOCKS: &[RegistrationLock] = &[
    RegistrationLock::Nick,
    RegistrationLock::User,
    RegistrationLock::Dns,
];

/// Fixed projection between user properties and legacy mode letters.
///
/// Sorted by letter, so `legacy_modes` output is canonical.
pub const USER_MODE_TABLE: &[(char, &str)] = &[
    ('i', "special:invisible"),
    ('o', "special:oper"),
    ('w', "special:wallops"),
];

/// All legacy mode letters, for the 004 numeric.
pub fn user_mode_letters() -> String {
    USER_MODE_TABLE.iter().map(|(letter, _)| letter).collect()
}

/// Mutable session state behind the `inner` mutex.
pub struct SessionInner {
    /// `*` until the NICK handler accepts a nickname.
    pub nickname: String,
    pub username: String,
    pub realname: String,
    /// Validated rDNS name, or the peer address.
    pub hostname: String,
    pub servername: String,
    pub account: Option<String>,
    /// Indirect reference into the server's role table.
    pub role_name: Option<String>,
    /// Negotiated capabilities: name → value given at negotiation time.
    pub caps: CaseMap<Option<String>>,
    pub cap_version: u32,
    pub props: CaseMap<bool>,
    pub metadata: CaseMap<String>,
    pub user_set_metadata: CaseSet,
    pub monitoring: CaseSet,
    pub registration_lock: HashSet<RegistrationLock>,
    pub last_event_ts: i64,
    pub registration_ts: i64,
    pub ping_cookie: Option<i64>,
    pub channels: Vec<ChannelMembership>,
    /// Empty string means present.
    pub away_message: String,
    /// Mechanism selected by an in-flight AUTHENTICATE exchange.
    pub sasl: Option<String>,
}

struct SessionTimers {
    ping: Option<JoinHandle<()>>,
    ping_timeout: Option<JoinHandle<()>>,
}

/// One client connection.
pub struct Session {
    /// Peer IP. IPv6 addresses beginning with `:` are prefixed with `0`.
    pub realaddr: String,
    pub tls: bool,
    connected: AtomicBool,
    registered: AtomicBool,
    out: Mutex<Option<UnboundedSender<String>>>,
    recv_buffer: Mutex<BytesMut>,
    recvq: Mutex<VecDeque<Message>>,
    timers: Mutex<SessionTimers>,
    inner: Mutex<SessionInner>,
}

impl Session {
    /// Create a session for a fresh connection and start its ping timers.
    ///
    /// The caller owns the read loop and the writer draining the paired
    /// receiver; the reverse-DNS task is started separately so the accept
    /// path (and tests) control it.
    pub fn attach(
        ctx: &Arc<ServerContext>,
        peer_addr: &str,
        tls: bool,
        out: UnboundedSender<String>,
    ) -> Arc<Session> {
        let realaddr = normalize_peer_addr(peer_addr);

        let mut props = CaseMap::new();
        if tls {
            props.insert("special:tls", true);
        }

        let session = Arc::new(Session {
            realaddr: realaddr.clone(),
            tls,
            connected: AtomicBool::new(true),
            registered: AtomicBool::new(false),
            out: Mutex::new(Some(out)),
            recv_buffer: Mutex::new(BytesMut::new()),
            recvq: Mutex::new(VecDeque::new()),
            timers: Mutex::new(SessionTimers {
                ping: None,
                ping_timeout: None,
            }),
            inner: Mutex::new(SessionInner {
                nickname: "*".to_string(),
                username: String::new(),
                realname: "<unregistered>".to_string(),
                hostname: realaddr,
                servername: ctx.config.name.clone(),
                account: None,
                role_name: None,
                caps: CaseMap::new(),
                cap_version: 301,
                props,
                metadata: CaseMap::new(),
                user_set_metadata: CaseSet::new(),
                monitoring: CaseSet::new(),
                registration_lock: HashSet::new(),
                last_event_ts: ctx.now(),
                registration_ts: 0,
                ping_cookie: None,
                channels: Vec::new(),
                away_message: String::new(),
                sasl: None,
            }),
        });

        session.push_registration_lock(CLIENT_REGISTRATION_LOCKS);
        session.update_idle(ctx);

        debug!(peer = %session.realaddr, tls, "new inbound connection");

        let mut ev = CoreEvent::Client {
            client: Arc::clone(&session),
        };
        ctx.buses.core.dispatch(ctx, "client reglocked", &mut ev);

        session
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn nickname(&self) -> String {
        self.inner.lock().nickname.clone()
    }

    pub fn account(&self) -> Option<String> {
        self.inner.lock().account.clone()
    }

    pub fn has_cap(&self, cap: &str) -> bool {
        self.inner.lock().caps.contains_key(cap)
    }

    /// Whether this session may edit metadata on `target`.
    ///
    /// Always on itself; on other clients only through a role granting
    /// `metadata:set_global`, or `metadata:set_local` for same-server
    /// targets.
    pub fn able_to_edit_metadata(
        self: &Arc<Self>,
        ctx: &Arc<ServerContext>,
        target: &Arc<Session>,
    ) -> bool {
        if Arc::ptr_eq(self, target) {
            return true;
        }
        let Some(role) = ctx.role_of(self) else {
            return false;
        };
        if role.capabilities.contains("metadata:set_global") {
            return true;
        }
        let mine = self.inner.lock().servername.clone();
        let theirs = target.inner.lock().servername.clone();
        mine == theirs && role.capabilities.contains("metadata:set_local")
    }

    /// `nick!user@host`, with empty components suppressed from the tail.
    /// Undefined (None) before registration completes.
    pub fn hostmask(&self) -> Option<String> {
        if !self.is_registered() {
            return None;
        }
        let inner = self.inner.lock();
        let mut hm = inner.nickname.clone();
        if !inner.username.is_empty() {
            hm.push('!');
            hm.push_str(&inner.username);
            if !inner.hostname.is_empty() {
                hm.push('@');
                hm.push_str(&inner.hostname);
            }
        }
        Some(hm)
    }

    // ------------------------------------------------------------------
    // Inbound path
    // ------------------------------------------------------------------

    /// Feed raw bytes from the transport.
    ///
    /// Complete lines are enqueued (with the flood check applied per line)
    /// and the queue is drained once at the end, so a burst arriving in one
    /// read observes the recvq bound.
    pub fn data_received(self: &Arc<Self>, ctx: &Arc<ServerContext>, data: &[u8]) {
        let lines = {
            let mut buffer = self.recv_buffer.lock();
            buffer.extend_from_slice(data);

            let mut lines = Vec::new();
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let mut line = buffer.split_to(pos + 1);
                line.truncate(line.len() - 1);
                lines.push(line.freeze());
            }

            // The partial tail never grows past the line limit.
            let limit = ctx.config.limits.line;
            if buffer.len() > limit {
                buffer.truncate(limit);
            }
            lines
        };

        for line in &lines {
            self.enqueue_line(ctx, line);
        }
        self.drain_queue(ctx);
    }

    /// Feed one framed line (already split off its newline).
    pub fn message_received(self: &Arc<Self>, ctx: &Arc<ServerContext>, line: &[u8]) {
        self.enqueue_line(ctx, line);
        self.drain_queue(ctx);
    }

    /// Decode, truncate, parse, flood-check, enqueue.
    fn enqueue_line(self: &Arc<Self>, ctx: &Arc<ServerContext>, line: &[u8]) {
        if !self.is_connected() {
            return;
        }

        let mut text = String::from_utf8_lossy(line).into_owned();
        let trimmed = text.trim_matches(['\r', '\n']);
        if trimmed.len() != text.len() {
            text = trimmed.to_string();
        }

        let limit = ctx.config.limits.line;
        if text.len() > limit {
            truncate_at_boundary(&mut text, limit);
        }

        let msg = match Message::parse(&text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(peer = %self.realaddr, error = %e, "discarding unparseable line");
                return;
            }
        };

        // The size check runs before the append; the overflowing message is
        // discarded.
        let mut recvq = self.recvq.lock();
        if recvq.len() >= ctx.config.recvq_len {
            drop(recvq);
            self.quit(ctx, "Excess flood");
            return;
        }
        recvq.push_back(msg);
    }

    /// Dispatch queued messages in FIFO order. Safe to re-enter: nested
    /// drains simply consume from the shared queue.
    pub fn drain_queue(self: &Arc<Self>, ctx: &Arc<ServerContext>) {
        loop {
            if !self.is_connected() {
                return;
            }
            let Some(msg) = self.recvq.lock().pop_front() else {
                return;
            };
            self.update_idle(ctx);
            ctx.buses.rfc1459.dispatch(ctx, self, &msg);
        }
    }

    /// Synthesize a message from this session and re-dispatch it, as if the
    /// client had sent it (e.g. `register` triggering MOTD).
    pub fn handle_side_effect(
        self: &Arc<Self>,
        ctx: &Arc<ServerContext>,
        verb: &str,
        params: Vec<String>,
    ) {
        let msg = Message::new(verb).with_params(params);
        ctx.buses.rfc1459.dispatch(ctx, self, &msg);
    }

    // ------------------------------------------------------------------
    // Outbound path
    // ------------------------------------------------------------------

    /// Serialize a message for this recipient and write it.
    ///
    /// The message is cloned first: capability-dependent tag injection and
    /// source rewriting are per-recipient mutations. `from` is the session
    /// the message originates from, when it originates from one.
    pub fn dump_message(
        self: &Arc<Self>,
        ctx: &Arc<ServerContext>,
        msg: &Message,
        from: Option<&Arc<Session>>,
    ) {
        let mut out = msg.clone();

        if let Some(source) = from {
            if self.has_cap("account-tag") {
                let account = source.account().unwrap_or_else(|| "*".to_string());
                out.tags.insert("account".to_string(), Some(account));
            }
            out.source = source.hostmask();
        }

        let mut ev = CoreEvent::OutboundPostprocess {
            client: Arc::clone(self),
            message: out,
        };
        ctx.buses
            .core
            .dispatch(ctx, "outbound message postprocess", &mut ev);
        let CoreEvent::OutboundPostprocess { message: out, .. } = ev else {
            return;
        };

        let mut line = out.to_string();
        let limit = ctx.config.limits.line;
        if line.len() > limit - 2 {
            warn!(
                nick = %self.nickname(),
                limit,
                "outbound message truncated"
            );
            truncate_at_boundary(&mut line, limit - 2);
        }

        self.send_line(&line);
    }

    /// Dump a verb with this server as the source.
    pub fn dump_verb(self: &Arc<Self>, ctx: &Arc<ServerContext>, verb: &str, params: Vec<String>) {
        let msg = Message::new(verb)
            .with_source(ctx.config.name.clone())
            .with_params(params);
        self.dump_message(ctx, &msg, None);
    }

    /// Dump a verb without a source prefix. Some clients fall over when
    /// prefixes are presented with messages like PING.
    pub fn dump_verb_unprefixed(
        self: &Arc<Self>,
        ctx: &Arc<ServerContext>,
        verb: &str,
        params: Vec<String>,
    ) {
        let msg = Message::new(verb).with_params(params);
        self.dump_message(ctx, &msg, None);
    }

    /// Dump a numeric, prepending this client's nickname as the routing
    /// target.
    pub fn dump_numeric(
        self: &Arc<Self>,
        ctx: &Arc<ServerContext>,
        numeric: &str,
        params: Vec<String>,
    ) {
        let mut full = Vec::with_capacity(params.len() + 1);
        full.push(self.nickname());
        full.extend(params);
        let msg = Message::new(numeric)
            .with_source(ctx.config.name.clone())
            .with_params(full);
        self.dump_message(ctx, &msg, None);
    }

    /// Dump a server NOTICE to this client.
    pub fn dump_notice(self: &Arc<Self>, ctx: &Arc<ServerContext>, text: &str) {
        let nick = self.nickname();
        self.dump_verb(ctx, "NOTICE", vec![nick, format!("*** {text}")]);
    }

    fn send_line(&self, line: &str) {
        if let Some(out) = self.out.lock().as_ref() {
            let _ = out.send(format!("{line}\r\n"));
        }
    }

    // ------------------------------------------------------------------
    // Liveness
    // ------------------------------------------------------------------

    /// Record activity: stamp `last_event_ts` and re-arm both timers.
    pub fn update_idle(self: &Arc<Self>, ctx: &Arc<ServerContext>) {
        self.inner.lock().last_event_ts = ctx.now();
        self.update_pings(ctx);
    }

    /// Cancel-and-rearm the ping and ping-timeout timers together.
    pub fn update_pings(self: &Arc<Self>, ctx: &Arc<ServerContext>) {
        let ping_frequency = ctx.config.clients.ping_frequency.as_secs();
        let ping_timeout = ctx.config.clients.ping_timeout.as_secs();

        let mut timers = self.timers.lock();

        if let Some(handle) = timers.ping.take() {
            handle.abort();
        }
        timers.ping = Some(tokio::spawn({
            let ctx = Arc::clone(ctx);
            let session = Arc::downgrade(self);
            async move {
                tokio::time::sleep(Duration::from_secs(ping_frequency)).await;
                if let Some(session) = session.upgrade() {
                    session.dump_ping(&ctx);
                }
            }
        }));

        if let Some(handle) = timers.ping_timeout.take() {
            handle.abort();
        }
        timers.ping_timeout = Some(tokio::spawn({
            let ctx = Arc::clone(ctx);
            let session = Arc::downgrade(self);
            async move {
                tokio::time::sleep(Duration::from_secs(ping_timeout)).await;
                if let Some(session) = session.upgrade() {
                    session.quit(&ctx, &format!("Ping timeout: {ping_timeout} seconds"));
                }
            }
        }));
    }

    /// Stamp a cookie and ping the client (no source prefix).
    fn dump_ping(self: &Arc<Self>, ctx: &Arc<ServerContext>) {
        let cookie = ctx.now();
        self.inner.lock().ping_cookie = Some(cookie);
        let msg = Message::new("PING").with_trailing_param(cookie.to_string());
        self.dump_message(ctx, &msg, None);
    }

    // ------------------------------------------------------------------
    // Registration state machine
    // ------------------------------------------------------------------

    /// Add lock tokens. No-op once registered.
    pub fn push_registration_lock(&self, locks: &[RegistrationLock]) {
        if self.is_registered() {
            return;
        }
        self.inner.lock().registration_lock.extend(locks);
    }

    /// Remove lock tokens; the release that empties the set registers the
    /// session. No-op once registered.
    pub fn release_registration_lock(
        self: &Arc<Self>,
        ctx: &Arc<ServerContext>,
        locks: &[RegistrationLock],
    ) {
        if self.is_registered() {
            return;
        }
        let now_empty = {
            let mut inner = self.inner.lock();
            for lock in locks {
                inner.registration_lock.remove(lock);
            }
            inner.registration_lock.is_empty()
        };
        if now_empty {
            self.register(ctx);
        }
    }

    /// Complete registration: install in the nickname registry, emit the
    /// welcome burst and the MOTD side effect.
    fn register(self: &Arc<Self>, ctx: &Arc<ServerContext>) {
        self.registered.store(true, Ordering::SeqCst);
        ctx.clients.insert(&self.nickname(), self);
        self.inner.lock().registration_ts = ctx.now();
        self.update_idle(ctx);

        if self.tls {
            self.dump_notice(ctx, "You are connected using TLS");
        }

        let mut ev = CoreEvent::Client {
            client: Arc::clone(self),
        };
        ctx.buses.core.dispatch(ctx, "client registered", &mut ev);

        let version = format!("coracled-{}", env!("CARGO_PKG_VERSION"));
        let hostmask = self.hostmask().unwrap_or_else(|| self.nickname());

        self.dump_numeric(
            ctx,
            "001",
            vec![format!(
                "Welcome to the {} IRC Network, {}",
                ctx.config.network, hostmask
            )],
        );
        self.dump_numeric(
            ctx,
            "002",
            vec![format!(
                "Your host is {}, running version {}",
                ctx.config.name, version
            )],
        );
        self.dump_numeric(
            ctx,
            "003",
            vec![format!("This server was started at {}", ctx.startstamp)],
        );
        self.dump_numeric(
            ctx,
            "004",
            vec![ctx.config.name.clone(), version, user_mode_letters()],
        );
        self.dump_isupport(ctx);

        self.handle_side_effect(ctx, "MOTD", Vec::new());

        let mut ev = CoreEvent::Client {
            client: Arc::clone(self),
        };
        ctx.buses.core.dispatch(ctx, "client connect", &mut ev);
    }

    /// Emit the 005 burst, at most 13 tokens per line.
    pub fn dump_isupport(self: &Arc<Self>, ctx: &Arc<ServerContext>) {
        let tokens = ctx.isupport_tokens();
        for chunk in tokens.chunks(13) {
            let mut params: Vec<String> = chunk.to_vec();
            params.push("are supported by this server".to_string());
            self.dump_numeric(ctx, "005", params);
        }
    }

    // ------------------------------------------------------------------
    // Legacy user modes
    // ------------------------------------------------------------------

    /// Current modes as a canonical `+abc` string (table order).
    pub fn legacy_modes(&self) -> String {
        let inner = self.inner.lock();
        let mut out = String::from("+");
        for (letter, prop) in USER_MODE_TABLE {
            if inner.props.get(prop).copied().unwrap_or(false) {
                out.push(*letter);
            }
        }
        out
    }

    /// Apply a `+`/`-` toggle string to the property map.
    ///
    /// Unknown letters draw a 501; the `o` letter cannot be granted this
    /// way, only removed. Emits a grouped diff MODE line afterwards.
    pub fn set_legacy_modes(self: &Arc<Self>, ctx: &Arc<ServerContext>, changes: &str) {
        let before = self.mode_projection();

        let mut adding = false;
        for c in changes.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                letter => {
                    if letter == 'o' && adding {
                        continue;
                    }
                    let Some((_, prop)) = USER_MODE_TABLE.iter().find(|(l, _)| *l == letter)
                    else {
                        self.dump_numeric(
                            ctx,
                            "501",
                            vec![letter.to_string(), "Unknown MODE flag".to_string()],
                        );
                        continue;
                    };
                    self.inner.lock().props.insert(prop, adding);
                }
            }
        }

        self.flush_legacy_mode_change(ctx, &before, &self.mode_projection());
    }

    /// Snapshot of the props map projected through the mode table.
    fn mode_projection(&self) -> Vec<bool> {
        let inner = self.inner.lock();
        USER_MODE_TABLE
            .iter()
            .map(|(_, prop)| inner.props.get(prop).copied().unwrap_or(false))
            .collect()
    }

    /// Emit a compact `MODE` diff, grouping `-` and `+` runs.
    fn flush_legacy_mode_change(
        self: &Arc<Self>,
        ctx: &Arc<ServerContext>,
        before: &[bool],
        after: &[bool],
    ) {
        let mut out = String::new();
        // 0 = no sign yet, 1 = in a '-' run, 2 = in a '+' run
        let mut run = 0u8;

        for (i, (letter, _)) in USER_MODE_TABLE.iter().enumerate() {
            if before[i] && !after[i] {
                if run != 1 {
                    run = 1;
                    out.push('-');
                }
                out.push(*letter);
            } else if !before[i] && after[i] {
                if run != 2 {
                    run = 2;
                    out.push('+');
                }
                out.push(*letter);
            }
        }

        if out.is_empty() {
            return;
        }

        let msg = Message::new("MODE").with_params(vec![self.nickname(), out]);
        self.dump_message(ctx, &msg, Some(self));
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Announce a quit to the core bus and common peers, then tear down.
    pub fn quit(self: &Arc<Self>, ctx: &Arc<ServerContext>, reason: &str) {
        if !self.is_connected() {
            return;
        }

        let mut ev = CoreEvent::ClientQuit {
            client: Arc::clone(self),
            message: reason.to_string(),
        };
        ctx.buses.core.dispatch(ctx, "client quit", &mut ev);

        let msg = Message::new("QUIT").with_trailing_param(reason);
        router::sendto_common_peers(
            ctx,
            self,
            &msg,
            &router::FanoutOpts {
                exclude: vec![Arc::clone(self)],
                cap: None,
            },
        );

        self.exit(ctx);
    }

    /// Forcibly remove this client on behalf of `source`.
    ///
    /// Observers see `client killed` first, then the KILL line, then the
    /// quit broadcast.
    pub fn kill(self: &Arc<Self>, ctx: &Arc<ServerContext>, source: &Arc<Session>, reason: &str) {
        let mut ev = CoreEvent::ClientKilled {
            source: Arc::clone(source),
            client: Arc::clone(self),
            reason: reason.to_string(),
        };
        ctx.buses.core.dispatch(ctx, "client killed", &mut ev);

        let msg = Message::new("KILL")
            .with_param(self.nickname())
            .with_trailing_param(reason);
        self.dump_message(ctx, &msg, Some(source));

        self.quit(
            ctx,
            &format!("Killed ({} ({}))", source.nickname(), reason),
        );
    }

    /// Idempotent teardown: cancel timers, close the transport, unlink
    /// memberships, deregister, record history.
    pub fn exit(self: &Arc<Self>, ctx: &Arc<ServerContext>) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        {
            let mut timers = self.timers.lock();
            if let Some(handle) = timers.ping.take() {
                handle.abort();
            }
            if let Some(handle) = timers.ping_timeout.take() {
                handle.abort();
            }
        }

        // Dropping the sender ends the writer task and closes the socket.
        self.out.lock().take();

        if !self.is_registered() {
            return;
        }

        loop {
            let membership = {
                let mut inner = self.inner.lock();
                match inner.channels.pop() {
                    Some(m) => m,
                    None => break,
                }
            };
            membership.channel.remove_member(self);
            ctx.channels.remove_if_empty(&membership.channel);
        }

        ctx.clients.remove(&self.nickname());
        ctx.record_history(self.history_entry());
    }

    /// Translate a transport-level close into a quit.
    pub fn connection_lost(
        self: &Arc<Self>,
        ctx: &Arc<ServerContext>,
        error: Option<std::io::Error>,
    ) {
        if !self.is_connected() {
            return;
        }
        match error {
            None => self.quit(ctx, "Connection closed"),
            Some(e) => self.quit(ctx, &format!("Connection error: {e:?}")),
        }
    }

    fn history_entry(&self) -> ClientHistoryEntry {
        let inner = self.inner.lock();
        ClientHistoryEntry {
            nickname: inner.nickname.clone(),
            username: inner.username.clone(),
            hostname: inner.hostname.clone(),
            realname: inner.realname.clone(),
            account: inner.account.clone(),
        }
    }
}

/// IPv6 peer addresses beginning with `:` get a `0` prefix so they round
/// trip through logging and the rDNS forward compare.
fn normalize_peer_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0{addr}")
    } else {
        addr.to_string()
    }
}

/// Truncate a string to at most `limit` bytes on a char boundary.
fn truncate_at_boundary(s: &mut String, limit: usize) {
    let mut end = limit.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_addr_normalization() {
        assert_eq!(normalize_peer_addr("192.0.2.7"), "192.0.2.7");
        assert_eq!(normalize_peer_addr("::1"), "0::1");
        assert_eq!(normalize_peer_addr("2001:db8::1"), "2001:db8::1");
    }

    #[test]
    fn boundary_truncation_respects_utf8() {
        let mut s = "abc\u{00e9}def".to_string();
        truncate_at_boundary(&mut s, 4);
        assert_eq!(s, "abc");
        let mut s = "abcdef".to_string();
        truncate_at_boundary(&mut s, 4);
        assert_eq!(s, "abcd");
    }

    #[test]
    fn mode_letters_are_sorted() {
        let letters = user_mode_letters();
        let mut sorted: Vec<char> = letters.chars().collect();
        sorted.sort_unstable();
        assert_eq!(letters, sorted.into_iter().collect::<String>());
    }
}
