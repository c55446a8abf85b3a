//! Channel membership view.
//!
//! Channels here are deliberately thin: they own member records and expose
//! the read-only view the router needs (list members, walk memberships).
//! Join/part/topic/mode *policy* lives with the channel handlers; everything
//! else in the server only cares who shares a channel with whom.
//!
//! Ownership: the server context owns channels; channels own member records;
//! a member record holds a non-owning back-reference to its session. The
//! session side of the link is a membership record holding the channel and
//! the modes the session has in it. `Session::exit` unlinks both ends.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;

use coracle_proto::irc_to_lower;

use super::session::Session;

/// One member record, owned by the channel.
struct Member {
    session: Weak<Session>,
}

/// A channel: a name and its member records.
pub struct Channel {
    pub name: String,
    members: Mutex<Vec<Member>>,
}

impl Channel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Mutex::new(Vec::new()),
        }
    }

    /// Live member sessions, in join order.
    pub fn members(&self) -> Vec<Arc<Session>> {
        self.members
            .lock()
            .iter()
            .filter_map(|m| m.session.upgrade())
            .collect()
    }

    pub fn has_member(&self, session: &Arc<Session>) -> bool {
        self.members
            .lock()
            .iter()
            .any(|m| m.session.as_ptr() == Arc::as_ptr(session))
    }

    /// Link the channel side of a membership. No-op when already present.
    pub fn add_member(&self, session: &Arc<Session>) {
        let mut members = self.members.lock();
        if members
            .iter()
            .any(|m| m.session.as_ptr() == Arc::as_ptr(session))
        {
            return;
        }
        members.push(Member {
            session: Arc::downgrade(session),
        });
    }

    /// Unlink the channel side of a membership. Returns whether it existed.
    pub fn remove_member(&self, session: &Arc<Session>) -> bool {
        let mut members = self.members.lock();
        let before = members.len();
        members.retain(|m| m.session.as_ptr() != Arc::as_ptr(session));
        members.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().iter().all(|m| m.session.upgrade().is_none())
    }
}

/// The session side of a membership link.
#[derive(Clone)]
pub struct ChannelMembership {
    pub channel: Arc<Channel>,
    /// Channel mode letters this session holds (e.g. "o" for the creator).
    pub modes: String,
}

/// Case-insensitive channel name → channel.
#[derive(Default)]
pub struct ChannelMap {
    inner: DashMap<String, Arc<Channel>>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.inner.get(&irc_to_lower(name)).map(|c| Arc::clone(&c))
    }

    /// Fetch a channel, creating it when absent. Returns `(channel, created)`.
    pub fn get_or_create(&self, name: &str) -> (Arc<Channel>, bool) {
        let key = irc_to_lower(name);
        if let Some(existing) = self.inner.get(&key) {
            return (Arc::clone(&existing), false);
        }
        let channel = Arc::new(Channel::new(name));
        self.inner.insert(key, Arc::clone(&channel));
        (channel, true)
    }

    /// Drop a channel once its last member is gone.
    pub fn remove_if_empty(&self, channel: &Arc<Channel>) {
        if channel.is_empty() {
            self.inner.remove(&irc_to_lower(&channel.name));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
