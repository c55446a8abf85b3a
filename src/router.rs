//! Message routing across channel memberships.
//!
//! The router answers one question — who shares a channel with this session —
//! and fans a message out to that set. Recipient-specific mutation
//! (account-tag injection, hostmask source rewriting, postprocess hooks)
//! happens in `Session::dump_message`, which is why the fan-out hands every
//! recipient the same template message.

use std::collections::HashSet;
use std::sync::Arc;

use coracle_proto::Message;

use crate::state::{ServerContext, Session};

/// Options for a common-peer computation.
#[derive(Default)]
pub struct FanoutOpts {
    /// Sessions excluded from the result.
    pub exclude: Vec<Arc<Session>>,
    /// When set, only peers that negotiated this capability are included;
    /// the session itself is subject to the same filter.
    pub cap: Option<String>,
}

/// Compute the de-duplicated list of sessions sharing at least one channel
/// with `session`, plus the session itself.
///
/// Order is channel iteration order, then member iteration order, with the
/// session appended last; duplicates keep their first occurrence.
pub fn get_common_peers(session: &Arc<Session>, opts: &FanoutOpts) -> Vec<Arc<Session>> {
    let memberships = session.inner().channels.clone();

    let mut base: Vec<Arc<Session>> = Vec::new();
    for membership in &memberships {
        for member in membership.channel.members() {
            if opts.exclude.iter().any(|e| Arc::ptr_eq(e, &member)) {
                continue;
            }
            if let Some(cap) = &opts.cap {
                if !member.has_cap(cap) {
                    continue;
                }
            }
            base.push(member);
        }
    }

    let include_self = match &opts.cap {
        Some(cap) => session.has_cap(cap),
        None => true,
    };
    if include_self {
        base.push(Arc::clone(session));
    }

    let mut seen: HashSet<*const Session> = HashSet::new();
    let mut peers: Vec<Arc<Session>> = base
        .into_iter()
        .filter(|s| seen.insert(Arc::as_ptr(s)))
        .collect();

    if opts.exclude.iter().any(|e| Arc::ptr_eq(e, session)) {
        peers.retain(|p| !Arc::ptr_eq(p, session));
    }

    peers
}

/// Send `msg` to every common peer, with `session` as its originating
/// session (each recipient clones and post-processes its own copy).
pub fn sendto_common_peers(
    ctx: &Arc<ServerContext>,
    session: &Arc<Session>,
    msg: &Message,
    opts: &FanoutOpts,
) {
    for peer in get_common_peers(session, opts) {
        peer.dump_message(ctx, msg, Some(session));
    }
}
