//! Reverse-DNS hostname adoption.
//!
//! Performed once, asynchronously, on every new connection: resolve the peer
//! address to a name, forward-resolve that name, and adopt it only when one
//! of the forward addresses matches the peer and the name passes the
//! hostname policy. Whatever happens, the `DNS` registration lock is
//! released exactly once.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_resolver::TokioResolver;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use tracing::debug;

use coracle_proto::is_valid_hostname;

use crate::state::{RegistrationLock, ServerContext, Session};

/// Bound on each resolver round trip so registration cannot hang on DNS.
const RDNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Start the fire-and-forget rDNS task for a fresh connection.
pub fn spawn_rdns_check(ctx: &Arc<ServerContext>, session: &Arc<Session>) {
    let ctx = Arc::clone(ctx);
    let session = Arc::clone(session);
    tokio::spawn(async move {
        rdns_check(&ctx, &session).await;
        // A session that closed while we were resolving is already
        // registered-or-gone; the release below is then a no-op.
        session.release_registration_lock(&ctx, &[RegistrationLock::Dns]);
    });
}

async fn rdns_check(ctx: &Arc<ServerContext>, session: &Arc<Session>) {
    session.dump_notice(ctx, "Looking up your hostname...");

    match resolve_and_confirm(&session.realaddr).await {
        Some(hostname) => {
            if is_valid_hostname(&hostname) {
                session.dump_notice(ctx, &format!("Found your hostname: {hostname}"));
                session.inner().hostname = hostname;
            } else {
                session.dump_notice(ctx, &format!("Hostname found but invalid: {hostname}"));
            }
        }
        None => {
            session.dump_notice(ctx, "Could not find your hostname...");
        }
    }
}

/// PTR + forward-confirm. Returns the confirmed name, not yet checked
/// against the hostname policy.
async fn resolve_and_confirm(realaddr: &str) -> Option<String> {
    let ip: IpAddr = realaddr.parse().ok()?;

    // Try system config, fall back to defaults
    let resolver = TokioResolver::builder_tokio()
        .map(|b| b.build())
        .unwrap_or_else(|_| {
            TokioResolver::builder_with_config(
                ResolverConfig::default(),
                TokioConnectionProvider::default(),
            )
            .build()
        });

    let reverse = tokio::time::timeout(RDNS_TIMEOUT, resolver.reverse_lookup(ip))
        .await
        .ok()?
        .ok()?;
    let name = reverse
        .iter()
        .next()
        .map(|ptr| ptr.to_string().trim_end_matches('.').to_string())?;

    if name == realaddr {
        return None;
    }

    let forward = tokio::time::timeout(RDNS_TIMEOUT, resolver.lookup_ip(name.as_str()))
        .await
        .ok()?
        .ok()?;

    for addr in forward.iter() {
        let mut candidate = addr.to_string();
        if candidate.starts_with(':') {
            candidate.insert(0, '0');
        }
        if candidate == realaddr {
            return Some(name);
        }
    }

    debug!(peer = %realaddr, name = %name, "rDNS forward-confirm mismatch");
    None
}
