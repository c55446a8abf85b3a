//! SASL authentication (PLAIN).
//!
//! The AUTHENTICATE exchange interleaves with registration: a session may
//! select a mechanism, push one base64 payload, and either log in (900/903)
//! or fail (904/905/906). Completing registration with an exchange still
//! open aborts it. At server start the mechanism list is pruned against the
//! hashing provider; an empty list unregisters the `sasl` capability
//! entirely.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::info;
use zeroize::Zeroize;

use coracle_proto::Message;

use crate::error::HandlerResult;
use crate::events::{Buses, CoreEvent};
use crate::state::{ServerContext, Session};

/// Mechanisms compiled into this server.
const VALID_MECHANISMS: &[&str] = &["PLAIN"];

/// Payloads beyond this many characters draw a 905.
const MAX_PAYLOAD_CHARS: usize = 400;

pub fn register(buses: &mut Buses) {
    buses.rfc1459.register("AUTHENTICATE", 1, true, m_authenticate);
    buses.core.register("server start", m_sasl_start);
    buses.core.register("client registered", m_sasl_unreglocked);
    buses.core.register("sasl authenticate plain", m_sasl_plain);
}

/// Advertise `sasl` with the mechanism list as its CAP LS value.
pub fn install_capability(ctx: &Arc<ServerContext>) {
    ctx.add_capability("sasl", Some(VALID_MECHANISMS.join(",")));
}

/// The mechanisms currently advertised (pruning happens at server start).
fn advertised_mechanisms(ctx: &Arc<ServerContext>) -> Vec<String> {
    ctx.caps
        .lock()
        .get("sasl")
        .and_then(|cap| cap.value.clone())
        .map(|value| value.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

/// Drop mechanisms whose prerequisites are missing.
fn m_sasl_start(ctx: &Arc<ServerContext>, _ev: &mut CoreEvent) -> HandlerResult {
    if !ctx.hashing.enabled() {
        info!("SASL PLAIN disabled because hashing is not available");
        let remaining: Vec<String> = advertised_mechanisms(ctx)
            .into_iter()
            .filter(|m| m != "PLAIN")
            .collect();
        if remaining.is_empty() {
            info!("SASL disabled because no mechanisms are available");
            ctx.remove_capability("sasl");
        } else {
            ctx.add_capability("sasl", Some(remaining.join(",")));
        }
    }
    Ok(())
}

fn m_authenticate(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    let arg = &msg.params[0];

    if arg == "*" {
        if cli.inner().sasl.is_some() {
            cli.dump_numeric(
                ctx,
                "906",
                vec!["SASL authentication aborted".to_string()],
            );
            cli.inner().sasl = None;
        } else {
            cli.dump_numeric(ctx, "904", vec!["SASL authentication failed".to_string()]);
        }
        return Ok(());
    }

    let mechanism = cli.inner().sasl.clone();
    match mechanism {
        Some(mechanism) => {
            if arg.chars().count() > MAX_PAYLOAD_CHARS {
                cli.dump_numeric(ctx, "905", vec!["SASL message too long".to_string()]);
                cli.inner().sasl = None;
                return Ok(());
            }

            let data = match BASE64.decode(arg.as_bytes()) {
                Ok(data) => data,
                Err(_) => {
                    cli.dump_numeric(
                        ctx,
                        "904",
                        vec!["SASL authentication failed".to_string()],
                    );
                    return Ok(());
                }
            };

            let topic = format!("sasl authenticate {}", mechanism.to_lowercase());
            let mut ev = CoreEvent::SaslAuthenticate {
                source: Arc::clone(cli),
                mechanism,
                data,
            };
            ctx.buses.core.dispatch(ctx, &topic, &mut ev);
        }

        None => {
            let mechanism = arg.to_ascii_uppercase();
            if advertised_mechanisms(ctx).iter().any(|m| *m == mechanism) {
                cli.inner().sasl = Some(mechanism);
                cli.dump_verb_unprefixed(ctx, "AUTHENTICATE", vec!["+".to_string()]);
            } else {
                cli.dump_numeric(ctx, "904", vec!["SASL authentication failed".to_string()]);
            }
        }
    }

    Ok(())
}

/// A session that registers mid-exchange has its exchange aborted.
fn m_sasl_unreglocked(ctx: &Arc<ServerContext>, ev: &mut CoreEvent) -> HandlerResult {
    let CoreEvent::Client { client } = ev else {
        return Ok(());
    };
    if client.inner().sasl.take().is_some() {
        client.dump_numeric(
            ctx,
            "906",
            vec!["SASL authentication aborted".to_string()],
        );
    }
    Ok(())
}

/// PLAIN: `authzid NUL authcid NUL passwd` (RFC 4616) against the
/// datastore. The authcid is the account looked up; the authzid is
/// usually empty and is ignored.
fn m_sasl_plain(ctx: &Arc<ServerContext>, ev: &mut CoreEvent) -> HandlerResult {
    let CoreEvent::SaslAuthenticate { source, data, .. } = ev else {
        return Ok(());
    };
    let cli = Arc::clone(source);

    let fail = |reason: &str| {
        tracing::debug!(nick = %cli.nickname(), reason, "SASL PLAIN failed");
        cli.dump_numeric(ctx, "904", vec!["SASL authentication failed".to_string()]);
    };

    let parts: Vec<&[u8]> = data.split(|&b| b == 0).collect();
    let [_authzid_raw, authcid_raw, passphrase_raw] = parts.as_slice() else {
        fail("malformed payload");
        return Ok(());
    };

    let Ok(account) = std::str::from_utf8(authcid_raw).map(str::to_string) else {
        fail("authcid not UTF-8");
        return Ok(());
    };
    if account.is_empty() {
        fail("empty authcid");
        return Ok(());
    }
    let Ok(mut passphrase) = String::from_utf8(passphrase_raw.to_vec()) else {
        fail("passphrase not UTF-8");
        return Ok(());
    };

    let verified = ctx
        .data
        .get_account(&account)
        .filter(|record| record.verified)
        .and_then(|record| record.credentials.passphrase)
        .is_some_and(|hash| ctx.hashing.verify(&passphrase, &hash));
    passphrase.zeroize();

    if !verified {
        fail("bad credentials");
        return Ok(());
    }

    cli.inner().account = Some(account.clone());

    let mut change = CoreEvent::AccountChange {
        source: Arc::clone(&cli),
        account: account.clone(),
    };
    ctx.buses.core.dispatch(ctx, "account change", &mut change);

    cli.inner().sasl = None;

    let hostmask = cli.hostmask().unwrap_or_else(|| "*".to_string());
    info!(account = %account, hostmask = %hostmask, "SASL PLAIN login");
    cli.dump_numeric(
        ctx,
        "900",
        vec![
            hostmask,
            account.clone(),
            format!("You are now logged in as {account}"),
        ],
    );
    cli.dump_numeric(
        ctx,
        "903",
        vec!["SASL authentication successful".to_string()],
    );

    Ok(())
}
