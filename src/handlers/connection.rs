//! Connection and registration handlers: NICK, USER, PING, PONG, QUIT, AWAY.

use std::sync::Arc;

use coracle_proto::{Message, is_valid_nickname};
use tracing::info;

use crate::error::HandlerResult;
use crate::events::Buses;
use crate::router;
use crate::state::{RegistrationLock, ServerContext, Session};

pub fn register(buses: &mut Buses) {
    buses.rfc1459.register("NICK", 1, true, m_nick);
    buses.rfc1459.register("USER", 4, true, m_user);
    buses.rfc1459.register("PING", 1, true, m_ping);
    buses.rfc1459.register("PONG", 0, true, m_pong);
    buses.rfc1459.register("QUIT", 0, true, m_quit);
    buses.rfc1459.register("AWAY", 0, false, m_away);
}

/// NICK: validate, check for collisions, then either release the
/// registration token or perform a live rename.
///
/// Collision and validity checks happen before the token release so an
/// invalid NICK can never partially register a session.
fn m_nick(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    let nick = &msg.params[0];

    if !is_valid_nickname(nick, ctx.config.limits.nick) {
        cli.dump_numeric(
            ctx,
            "432",
            vec![nick.clone(), "Erroneous nickname".to_string()],
        );
        return Ok(());
    }

    if let Some(existing) = ctx.clients.get(nick) {
        if !Arc::ptr_eq(&existing, cli) {
            cli.dump_numeric(
                ctx,
                "433",
                vec![nick.clone(), "Nickname is already in use".to_string()],
            );
            return Ok(());
        }
    }

    if cli.is_registered() {
        let old = cli.nickname();
        if old == *nick {
            return Ok(());
        }

        // Peers see the rename under the old hostmask, so fan out first.
        let rename = Message::new("NICK").with_param(nick.clone());
        router::sendto_common_peers(ctx, cli, &rename, &router::FanoutOpts::default());

        ctx.clients.remove(&old);
        cli.inner().nickname = nick.clone();
        ctx.clients.insert(nick, cli);
        info!(old = %old, new = %nick, "nickname change");
    } else {
        cli.inner().nickname = nick.clone();
        cli.release_registration_lock(ctx, &[RegistrationLock::Nick]);
    }

    Ok(())
}

/// USER: capture username/realname and release the USER token.
fn m_user(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    if cli.is_registered() {
        cli.dump_numeric(ctx, "462", vec!["You may not reregister".to_string()]);
        return Ok(());
    }

    let mut username = msg.params[0].clone();
    username.truncate(ctx.config.limits.user);

    {
        let mut inner = cli.inner();
        inner.username = username;
        inner.realname = msg.params[3].clone();
    }

    cli.release_registration_lock(ctx, &[RegistrationLock::User]);
    Ok(())
}

/// PING from a client: answer with PONG.
fn m_ping(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    cli.dump_verb(
        ctx,
        "PONG",
        vec![ctx.config.name.clone(), msg.params[0].clone()],
    );
    Ok(())
}

/// PONG: liveness acknowledged; the idle stamp was already refreshed on
/// receive, so just clear the cookie.
fn m_pong(_ctx: &Arc<ServerContext>, cli: &Arc<Session>, _msg: &Message) -> HandlerResult {
    cli.inner().ping_cookie = None;
    Ok(())
}

/// QUIT: terminate with the client-supplied reason.
fn m_quit(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    let reason = msg.params.first().map(String::as_str).unwrap_or("");
    cli.quit(ctx, &format!("Quit: {reason}"));
    Ok(())
}

/// AWAY: set or clear the away message.
fn m_away(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    match msg.params.first().filter(|m| !m.is_empty()) {
        Some(message) => {
            cli.inner().away_message = message.clone();
            cli.dump_numeric(
                ctx,
                "306",
                vec!["You have been marked as being away".to_string()],
            );
        }
        None => {
            cli.inner().away_message.clear();
            cli.dump_numeric(
                ctx,
                "305",
                vec!["You are no longer marked as being away".to_string()],
            );
        }
    }
    Ok(())
}
