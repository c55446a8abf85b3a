//! PRIVMSG and NOTICE delivery.
//!
//! Messages are relayed with the sender session attached, so each
//! recipient's dump path applies its own account-tag and hostmask source.
//! NOTICE never generates error numerics.

use std::sync::Arc;

use coracle_proto::Message;

use crate::error::HandlerResult;
use crate::events::Buses;
use crate::state::{ServerContext, Session};

pub fn register(buses: &mut Buses) {
    buses.rfc1459.register("PRIVMSG", 2, false, m_privmsg);
    buses.rfc1459.register("NOTICE", 2, false, m_notice);
}

fn m_privmsg(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    relay(ctx, cli, "PRIVMSG", &msg.params[0], &msg.params[1], false)
}

fn m_notice(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    relay(ctx, cli, "NOTICE", &msg.params[0], &msg.params[1], true)
}

fn relay(
    ctx: &Arc<ServerContext>,
    cli: &Arc<Session>,
    verb: &str,
    target: &str,
    text: &str,
    silent: bool,
) -> HandlerResult {
    if target.starts_with('#') || target.starts_with('&') {
        let Some(channel) = ctx.channels.get(target) else {
            if !silent {
                cli.dump_numeric(
                    ctx,
                    "401",
                    vec![target.to_string(), "No such nick/channel".to_string()],
                );
            }
            return Ok(());
        };

        if !channel.has_member(cli) {
            if !silent {
                cli.dump_numeric(
                    ctx,
                    "404",
                    vec![channel.name.clone(), "Cannot send to channel".to_string()],
                );
            }
            return Ok(());
        }

        let relayed = Message::new(verb)
            .with_param(channel.name.clone())
            .with_trailing_param(text);
        for member in channel.members() {
            if !Arc::ptr_eq(&member, cli) {
                member.dump_message(ctx, &relayed, Some(cli));
            }
        }
        return Ok(());
    }

    let Some(peer) = ctx.clients.get(target) else {
        if !silent {
            cli.dump_numeric(
                ctx,
                "401",
                vec![target.to_string(), "No such nick/channel".to_string()],
            );
        }
        return Ok(());
    };

    let relayed = Message::new(verb)
        .with_param(peer.nickname())
        .with_trailing_param(text);
    peer.dump_message(ctx, &relayed, Some(cli));

    if !silent {
        let away = peer.inner().away_message.clone();
        if !away.is_empty() {
            cli.dump_numeric(ctx, "301", vec![peer.nickname(), away]);
        }
    }

    Ok(())
}
