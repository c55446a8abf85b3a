//! JOIN and PART: channel membership maintenance.
//!
//! Just enough channel surface to keep the membership view truthful:
//! creation, the both-ends membership link, JOIN/PART fan-out and the NAMES
//! burst. Topic, keys, bans and the rest of channel policy stay elsewhere.

use std::sync::Arc;

use coracle_proto::Message;

use crate::error::HandlerResult;
use crate::events::Buses;
use crate::state::channel::ChannelMembership;
use crate::state::{Channel, ServerContext, Session};

pub fn register(buses: &mut Buses) {
    buses.rfc1459.register("JOIN", 1, false, m_join);
    buses.rfc1459.register("PART", 1, false, m_part);
}

fn m_join(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    for name in msg.params[0].split(',').filter(|n| !n.is_empty()) {
        if !name.starts_with('#') || name.len() > ctx.config.limits.channel {
            cli.dump_numeric(
                ctx,
                "403",
                vec![name.to_string(), "No such channel".to_string()],
            );
            continue;
        }

        let (channel, created) = ctx.channels.get_or_create(name);
        if channel.has_member(cli) {
            continue;
        }

        channel.add_member(cli);
        cli.inner().channels.push(ChannelMembership {
            channel: Arc::clone(&channel),
            modes: if created { "o".to_string() } else { String::new() },
        });

        let join = Message::new("JOIN").with_param(channel.name.clone());
        for member in channel.members() {
            member.dump_message(ctx, &join, Some(cli));
        }

        send_names(ctx, cli, &channel);
    }
    Ok(())
}

fn m_part(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    let reason = msg.params.get(1).cloned();

    for name in msg.params[0].split(',').filter(|n| !n.is_empty()) {
        let Some(channel) = ctx.channels.get(name) else {
            cli.dump_numeric(
                ctx,
                "403",
                vec![name.to_string(), "No such channel".to_string()],
            );
            continue;
        };

        if !channel.has_member(cli) {
            cli.dump_numeric(
                ctx,
                "442",
                vec![channel.name.clone(), "You're not on that channel".to_string()],
            );
            continue;
        }

        let mut part = Message::new("PART").with_param(channel.name.clone());
        if let Some(ref reason) = reason {
            part = part.with_param(reason.clone());
        }
        for member in channel.members() {
            member.dump_message(ctx, &part, Some(cli));
        }

        channel.remove_member(cli);
        cli.inner()
            .channels
            .retain(|m| !Arc::ptr_eq(&m.channel, &channel));
        ctx.channels.remove_if_empty(&channel);
    }
    Ok(())
}

/// 353/366 burst for a fresh member.
fn send_names(ctx: &Arc<ServerContext>, cli: &Arc<Session>, channel: &Arc<Channel>) {
    let mut names = Vec::new();
    for member in channel.members() {
        let op = member
            .inner()
            .channels
            .iter()
            .find(|m| Arc::ptr_eq(&m.channel, channel))
            .is_some_and(|m| m.modes.contains('o'));
        let nick = member.nickname();
        names.push(if op { format!("@{nick}") } else { nick });
    }

    cli.dump_numeric(
        ctx,
        "353",
        vec!["=".to_string(), channel.name.clone(), names.join(" ")],
    );
    cli.dump_numeric(
        ctx,
        "366",
        vec![channel.name.clone(), "End of NAMES list".to_string()],
    );
}
