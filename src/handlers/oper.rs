//! Operator actions gated on role capabilities.
//!
//! Role assignment itself is external; a session carries a role name and
//! this module only checks the granted capability tokens.

use std::sync::Arc;

use coracle_proto::Message;
use tracing::info;

use crate::error::HandlerResult;
use crate::events::Buses;
use crate::state::{ServerContext, Session};

pub fn register(buses: &mut Buses) {
    buses.rfc1459.register("KILL", 2, false, m_kill);
}

fn m_kill(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    let allowed = ctx
        .role_of(cli)
        .is_some_and(|role| role.capabilities.contains("oper:kill"));
    if !allowed {
        cli.dump_numeric(
            ctx,
            "481",
            vec!["Permission Denied - You're not an IRC operator".to_string()],
        );
        return Ok(());
    }

    let Some(target) = ctx.clients.get(&msg.params[0]) else {
        cli.dump_numeric(
            ctx,
            "401",
            vec![msg.params[0].clone(), "No such nick/channel".to_string()],
        );
        return Ok(());
    };

    info!(by = %cli.nickname(), target = %target.nickname(), "KILL");
    target.kill(ctx, cli, &msg.params[1]);
    Ok(())
}
