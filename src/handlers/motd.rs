//! MOTD. Triggered on demand and as a registration side effect.

use std::sync::Arc;

use coracle_proto::Message;

use crate::error::HandlerResult;
use crate::events::Buses;
use crate::state::{ServerContext, Session};

pub fn register(buses: &mut Buses) {
    buses.rfc1459.register("MOTD", 0, false, m_motd);
}

fn m_motd(ctx: &Arc<ServerContext>, cli: &Arc<Session>, _msg: &Message) -> HandlerResult {
    match ctx.config.motd.load_lines() {
        Some(lines) => {
            cli.dump_numeric(
                ctx,
                "375",
                vec![format!("- {} Message of the day -", ctx.config.name)],
            );
            for line in lines {
                cli.dump_numeric(ctx, "372", vec![format!("- {line}")]);
            }
            cli.dump_numeric(ctx, "376", vec!["End of MOTD command".to_string()]);
        }
        None => {
            cli.dump_numeric(ctx, "422", vec!["MOTD File is missing".to_string()]);
        }
    }
    Ok(())
}
