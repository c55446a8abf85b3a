//! User MODE: the legacy bridge onto the property map.
//!
//! Channel mode policy lives with the channel layer, not here; this handler
//! only projects `props` through the fixed letter table.

use std::sync::Arc;

use coracle_proto::{Message, irc_eq};

use crate::error::HandlerResult;
use crate::events::Buses;
use crate::state::{ServerContext, Session};

pub fn register(buses: &mut Buses) {
    buses.rfc1459.register("MODE", 1, false, m_mode);
}

fn m_mode(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    let target = &msg.params[0];

    if target.starts_with('#') || target.starts_with('&') {
        // Channel modes are out of this handler's hands.
        return Ok(());
    }

    if !irc_eq(target, &cli.nickname()) {
        cli.dump_numeric(
            ctx,
            "502",
            vec!["Cant change mode for other users".to_string()],
        );
        return Ok(());
    }

    match msg.params.get(1) {
        Some(changes) => cli.set_legacy_modes(ctx, changes),
        None => {
            let modes = cli.legacy_modes();
            cli.dump_numeric(ctx, "221", vec![modes]);
        }
    }

    Ok(())
}
