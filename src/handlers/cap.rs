//! IRCv3 capability negotiation.
//!
//! `CAP LS`/`CAP REQ` before registration install the `CAP` registration
//! lock so the welcome burst waits for `CAP END`. The capability registry
//! itself lives on the server context; this module only negotiates.

use std::sync::Arc;

use coracle_proto::Message;

use crate::error::HandlerResult;
use crate::events::Buses;
use crate::state::{RegistrationLock, ServerContext, Session};

pub fn register(buses: &mut Buses) {
    buses.rfc1459.register("CAP", 1, true, m_cap);
}

fn m_cap(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    let subcommand = msg.params[0].to_ascii_uppercase();
    let nick = cli.nickname();

    match subcommand.as_str() {
        "LS" => {
            if let Some(version) = msg.params.get(1).and_then(|v| v.parse::<u32>().ok()) {
                let mut inner = cli.inner();
                if version > inner.cap_version {
                    inner.cap_version = version;
                }
            }
            hold_registration(cli);

            let cap_version = cli.inner().cap_version;
            let listing: Vec<String> = ctx
                .caps
                .lock()
                .values()
                .map(|cap| match (&cap.value, cap_version >= 302) {
                    (Some(value), true) => format!("{}={}", cap.name, value),
                    _ => cap.name.clone(),
                })
                .collect();
            reply(ctx, cli, nick, "LS", &listing.join(" "));
        }

        "LIST" => {
            let negotiated: Vec<String> = cli.inner().caps.keys().cloned().collect();
            reply(ctx, cli, nick, "LIST", &negotiated.join(" "));
        }

        "REQ" => {
            hold_registration(cli);

            let request = msg.params.get(1).cloned().unwrap_or_default();
            let tokens: Vec<&str> = request.split_whitespace().collect();

            // All-or-nothing: one unknown capability NAKs the request.
            let known = {
                let caps = ctx.caps.lock();
                tokens
                    .iter()
                    .all(|t| caps.contains_key(&coracle_proto::irc_to_lower(t.trim_start_matches('-'))))
            };
            if tokens.is_empty() || !known {
                reply(ctx, cli, nick, "NAK", &request);
                return Ok(());
            }

            for token in &tokens {
                match token.strip_prefix('-') {
                    Some(name) => {
                        cli.inner().caps.remove(name);
                    }
                    None => {
                        let value = ctx
                            .caps
                            .lock()
                            .get(&coracle_proto::irc_to_lower(token))
                            .and_then(|cap| cap.value.clone());
                        cli.inner().caps.insert(token, value);
                    }
                }
            }
            reply(ctx, cli, nick, "ACK", &request);
        }

        "END" => {
            cli.release_registration_lock(ctx, &[RegistrationLock::Cap]);
        }

        other => {
            cli.dump_numeric(
                ctx,
                "410",
                vec![other.to_string(), "Invalid CAP subcommand".to_string()],
            );
        }
    }

    Ok(())
}

/// Install the CAP registration lock while negotiation is open.
fn hold_registration(cli: &Arc<Session>) {
    if !cli.is_registered() {
        cli.push_registration_lock(&[RegistrationLock::Cap]);
    }
}

/// CAP replies always carry their capability list as a trailing parameter.
fn reply(ctx: &Arc<ServerContext>, cli: &Arc<Session>, nick: String, sub: &str, list: &str) {
    let msg = Message::new("CAP")
        .with_source(ctx.config.name.clone())
        .with_param(nick)
        .with_param(sub)
        .with_trailing_param(list);
    cli.dump_message(ctx, &msg, None);
}
