//! METADATA: free-form key/value annotations on clients.
//!
//! `METADATA <target> <GET|LIST|SET|CLEAR> [key] [value]`. Writes go
//! through the role-capability check (`metadata:set_global` /
//! `metadata:set_local`); keys a user sets on itself are tracked in
//! `user_set_metadata`. Channel metadata is not supported here.

use std::sync::Arc;

use coracle_proto::Message;

use crate::error::HandlerResult;
use crate::events::Buses;
use crate::state::{ServerContext, Session};

/// RPL_KEYVALUE (761): the value is always a trailing parameter.
fn keyvalue_reply(
    ctx: &Arc<ServerContext>,
    cli: &Arc<Session>,
    target: &str,
    key: &str,
    value: &str,
) {
    let msg = Message::new("761")
        .with_source(ctx.config.name.clone())
        .with_params(vec![cli.nickname(), target.to_string(), key.to_string(), "*".to_string()])
        .with_trailing_param(value);
    cli.dump_message(ctx, &msg, None);
}

pub fn register(buses: &mut Buses) {
    buses.rfc1459.register("METADATA", 2, false, m_metadata);
}

/// Keys are lowercase-folded words: letters, digits, `-`, `_`, `.`, `:`.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

fn m_metadata(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    let target_name = &msg.params[0];
    let subcommand = msg.params[1].to_ascii_uppercase();

    // Channel metadata stays with the channel layer; only client targets
    // resolve here. `*` is this client.
    if target_name.starts_with('#') || target_name.starts_with('&') {
        cli.dump_numeric(
            ctx,
            "765",
            vec![target_name.clone(), "invalid metadata target".to_string()],
        );
        return Ok(());
    }

    let target = if target_name == "*" {
        Some(Arc::clone(cli))
    } else {
        ctx.clients.get(target_name)
    };
    let Some(target) = target else {
        cli.dump_numeric(
            ctx,
            "765",
            vec![target_name.clone(), "invalid metadata target".to_string()],
        );
        return Ok(());
    };
    let target_disp = target.nickname();

    match subcommand.as_str() {
        "GET" => {
            if msg.params.len() < 3 {
                cli.dump_numeric(
                    ctx,
                    "461",
                    vec!["METADATA".to_string(), "Not enough parameters".to_string()],
                );
                return Ok(());
            }
            for key in &msg.params[2..] {
                let value = target.inner().metadata.get(key).cloned();
                match value {
                    Some(value) => keyvalue_reply(ctx, cli, &target_disp, key, &value),
                    None => cli.dump_numeric(
                        ctx,
                        "766",
                        vec![target_disp.clone(), key.clone(), "no matching key".to_string()],
                    ),
                }
            }
        }

        "LIST" => {
            let pairs: Vec<(String, String)> = target
                .inner()
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, value) in pairs {
                keyvalue_reply(ctx, cli, &target_disp, &key, &value);
            }
            cli.dump_numeric(ctx, "762", vec!["end of metadata".to_string()]);
        }

        "SET" => {
            let Some(key) = msg.params.get(2) else {
                cli.dump_numeric(
                    ctx,
                    "461",
                    vec!["METADATA".to_string(), "Not enough parameters".to_string()],
                );
                return Ok(());
            };

            if !cli.able_to_edit_metadata(ctx, &target) {
                cli.dump_numeric(
                    ctx,
                    "769",
                    vec![target_disp, key.clone(), "permission denied".to_string()],
                );
                return Ok(());
            }
            if !is_valid_key(key) {
                cli.dump_numeric(
                    ctx,
                    "767",
                    vec![key.clone(), "invalid metadata key".to_string()],
                );
                return Ok(());
            }

            match msg.params.get(3) {
                Some(value) => {
                    let limit = ctx.config.metadata.limit.unwrap_or(u32::MAX) as usize;
                    {
                        let mut inner = target.inner();
                        if !inner.metadata.contains_key(key) && inner.metadata.len() >= limit {
                            drop(inner);
                            cli.dump_numeric(
                                ctx,
                                "764",
                                vec![target_disp, "metadata limit reached".to_string()],
                            );
                            return Ok(());
                        }
                        inner.metadata.insert(key, value.clone());
                        if Arc::ptr_eq(cli, &target) {
                            inner.user_set_metadata.insert(key);
                        }
                    }
                    keyvalue_reply(ctx, cli, &target_disp, key, value);
                }
                None => {
                    let removed = {
                        let mut inner = target.inner();
                        inner.user_set_metadata.remove(key);
                        inner.metadata.remove(key)
                    };
                    match removed {
                        Some(_) => keyvalue_reply(ctx, cli, &target_disp, key, ""),
                        None => cli.dump_numeric(
                            ctx,
                            "768",
                            vec![target_disp, key.clone(), "key not set".to_string()],
                        ),
                    }
                }
            }
        }

        "CLEAR" => {
            if !cli.able_to_edit_metadata(ctx, &target) {
                cli.dump_numeric(
                    ctx,
                    "769",
                    vec![target_disp, "*".to_string(), "permission denied".to_string()],
                );
                return Ok(());
            }
            let keys: Vec<String> = {
                let mut inner = target.inner();
                let keys = inner.metadata.keys().cloned().collect();
                inner.metadata.clear();
                inner.user_set_metadata.clear();
                keys
            };
            for key in keys {
                keyvalue_reply(ctx, cli, &target_disp, &key, "");
            }
            cli.dump_numeric(ctx, "762", vec!["end of metadata".to_string()]);
        }

        other => {
            cli.dump_numeric(
                ctx,
                "765",
                vec![other.to_string(), "invalid metadata subcommand".to_string()],
            );
        }
    }

    Ok(())
}
