//! MONITOR: nickname online/offline notification lists.
//!
//! Reference: <https://ircv3.net/specs/extensions/monitor>
//!
//! Only the list management and status queries live here; online/offline
//! pushes on registration and disconnect are driven by the core-bus hooks
//! below.

use std::sync::Arc;

use coracle_proto::Message;

use crate::error::HandlerResult;
use crate::events::{Buses, CoreEvent};
use crate::state::{ServerContext, Session};

pub fn register(buses: &mut Buses) {
    buses.rfc1459.register("MONITOR", 1, false, m_monitor);
    buses.core.register("client registered", m_monitor_online);
    buses.core.register("client quit", m_monitor_offline);
}

fn m_monitor(ctx: &Arc<ServerContext>, cli: &Arc<Session>, msg: &Message) -> HandlerResult {
    let subcommand = msg.params[0].to_ascii_uppercase();

    match subcommand.as_str() {
        "+" => {
            let Some(targets) = msg.params.get(1) else {
                cli.dump_numeric(
                    ctx,
                    "461",
                    vec!["MONITOR".to_string(), "Not enough parameters".to_string()],
                );
                return Ok(());
            };

            let limit = ctx.config.monitor.limit.unwrap_or(u32::MAX) as usize;
            for target in targets.split(',').filter(|t| !t.is_empty()) {
                if cli.inner().monitoring.len() >= limit {
                    cli.dump_numeric(
                        ctx,
                        "734",
                        vec![
                            limit.to_string(),
                            target.to_string(),
                            "Monitor list is full".to_string(),
                        ],
                    );
                    break;
                }
                cli.inner().monitoring.insert(target);
                send_status(ctx, cli, target);
            }
        }

        "-" => {
            let Some(targets) = msg.params.get(1) else {
                return Ok(());
            };
            for target in targets.split(',').filter(|t| !t.is_empty()) {
                cli.inner().monitoring.remove(target);
            }
        }

        "C" => {
            cli.inner().monitoring.clear();
        }

        "L" => {
            let monitored: Vec<String> = cli.inner().monitoring.iter().cloned().collect();
            if !monitored.is_empty() {
                target_list_reply(ctx, cli, "732", &monitored.join(","));
            }
            cli.dump_numeric(ctx, "733", vec!["End of MONITOR list".to_string()]);
        }

        "S" => {
            let monitored: Vec<String> = cli.inner().monitoring.iter().cloned().collect();
            for target in monitored {
                send_status(ctx, cli, &target);
            }
        }

        _ => {}
    }

    Ok(())
}

/// 730 (online, with hostmask) or 731 (offline) for one target.
fn send_status(ctx: &Arc<ServerContext>, cli: &Arc<Session>, target: &str) {
    match ctx.clients.get(target).and_then(|t| t.hostmask()) {
        Some(hostmask) => target_list_reply(ctx, cli, "730", &hostmask),
        None => target_list_reply(ctx, cli, "731", target),
    }
}

/// MONITOR numerics carry their target list as a trailing parameter.
fn target_list_reply(ctx: &Arc<ServerContext>, cli: &Arc<Session>, numeric: &str, targets: &str) {
    let msg = Message::new(numeric)
        .with_source(ctx.config.name.clone())
        .with_param(cli.nickname())
        .with_trailing_param(targets);
    cli.dump_message(ctx, &msg, None);
}

/// Tell everyone watching this nickname that it came online.
fn m_monitor_online(ctx: &Arc<ServerContext>, ev: &mut CoreEvent) -> HandlerResult {
    let CoreEvent::Client { client } = ev else {
        return Ok(());
    };
    let nickname = client.nickname();
    let Some(hostmask) = client.hostmask() else {
        return Ok(());
    };

    for watcher in ctx.clients.snapshot() {
        if watcher.inner().monitoring.contains(&nickname) {
            target_list_reply(ctx, &watcher, "730", &hostmask);
        }
    }
    Ok(())
}

/// Tell everyone watching this nickname that it went offline.
fn m_monitor_offline(ctx: &Arc<ServerContext>, ev: &mut CoreEvent) -> HandlerResult {
    let CoreEvent::ClientQuit { client, .. } = ev else {
        return Ok(());
    };
    if !client.is_registered() {
        return Ok(());
    }
    let nickname = client.nickname();

    for watcher in ctx.clients.snapshot() {
        if Arc::ptr_eq(&watcher, client) {
            continue;
        }
        if watcher.inner().monitoring.contains(&nickname) {
            target_list_reply(ctx, &watcher, "731", &nickname);
        }
    }
    Ok(())
}
