//! Interactive notification feed.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use gigboard_core::{EventEnvelope, Notification, StoreEvent};
use gigboard_notify::NotificationStore;

use crate::runtime::Runtime;

const HELP: &str = "commands: list | more | read <id> | read-all | delete <id> | \
sound on|off | logout | help | quit";

pub fn format_notification(n: &Notification) -> String {
    format!(
        "{} {} [{}] {}: {}",
        if n.is_read { " " } else { "*" },
        n.id,
        n.kind.label(),
        n.title,
        n.message
    )
}

pub async fn run(rt: &Runtime, limit: u32) -> anyhow::Result<()> {
    let identity = rt.identity().await.context("access token rejected")?;
    info!(user_id = %identity.user_id, "Watching notifications");

    let store = rt.notification_store();
    let manager = rt.channel_manager(store.clone());
    let mut events = store.subscribe();

    store.fetch_initial(limit).await;
    store.sync_unread_count().await;
    print_list(&store).await;
    manager.set_identity(Some(identity)).await;
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(envelope) => print_event(&envelope),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    if !handle_command(&store, &manager, rt, line.trim()).await? {
                        break;
                    }
                }
                None => stdin_open = false,
            },
        }
    }

    manager.shutdown().await;
    info!("Stopped watching notifications");
    Ok(())
}

/// Returns false when the loop should exit.
async fn handle_command(
    store: &NotificationStore,
    manager: &gigboard_notify::ChannelManager,
    rt: &Runtime,
    line: &str,
) -> anyhow::Result<bool> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (None, _) => {}
        (Some("list"), _) => print_list(store).await,
        (Some("more"), _) => {
            store.load_more().await;
            print_list(store).await;
        }
        (Some("read"), Some(id)) => store.mark_read(id).await,
        (Some("read-all"), _) => store.mark_all_read().await,
        (Some("delete"), Some(id)) => store.delete(id).await,
        (Some("sound"), Some(state @ ("on" | "off"))) => {
            rt.sound.set_enabled(state == "on")?;
            println!("sound {}", state);
        }
        (Some("logout"), _) => {
            manager.set_identity(None).await;
            println!("logged out");
            return Ok(false);
        }
        (Some("quit" | "exit"), _) => return Ok(false),
        _ => println!("{}", HELP),
    }
    Ok(true)
}

async fn print_list(store: &NotificationStore) {
    let state = store.snapshot().await;
    for n in &state.notifications {
        println!("{}", format_notification(n));
    }
    println!(
        "{} unread, {} loaded{}",
        state.unread_count,
        state.notifications.len(),
        if state.has_more { ", more available" } else { "" }
    );
}

fn print_event(envelope: &EventEnvelope) {
    match &envelope.payload {
        StoreEvent::NotificationReceived { kind, title, .. } => {
            println!("new {}: {}", kind.label(), title);
        }
        StoreEvent::UnreadCountChanged { count } => println!("unread: {}", count),
        StoreEvent::ConnectionChanged { connected } => {
            println!("{}", if *connected { "live" } else { "offline" });
        }
        StoreEvent::ActionFailed {
            action,
            error,
            rolled_back,
        } => {
            println!(
                "{} failed: {}{}",
                action,
                error,
                if *rolled_back { " (reverted)" } else { "" }
            );
        }
        _ => {}
    }
}
