use anyhow::{bail, Result};
use clap::Parser;
use client_core::{load_settings, ChatSession, SessionEvent};
use shared::domain::{ChatEntry, Origin};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Cable endpoint, e.g. ws://127.0.0.1:3000/cable
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    username: String,
    #[arg(long)]
    origin: Option<String>,
    #[arg(long)]
    no_reconnect: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings()?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if args.origin.is_some() {
        settings.origin = args.origin;
    }
    if args.no_reconnect {
        settings.reconnect.enabled = false;
    }

    let session = ChatSession::websocket(&settings)?;
    if !session.set_username(&args.username) {
        bail!("username must be longer than 3 characters");
    }
    println!("connecting to {} as {}", settings.server_url, session.current_username());
    session.connect();

    tokio::spawn(print_log(session.clone()));
    tokio::spawn(print_events(session.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Err(err) = session.send_message(&line) {
            warn!(%err, "message not sent");
        }
    }

    session.close();
    session.closed().await;
    Ok(())
}

async fn print_log(session: ChatSession) {
    let mut messages = session.messages();
    let mut printed = 0;
    loop {
        let fresh: Vec<ChatEntry> = messages
            .borrow_and_update()
            .iter()
            .skip(printed)
            .cloned()
            .collect();
        for entry in &fresh {
            print_entry(entry);
        }
        printed += fresh.len();
        if messages.changed().await.is_err() {
            break;
        }
    }
}

fn print_entry(entry: &ChatEntry) {
    if entry.show_sender_header {
        let who = match entry.origin {
            Origin::Local => "you",
            Origin::Remote => entry.sender.as_str(),
        };
        println!("[{}] {who}:", entry.received_at.format("%H:%M:%S"));
    }
    println!("    {}", entry.content);
}

async fn print_events(session: ChatSession) {
    let mut events = session.subscribe_events();
    loop {
        match events.recv().await {
            Ok(SessionEvent::Subscribed { channel }) => println!("* joined {channel}"),
            Ok(SessionEvent::SubscriptionRejected { channel }) => {
                println!("* {channel} rejected the subscription")
            }
            Ok(SessionEvent::Disconnected { reason }) => println!("* disconnected: {reason}"),
            Ok(SessionEvent::Reconnecting { attempt, delay }) => {
                println!("* reconnecting in {delay:?} (attempt {attempt})")
            }
            Ok(SessionEvent::Closed) | Err(RecvError::Closed) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(_)) => {}
        }
    }
}
