use std::collections::HashSet;
use std::time::Duration;

use clap::{Parser, Subcommand};
use parley::config::ConfigError;
use parley::net::types::{Message, MessageId, NewMessage, RoomId};
use parley::{ChatClient, ClientConfig, ClientError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing credentials; pass --username/--password or set CHAT_USERNAME/CHAT_PASSWORD")]
    MissingCredentials,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to wait for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "parley", about = "Chat client core from the command line")]
struct Cli {
    /// REST base URL; the channel URL is derived from it unless CHAT_WS_URL is set.
    #[arg(long, env = "CHAT_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "CHAT_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "CHAT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List rooms with unread counters.
    Rooms {
        /// Only rooms whose name contains this text.
        #[arg(long)]
        search: Option<String>,
    },
    /// Print a room's recent history, then follow new messages until ctrl-c.
    Tail {
        #[arg(long)]
        room: RoomId,
    },
    /// Send a text message to a room.
    Send {
        #[arg(long)]
        room: RoomId,
        #[arg(long)]
        reply_to: Option<MessageId>,
        text: String,
    },
    /// Check whether a username is still available.
    CheckUsername { username: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let api_url = cli.api_url.clone();
    let config = ClientConfig::from_lookup(|key| match key {
        "CHAT_API_URL" => api_url.clone(),
        _ => std::env::var(key).ok(),
    })?;
    let client = ChatClient::from_config(&config)?;

    match cli.command {
        Command::CheckUsername { ref username } => run_check_username(&client, username).await,
        Command::Rooms { ref search } => {
            sign_in(&client, &cli).await?;
            run_rooms(&client, search.as_deref()).await
        }
        Command::Tail { room } => {
            sign_in(&client, &cli).await?;
            let result = run_tail(&client, room).await;
            client.logout().await;
            result
        }
        Command::Send { room, reply_to, ref text } => {
            sign_in(&client, &cli).await?;
            let result = run_send(&client, room, reply_to, text, config.connect_timeout).await;
            client.logout().await;
            result
        }
    }
}

async fn sign_in(client: &ChatClient, cli: &Cli) -> Result<(), CliError> {
    let (Some(username), Some(password)) = (cli.username.as_deref(), cli.password.as_deref()) else {
        return Err(CliError::MissingCredentials);
    };
    client.login(username, password).await?;
    Ok(())
}

async fn run_check_username(client: &ChatClient, username: &str) -> Result<(), CliError> {
    let available = client.check_username(username).await?;
    println!("{username}: {}", if available { "available" } else { "taken" });
    Ok(())
}

async fn run_rooms(client: &ChatClient, search: Option<&str>) -> Result<(), CliError> {
    client.refresh_rooms().await?;
    if let Some(search) = search {
        client.set_search(search);
    }
    let session = client.snapshot();
    for room in session.visible_rooms() {
        println!("{}\t{}\t{} unread", room.id, room.display_name(), room.unread_count);
    }
    println!("total unread: {}", session.total_unread());
    Ok(())
}

async fn run_tail(client: &ChatClient, room_id: RoomId) -> Result<(), CliError> {
    client.refresh_rooms().await?;
    client.select_room(room_id).await?;

    let mut printed = HashSet::new();
    let mut rx = client.store().subscribe();
    let mut last_banner = None;
    loop {
        {
            let session = rx.borrow_and_update();
            for message in &session.messages {
                if printed.insert(message.id) {
                    print_message(message)?;
                }
            }
            let banner = session.connection_status.banner();
            if banner != last_banner {
                if let Some(banner) = banner {
                    eprintln!("[{banner}]");
                }
                last_banner = banner;
            }
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                return Ok(());
            }
        }
    }
}

async fn run_send(
    client: &ChatClient,
    room_id: RoomId,
    reply_to: Option<MessageId>,
    text: &str,
    connect_timeout: Duration,
) -> Result<(), CliError> {
    client.refresh_rooms().await?;
    client.select_room(room_id).await?;
    client.wait_connected(connect_timeout).await?;
    let message = NewMessage { reply_to, ..NewMessage::text(text) };
    let sent = client.send_message(&message).await?;
    print_message(&sent)
}

fn print_message(message: &Message) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(message)?);
    Ok(())
}
