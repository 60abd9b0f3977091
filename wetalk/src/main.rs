//! `WeTalk`: ephemeral encrypted group chat in the terminal.
//!
//! Joins a room on a public MQTT broker and reads chat lines from stdin.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/wetalk/config.toml`).
//!
//! ```bash
//! cargo run --bin wetalk -- --nickname alice --room-key my-secret-room
//!
//! # Join from a share link
//! cargo run --bin wetalk -- --nickname bob \
//!     --room-link 'https://wetalk.example/?room=my-secret-room'
//! ```
//!
//! Commands: `/image <url>` sends an image reference, `/who` lists who is
//! online, `/quit` leaves the room.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use clap::Parser;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use wetalk::avatar;
use wetalk::chat::{Direction, Session, SessionEvent};
use wetalk::config::{CliArgs, ClientConfig};
use wetalk::net::{self, SessionCommand};
use wetalk::transport::mqtt::MqttTransport;
use wetalk_proto::message::Timestamp;
use wetalk_proto::presence::Participant;

/// Time given to the broker client to flush the `leave` publish.
const LEAVE_GRACE: Duration = Duration::from_millis(300);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file so stdout stays free for chat output.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("wetalk starting");

    let mut request = match config.join_request(&config.avatar.placeholder) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e} (use --nickname and --room-key)");
            return ExitCode::FAILURE;
        }
    };
    request.local.avatar = avatar::fetch_random_avatar(&config.avatar).await;

    let transport = match MqttTransport::connect(&config.broker, &request.room, &request.local.nickname)
    {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "-- joining as {} via {}:{}",
        request.local.nickname, config.broker.host, config.broker.port
    );
    let (session, events) = Session::new(Arc::new(transport), request, &config.session);
    let (cmd_tx, session_task) = net::spawn_session(session, net::DEFAULT_COMMAND_CAPACITY);

    let online = Arc::new(Mutex::new(Vec::new()));
    let printer = tokio::spawn(print_events(events, Arc::clone(&online)));

    read_input(&cmd_tx, &online).await;

    if cmd_tx.send(SessionCommand::Leave).await.is_err() {
        tracing::debug!("session task already stopped");
    }
    drop(cmd_tx);
    if let Err(e) = session_task.await {
        tracing::error!(error = %e, "session task failed");
    }
    tokio::time::sleep(LEAVE_GRACE).await;
    printer.abort();

    tracing::info!("wetalk exiting");
    ExitCode::SUCCESS
}

/// Initialize file-based logging.
///
/// Returns `None` (logging disabled) if the log path is unusable.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("wetalk.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Reads stdin lines until `/quit`, end of input or Ctrl-C.
async fn read_input(cmd_tx: &mpsc::Sender<SessionCommand>, online: &Mutex<Vec<Participant>>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        let command = match line.trim() {
            "" => continue,
            "/quit" => break,
            "/who" => {
                print_online(&online.lock());
                continue;
            }
            other => match other.strip_prefix("/image ") {
                Some(url) => SessionCommand::SendImage(url.to_string()),
                None => SessionCommand::SendText(other.to_string()),
            },
        };
        if cmd_tx.send(command).await.is_err() {
            break;
        }
    }
}

/// Renders session events to stdout.
async fn print_events(
    mut events: mpsc::Receiver<SessionEvent>,
    online: Arc<Mutex<Vec<Participant>>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::SystemNotice(notice) => println!("-- {notice}"),
            SessionEvent::MessageReceived {
                nickname,
                text,
                direction,
                timestamp,
                ..
            } => println!(
                "[{}] {}{nickname}: {text}",
                clock(timestamp),
                marker(direction)
            ),
            SessionEvent::ImageReceived {
                nickname,
                url,
                direction,
                timestamp,
                ..
            } => println!(
                "[{}] {}{nickname} shared an image: {url}",
                clock(timestamp),
                marker(direction)
            ),
            SessionEvent::PresenceChanged(participants) => *online.lock() = participants,
            SessionEvent::TypingChanged(summary) => {
                if !summary.is_empty() {
                    println!("-- {summary}");
                }
            }
        }
    }
}

fn print_online(participants: &[Participant]) {
    let names: Vec<&str> = participants.iter().map(|p| p.nickname.as_str()).collect();
    println!("-- online ({}): {}", names.len(), names.join(", "));
}

const fn marker(direction: Direction) -> &'static str {
    match direction {
        Direction::Sent => "> ",
        Direction::Received => "",
    }
}

/// Formats a sender timestamp as local `HH:MM`.
fn clock(timestamp: Timestamp) -> String {
    let local = i64::try_from(timestamp.as_millis())
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(Local::now, |utc| utc.with_timezone(&Local));
    local.format("%H:%M").to_string()
}
