//! Session driver wiring the front end to the transport.
//!
//! A single task owns the [`Session`] and multiplexes three sources with
//! `tokio::select!`:
//!
//! ```text
//! transport events ──┐
//! SessionCommand   ──┼──> Session ──> SessionEvent ──> front end
//! typing deadline  ──┘
//! ```
//!
//! Because only this task touches the session, the presence registry,
//! dedup record and typing state need no locking.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::chat::Session;
use crate::transport::Transport;

/// Default capacity of the command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Commands sent from the front end to the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Send a text message.
    SendText(String),
    /// Send an image reference.
    SendImage(String),
    /// The local input changed (a keystroke or a typed line).
    Input,
    /// Leave the room and stop the task.
    Leave,
}

/// Drives `session` until it leaves or the transport shuts down.
///
/// Dropping every command sender counts as a teardown and leaves the room
/// best-effort. Returns the session so callers can inspect its final state.
pub async fn run_session<T: Transport>(
    mut session: Session<T>,
    mut commands: mpsc::Receiver<SessionCommand>,
) -> Session<T> {
    let transport = session.transport();
    loop {
        let deadline = session.typing_deadline();
        tokio::select! {
            event = transport.next_event() => {
                let Some(event) = event else {
                    tracing::info!("transport closed, session task exiting");
                    break;
                };
                session.handle_transport_event(event);
            }
            command = commands.recv() => match command {
                Some(SessionCommand::Leave) => {
                    session.leave();
                    break;
                }
                Some(command) => apply_command(&mut session, command),
                None => {
                    tracing::info!("front end gone, leaving room");
                    session.leave();
                    break;
                }
            },
            () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                session.poll_typing(Instant::now());
            }
        }
    }
    session
}

fn apply_command<T: Transport>(session: &mut Session<T>, command: SessionCommand) {
    let result = match command {
        SessionCommand::SendText(text) => session.send_text(&text).map(drop),
        SessionCommand::SendImage(url) => session.send_image(&url).map(drop),
        SessionCommand::Input => session.on_local_input(Instant::now()),
        SessionCommand::Leave => Ok(()),
    };
    if let Err(e) = result {
        session.report_command_failure(&e);
    }
}

/// Spawns [`run_session`] on the current runtime.
///
/// Returns the command sender and the handle of the session task.
pub fn spawn_session<T: Transport + 'static>(
    session: Session<T>,
    command_capacity: usize,
) -> (mpsc::Sender<SessionCommand>, JoinHandle<Session<T>>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(command_capacity.max(1));
    let handle = tokio::spawn(run_session(session, cmd_rx));
    (cmd_tx, handle)
}
