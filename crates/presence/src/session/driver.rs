// Async driver: runs a `PresenceSession` on a tokio task.
//
// Commands arrive over an mpsc channel; the loop sleeps until the next
// coalesced cursor deadline and forwards every queued awareness message to
// `outbound_tx` after each step.

use tandem_common::path::DocumentRange;
use tandem_common::tree::DocumentTree;
use tandem_common::types::{CursorView, LocalIdentity, PresenceView};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use yrs::sync::Message;

use super::PresenceSession;

const COMMAND_BUFFER: usize = 256;

pub enum SessionCommand<T> {
    Identity(LocalIdentity),
    Cursor { identity: LocalIdentity, selection: DocumentRange },
    Clear,
    Remote(Message),
    Document(T),
}

/// Handle for the session task. Dropping every handle closes the command
/// channel and stops the loop.
pub struct SessionHandle<T> {
    commands: mpsc::Sender<SessionCommand<T>>,
    active_users: watch::Receiver<Vec<PresenceView>>,
    remote_cursors: watch::Receiver<Vec<CursorView>>,
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl<T: Send + 'static> SessionHandle<T> {
    pub async fn publish_identity(&self, identity: LocalIdentity) -> bool {
        self.send(SessionCommand::Identity(identity)).await
    }

    pub async fn publish_cursor(&self, identity: LocalIdentity, selection: DocumentRange) -> bool {
        self.send(SessionCommand::Cursor { identity, selection }).await
    }

    pub async fn clear(&self) -> bool {
        self.send(SessionCommand::Clear).await
    }

    pub async fn deliver(&self, message: Message) -> bool {
        self.send(SessionCommand::Remote(message)).await
    }

    pub async fn replace_document(&self, document: T) -> bool {
        self.send(SessionCommand::Document(document)).await
    }

    /// Raw command sender, e.g. for a task relaying transport messages.
    pub fn commands(&self) -> mpsc::Sender<SessionCommand<T>> {
        self.commands.clone()
    }

    pub fn active_users(&self) -> watch::Receiver<Vec<PresenceView>> {
        self.active_users.clone()
    }

    pub fn remote_cursors(&self) -> watch::Receiver<Vec<CursorView>> {
        self.remote_cursors.clone()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "presence session task failed");
        }
    }

    async fn send(&self, command: SessionCommand<T>) -> bool {
        self.commands.send(command).await.is_ok()
    }
}

/// Spawn the session loop. Outbound awareness messages go to `outbound_tx`.
pub fn spawn_session<T>(
    session: PresenceSession<T>,
    outbound_tx: mpsc::Sender<Message>,
) -> SessionHandle<T>
where
    T: DocumentTree + Send + 'static,
{
    let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let active_users = session.subscribe_active_users();
    let remote_cursors = session.subscribe_remote_cursors();

    let task = tokio::spawn(run_session(session, command_rx, outbound_tx, shutdown_rx));

    SessionHandle { commands, active_users, remote_cursors, shutdown_tx, task }
}

async fn run_session<T: DocumentTree>(
    mut session: PresenceSession<T>,
    mut command_rx: mpsc::Receiver<SessionCommand<T>>,
    outbound_tx: mpsc::Sender<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(device_id = %session.registry().local_device_id(), "presence session started");

    loop {
        let deadline = session.next_deadline().map(Instant::from_std);

        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                info!("presence session shutting down");
                break;
            }

            maybe_command = command_rx.recv() => {
                match maybe_command {
                    Some(command) => apply(&mut session, command),
                    None => {
                        info!("session command channel closed, exiting");
                        break;
                    }
                }
            }

            _ = sleep_until(deadline) => {
                session.tick_at(Instant::now().into_std());
            }
        }

        for message in session.take_outbound() {
            if outbound_tx.send(message).await.is_err() {
                debug!("outbound receiver dropped, discarding awareness message");
            }
        }
    }
}

fn apply<T: DocumentTree>(session: &mut PresenceSession<T>, command: SessionCommand<T>) {
    match command {
        SessionCommand::Identity(identity) => {
            session.dispatch_identity(&identity);
        }
        SessionCommand::Cursor { identity, selection } => {
            session.dispatch_cursor_at(&identity, &selection, Instant::now().into_std());
        }
        SessionCommand::Clear => {
            session.clear_presence();
        }
        SessionCommand::Remote(message) => {
            if let Err(e) = session.handle_message(message) {
                warn!(error = %e, "failed to apply remote awareness message");
            }
        }
        SessionCommand::Document(document) => session.set_document(document),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
