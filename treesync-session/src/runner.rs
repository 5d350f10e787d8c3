//! Drives a session from a pair of byte channels.
//!
//! The loop owns the inbound receiver, so frames are handled one at a time in
//! arrival order. The first frame out is always the bootstrap flush.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::protocol::Frame;
use crate::session::{SessionError, UiSession};

/// Channel ends for talking to a spawned session.
pub struct SessionHandle {
    pub session: Arc<UiSession>,
    /// Encoded frames from the renderer.
    pub inbound: mpsc::Sender<Vec<u8>>,
    /// Encoded frames for the renderer.
    pub outbound: mpsc::Receiver<Vec<u8>>,
    pub task: JoinHandle<Result<(), SessionError>>,
}

/// Spawn [`run_session`] on channels sized by the session's config.
pub fn spawn_session(session: Arc<UiSession>) -> SessionHandle {
    let capacity = session.config().channel_capacity;
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let task = tokio::spawn(run_session(Arc::clone(&session), in_rx, out_tx));
    SessionHandle {
        session,
        inbound: in_tx,
        outbound: out_rx,
        task,
    }
}

/// Process inbound frames until the channel closes or the session fails.
///
/// On failure a `Failure` frame is sent before returning the error.
pub async fn run_session(
    session: Arc<UiSession>,
    mut inbound: mpsc::Receiver<Vec<u8>>,
    outbound: mpsc::Sender<Vec<u8>>,
) -> Result<(), SessionError> {
    let id = session.id();
    log::info!("session {id} started");

    let bootstrap = session.flush().await?;
    send(&outbound, id, &bootstrap).await?;

    while let Some(bytes) = inbound.recv().await {
        let result = match Frame::decode(&bytes) {
            Ok(frame) => session.handle_frame(frame).await,
            Err(e) => {
                session.terminate().await;
                Err(e.into())
            }
        };

        match result {
            Ok(Some(reply)) => {
                if let Err(e) = send(&outbound, id, &reply).await {
                    session.terminate().await;
                    return Err(e);
                }
            }
            Ok(None) => {}
            Err(e) => {
                if !session.is_failed().await {
                    log::debug!("session {id}: dropped frame: {e}");
                    continue;
                }
                log::warn!("session {id} stopped: {e}");
                let failure = Frame::failure(id, 0, &e.to_string());
                // The renderer may already be gone.
                let _ = send(&outbound, id, &failure).await;
                return Err(e);
            }
        }
    }

    session.terminate().await;
    log::info!("session {id} closed");
    Ok(())
}

async fn send(
    outbound: &mpsc::Sender<Vec<u8>>,
    id: Uuid,
    frame: &Frame,
) -> Result<(), SessionError> {
    let bytes = frame.encode()?;
    outbound
        .send(bytes)
        .await
        .map_err(|_| SessionError::ChannelClosed(id))
}
