//! A single UI session: one tree, its collector and applier, one lock.
//!
//! Every operation on a session takes the same async mutex, so frames from
//! the renderer and application-side mutations are serialized without the
//! tree itself being shared.

use thiserror::Error;
use tokio::sync::Mutex;
use treesync_core::{
    ApplierConfig, ApplyOutcome, ChangeCollector, ClientUpdateApplier, ProtocolError, StateTree,
};
use uuid::Uuid;

use crate::protocol::{CodecError, Frame, FrameType};

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub applier: ApplierConfig,
    /// Client batches larger than this fail the session.
    pub max_updates_per_batch: usize,
    /// Buffer size of the inbound and outbound channels (see [`crate::spawn_session`]).
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            applier: ApplierConfig::default(),
            max_updates_per_batch: 1024,
            channel_capacity: 64,
        }
    }
}

/// Counters for monitoring a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub duplicate_batches: u64,
    pub updates_applied: u64,
    /// Stale or rejected updates.
    pub updates_dropped: u64,
    pub records_sent: u64,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("session {0} has been terminated")]
    Terminated(Uuid),

    #[error("session {0} not found")]
    NotFound(Uuid),

    #[error("frame for session {received} delivered to session {expected}")]
    WrongSession { expected: Uuid, received: Uuid },

    #[error("session {0} lost its outbound channel")]
    ChannelClosed(Uuid),
}

struct SessionState {
    tree: StateTree,
    collector: ChangeCollector,
    applier: ClientUpdateApplier,
    next_client_seq: u64,
    next_server_seq: u64,
    failed: bool,
    stats: SessionStats,
}

impl SessionState {
    fn flush(&mut self, session_id: Uuid) -> Result<Frame, CodecError> {
        let records = self.collector.flush(&mut self.tree);
        let frame = Frame::changes(session_id, self.next_server_seq, &records)?;
        self.next_server_seq += 1;
        self.stats.frames_sent += 1;
        self.stats.records_sent += records.len() as u64;
        Ok(frame)
    }
}

/// Server half of one renderer connection.
pub struct UiSession {
    id: Uuid,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

impl UiSession {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_id(Uuid::new_v4(), config)
    }

    pub fn with_id(id: Uuid, config: SessionConfig) -> Self {
        let state = SessionState {
            tree: StateTree::new(),
            collector: ChangeCollector::new(),
            applier: ClientUpdateApplier::new(config.applier.clone()),
            next_client_seq: 1,
            next_server_seq: 1,
            failed: false,
            stats: SessionStats::default(),
        };
        log::info!("session {id} created");
        Self {
            id,
            config,
            state: Mutex::new(state),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run `f` against the session's tree.
    ///
    /// Changes it makes go out with the next flush.
    pub async fn with_tree<R>(&self, f: impl FnOnce(&mut StateTree) -> R) -> Result<R, SessionError> {
        let mut state = self.state.lock().await;
        if state.failed {
            return Err(SessionError::Terminated(self.id));
        }
        Ok(f(&mut state.tree))
    }

    /// Collect pending changes into a `Changes` frame. The frame may carry
    /// no records.
    pub async fn flush(&self) -> Result<Frame, SessionError> {
        let mut state = self.state.lock().await;
        if state.failed {
            return Err(SessionError::Terminated(self.id));
        }
        Ok(state.flush(self.id)?)
    }

    /// Process one inbound frame, returning the reply if there is one.
    ///
    /// A `ClientSync` frame is answered with the `Changes` produced by
    /// applying it, including changes made by listeners that reacted. A
    /// batch whose sequence was already processed is ignored. Malformed
    /// input fails the session; every later call returns
    /// [`SessionError::Terminated`].
    pub async fn handle_frame(&self, frame: Frame) -> Result<Option<Frame>, SessionError> {
        let mut state = self.state.lock().await;
        if state.failed {
            return Err(SessionError::Terminated(self.id));
        }
        if frame.session_id != self.id {
            return Err(SessionError::WrongSession {
                expected: self.id,
                received: frame.session_id,
            });
        }
        state.stats.frames_received += 1;

        let result = match frame.frame_type {
            FrameType::Ping => {
                state.stats.frames_sent += 1;
                Ok(Some(Frame::pong(self.id)))
            }
            FrameType::Pong => Ok(None),
            FrameType::ClientSync => self.client_sync(&mut state, &frame),
            other => Err(SessionError::Codec(CodecError::UnexpectedFrame {
                expected: FrameType::ClientSync,
                found: other,
            })),
        };

        if let Err(e) = &result {
            log::warn!("session {} failed: {e}", self.id);
            state.failed = true;
        }
        result
    }

    fn client_sync(&self, state: &mut SessionState, frame: &Frame) -> Result<Option<Frame>, SessionError> {
        let expected = state.next_client_seq;
        if frame.sequence < expected {
            log::debug!(
                "session {}: ignoring duplicate client batch {} (next is {expected})",
                self.id,
                frame.sequence
            );
            state.stats.duplicate_batches += 1;
            return Ok(None);
        }
        if frame.sequence > expected {
            return Err(ProtocolError::OutOfOrder {
                expected,
                received: frame.sequence,
            }
            .into());
        }

        let batch = frame.client_batch()?;
        let limit = self.config.max_updates_per_batch;
        if batch.updates.len() > limit {
            return Err(ProtocolError::BatchTooLarge {
                count: batch.updates.len(),
                limit,
            }
            .into());
        }

        let outcomes = state.applier.apply_batch(&mut state.tree, batch.updates)?;
        state.next_client_seq += 1;
        for outcome in outcomes {
            match outcome {
                ApplyOutcome::Applied => state.stats.updates_applied += 1,
                ApplyOutcome::Unchanged => {}
                ApplyOutcome::Stale | ApplyOutcome::Rejected => state.stats.updates_dropped += 1,
            }
        }

        Ok(Some(state.flush(self.id)?))
    }

    /// Mark the session failed. Used when its connection breaks.
    pub async fn terminate(&self) {
        let mut state = self.state.lock().await;
        if !state.failed {
            log::info!("session {} terminated", self.id);
            state.failed = true;
        }
    }

    pub async fn is_failed(&self) -> bool {
        self.state.lock().await.failed
    }

    pub async fn stats(&self) -> SessionStats {
        self.state.lock().await.stats.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
