//! # treesync-session: Per-connection sync sessions over async channels
//!
//! Wraps a `treesync-core` tree in a session that exchanges binary frames
//! with one renderer. Sessions are isolated: a protocol error terminates the
//! offending session only.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  ClientSync   ┌──────────────────────────┐
//! │ renderer    ├──────────────►│ run_session (tokio task) │
//! │             │◄──────────────┤  ordered inbound loop    │
//! └─────────────┘   Changes     └────────────┬─────────────┘
//!                                            │
//!                                            ▼
//!                                ┌──────────────────────────┐
//!                                │ UiSession (one Mutex)    │
//!                                │  StateTree               │
//!                                │  ChangeCollector         │
//!                                │  ClientUpdateApplier     │
//!                                └────────────┬─────────────┘
//!                                             │
//!                                    ┌────────┴────────┐
//!                                    │ SessionRegistry │
//!                                    │ (id → session)  │
//!                                    └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Binary frames (bincode envelope, JSON payload)
//! - [`session`]: `UiSession`, config, stats, errors
//! - [`registry`]: Session lookup and failure isolation
//! - [`runner`]: Channel-driven session loop

pub mod protocol;
pub mod registry;
pub mod runner;
pub mod session;

pub use protocol::{ClientBatch, CodecError, Frame, FrameType};
pub use registry::SessionRegistry;
pub use runner::{run_session, spawn_session, SessionHandle};
pub use session::{SessionConfig, SessionError, SessionStats, UiSession};
