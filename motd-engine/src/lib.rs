//! MOTD Engine - community message-of-the-day selection
//!
//! Members post candidates into a channel, the community scores them with
//! weighted reactions plus one exclusive favorite per voter, and once a day
//! the best candidate is republished under its author's name before every
//! candidate is cleared for the next round.
//!
//! # Architecture
//!
//! ```text
//!  platform events              schedule / admin
//!        │                             │
//!        ▼                             ▼
//! ┌──────────────┐             ┌───────────────┐
//! │  MotdEngine  │             │ CycleManager  │──► Publisher
//! └──────┬───────┘             └───────┬───────┘
//!        │  ┌──────────────────────────┘
//!        ▼  ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                 MotdState (one lock)                    │
//! │  ┌────────────────┐ ┌───────────────┐ ┌──────────────┐  │
//! │  │ CandidateStore │ │ ScoringEngine │ │  Favorites   │  │
//! │  │ (SQLite+files) │ │ (weights)     │ │  (one/voter) │  │
//! │  └────────────────┘ └───────────────┘ └──────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//!        │
//!        ▼
//!  ReactionControl (favorite revocation, reaction seeding)
//! ```

pub mod admin;
pub mod candidate;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod events;
pub mod favorites;
pub mod oplog;
pub mod platform;
pub mod schedule;
pub mod scoring;
pub mod selector;
pub mod store;
pub mod wire;

pub use admin::{AdminCommand, AdminConsole, AdminReply, ConfirmationGate};
pub use candidate::{AttachmentBlob, CandidateId, CandidateRecord, ChannelId, UserId};
pub use config::MotdConfig;
pub use cycle::{CycleError, CycleManager, CyclePhase, CycleReport, CycleTrigger};
pub use engine::{MotdEngine, MotdState, SharedState};
pub use events::{EventFilter, PlatformEvent};
pub use favorites::{FavoriteOutcome, FavoriteTracker, UnfavoriteOutcome};
pub use oplog::OperatorLog;
pub use platform::{PlatformError, PublishRequest, Publisher, ReactionControl};
pub use scoring::{ReactionSign, ScoringEngine};
pub use selector::{SelectError, Selection, WinnerSelector};
pub use store::{CandidateStore, SqliteCandidateStore, StoreError};
