//! Challenge records for timed group activities.
//!
//! Every completed run gets a unique id and is kept in an in-memory index;
//! the fastest run is tracked per activity, per guild and per participant.
//! [`ChallengeManager`] ties the index, the best-time tracker and a
//! [`RecordStore`] together.

pub mod model;
pub mod error;
pub mod config;
pub mod id;
pub mod index;
pub mod tracker;
pub mod policy;
pub mod storage;
pub mod manager;
pub mod parser;

pub use config::ChallengeConfig;
pub use error::{ChallengeError, StoreError};
pub use manager::{ChallengeManager, Completion, LoadReport, Stats};
pub use model::{Medal, Participant, Record, Roster};
pub use storage::{MemoryStore, RecordStore, SegmentStore};
