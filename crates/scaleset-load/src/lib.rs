//! scaleset-load — session-based load tracking.
//!
//! Every known instance carries a set of bound sessions (its load) and an
//! accepting flag. Admission packs sessions onto the fullest accepting
//! instance that still has room, so that idle instances stay idle and can
//! be retired by the reconciler.
//!
//! # Architecture
//!
//! ```text
//! LoadTracker
//!   ├── instances: instance_id → { sessions, accepting }
//!   └── sessions:  session_id  → instance_id
//! ```
//!
//! Both maps sit behind one lock, so a reconciliation pass sampling load
//! never observes a session counted on one side but not the other.

pub mod error;
pub mod source;
pub mod tracker;

pub use error::{LoadError, LoadResult};
pub use source::LoadSource;
pub use tracker::LoadTracker;
