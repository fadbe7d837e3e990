//! Core data models for the record service.
//!
//! `Record` maps to the `images` table on every backend via `sqlx::FromRow`.
//! `Sourced` carries the descriptor of the physical endpoint that served an
//! operation alongside its value.

pub mod record;
pub mod source;

pub use record::{Record, RecordPage, RecordView, object_url};
pub use source::{ConnectionTarget, Endpoint, Role, Sourced};
