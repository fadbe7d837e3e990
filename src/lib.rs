//! # record-store
//!
//! A small record service (name + image) built to run redundantly behind a
//! load balancer. The interesting part is the data-access layer:
//!
//! - two interchangeable relational backends: an embedded SQLite file, or a
//!   MySQL primary/replica pair with separate write and read pools;
//! - read/write splitting where reads try the replica first and fall back to
//!   the primary once;
//! - deletes that remove the blob from the object store before the row, so a
//!   partial failure never leaves an unreferenced blob.
//!
//! Every result carries a descriptor of the endpoint that served it, which
//! the HTTP layer echoes back for load-balancing and failover checks.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use config::AppConfig;
pub use errors::AppError;
pub use routes::routes::routes;
pub use services::record_service::{NewUpload, RecordService, ServiceError};
pub use state::AppState;
