pub mod backend;
pub mod object_store;
pub mod record_service;
