//! Relaymail Storage - PostgreSQL persistence layer
//!
//! This crate provides the database pool, row models, and one repository
//! per table for the batch send pipeline.

pub mod db;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use models::*;
pub use repository::*;
