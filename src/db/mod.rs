//! Persistence for targets, probe history, maintenance windows and the
//! notification ledger.
//!
//! Every component talks to storage through the [`MonitorStore`] trait.
//! [`SeaOrmStore`] backs it with a relational database, [`InMemoryStore`]
//! keeps everything in process memory.

pub mod entities;
pub mod enums;
pub mod memory;
pub mod retention;
pub mod services;
pub mod store;

pub use memory::InMemoryStore;
pub use services::SeaOrmStore;
pub use store::{MonitorStore, NewMaintenanceWindow, NewNotificationAttempt, NewTarget};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
