//! Storage module for persistent data storage
//!
//! Provides the repository interface and its SQLite implementation.

mod database;
mod repository;

pub use database::PaperDb;
pub use repository::DocumentRepository;
