//! # Shelfmark Core
//!
//! Runtime-agnostic logic for Shelfmark: corpus-constrained category and
//! tag prediction, product edit validation, and the validate-then-commit
//! gate.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.
//! External collaborators are reached through traits:
//!
//! - [`store::CorpusStore`], [`store::CategoryDirectory`] and
//!   [`store::AuditStore`] for persistence,
//! - [`generation::ChatBackend`] for the language model,
//! - [`catalog::CatalogClient`] for the external product catalog.
//!
//! The application crate provides SQLite and HTTP implementations;
//! [`store::memory::InMemoryStore`] backs the tests here.

pub mod catalog;
pub mod error;
pub mod generation;
pub mod mapping;
pub mod models;
pub mod normalize;
pub mod payload;
pub mod predict;
pub mod rerank;
pub mod store;
pub mod sync;
pub mod validation;

pub use error::{ShelfError, ShelfResult};
