//! # Shelfmark
//!
//! Category and tag prediction for a second-hand book catalog.
//!
//! Shelfmark learns a category to tag mapping from a reference corpus of
//! already categorized books and predicts a taxonomy path plus a ranked tag
//! list for new titles. Prediction runs in three tiers: an exact corpus
//! match, a rule tier over the mapping, and an optional LLM tier whose
//! output is constrained to the corpus vocabulary. Edits pushed to the
//! external catalog pass a validation gate first, and every attempt lands
//! in an append-only audit log.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────┐
//! │  Corpus    │──▶│ Mapping cache │──▶│ Predictor  │◀── constrained LLM
//! │  (SQLite)  │   │ category→tags │   │ EXACT/RULE │
//! └────────────┘   └──────────────┘   └─────┬──────┘
//!                                           │
//!           ┌───────────────┬───────────────┤
//!           ▼               ▼               ▼
//!      ┌──────────┐   ┌───────────┐   ┌──────────┐
//!      │   CLI    │   │ Validator │──▶│ Sync gate│──▶ catalog + audit log
//!      │ (shelf)  │   └───────────┘   └──────────┘
//!      └──────────┘
//! ```
//!
//! The algorithms live in the `shelfmark-core` crate behind storage and
//! backend traits. This crate supplies the SQLite store, the HTTP clients,
//! configuration, the CLI and the HTTP server.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core store traits |
//! | [`seed`] | Corpus and category directory loading |
//! | [`llm`] | Chat-completions LLM backend |
//! | [`catalog`] | GraphQL catalog client |
//! | [`services`] | Wiring of the core services |
//! | [`commands`] | CLI command handlers |
//! | [`stats`] | `shelf stats` |
//! | [`server`] | HTTP API server |

pub mod catalog;
pub mod commands;
pub mod config;
pub mod db;
pub mod llm;
pub mod migrate;
pub mod seed;
pub mod server;
pub mod services;
pub mod sqlite_store;
pub mod stats;
