//! # LedgerLens
//!
//! A local-first retrieval and expense-categorization engine for financial
//! documents.
//!
//! LedgerLens ingests statement text, chunks and embeds it into a SQLite
//! vector index, answers questions grounded in the indexed content, and
//! extracts transactions that a rule-plus-model classifier sorts into a
//! fixed category set. Everything lives in one SQLite file.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │ Documents │──▶│ Chunk+Embed  │──▶│  SQLite   │
//! │ txt / md  │   │  pipeline    │   │ vectors   │
//! └───────────┘   └──────────────┘   └────┬─────┘
//!                                          │
//!                  ┌───────────┬───────────┤
//!                  ▼           ▼           ▼
//!             ┌─────────┐ ┌─────────┐ ┌─────────┐
//!             │ search/ │ │ analyze │ │  HTTP   │
//!             │   ask   │ │ + summary│ │  API    │
//!             └─────────┘ └─────────┘ └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lens init                          # create database
//! lens ingest statement.txt          # chunk + embed a document
//! lens search "dining charges"       # semantic search
//! lens ask "how much on travel?"     # grounded answer
//! lens analyze                       # extract + categorize transactions
//! lens summary                       # spending by category
//! lens serve                         # start HTTP server
//! ```

pub mod analyze;
pub mod ask;
pub mod assemble;
pub mod cancel;
pub mod category;
pub mod chunk;
pub mod classify;
pub mod clear;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod get;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod reconcile;
pub mod search;
pub mod server;
pub mod stats;
pub mod summary;
pub mod txstore;
