//! # NCM Search
//!
//! Semantic search over the Mercosur tariff nomenclature (NCM).
//!
//! Free-text product descriptions, such as invoice line items, are mapped to
//! the closest nomenclature entries. Each entry's description is embedded
//! once with an external embedding model; a query is embedded at search time
//! and ranked against the stored vectors by cosine similarity. Lexical
//! matching on codes and descriptions runs alongside and takes over
//! completely when the embedding provider or the index is unavailable.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌────────────────┐
//! │ Seed dataset │──▶│  Embedder   │──▶│     SQLite     │
//! │    (JSON)    │   │ chunk+retry │   │ entries+vectors│
//! └──────────────┘   └─────────────┘   └───────┬────────┘
//!                                              │
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                  ┌─────────────┐      ┌─────────────┐
//!                  │ SearchEngine│◀────▶│   Lexical   │
//!                  └──────┬──────┘      └─────────────┘
//!                  ┌──────┴──────┐
//!                  ▼             ▼
//!             ┌────────┐   ┌──────────┐
//!             │  CLI   │   │   HTTP   │
//!             │ (ncm)  │   │  (axum)  │
//!             └────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ncm init                      # create database
//! ncm seed ./data/ncm.json      # load the nomenclature
//! ncm embed pending             # generate embeddings
//! ncm search "notebook"         # rank NCM codes
//! ncm serve                     # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`ncm`] | Code grammar, chapters and sections |
//! | [`error`] | Typed search and embedding errors |
//! | [`embedding`] | Embedding providers and chunked batching |
//! | [`store`] | Nomenclature store trait, SQLite and in-memory backends |
//! | [`lexical`] | Lexical scoring of codes and descriptions |
//! | [`search`] | Search engine: semantic + lexical merge |
//! | [`seed`] | Bulk load and corrections |
//! | [`embed_cmd`] | Embedding maintenance |
//! | [`get`] | Entry lookup |
//! | [`stats`] | Index statistics |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod error;
pub mod get;
pub mod lexical;
pub mod migrate;
pub mod models;
pub mod ncm;
pub mod search;
pub mod seed;
pub mod server;
pub mod stats;
pub mod store;
