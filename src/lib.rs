//! # SourceDAC
//!
//! Documentation-as-context for source projects: keeps a store of generated
//! markdown (per-file summaries plus a synthesized architecture overview)
//! and its semantic index synchronized with the source tree, and exposes
//! retrieval to LLM tooling over a CLI and a JSON HTTP server.
//!
//! ## Pipeline
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌──────────────────┐   ┌──────────┐
//! │ Enumerate  │──▶│   Diff    │──▶│ Summarize+Chunk  │──▶│  SQLite   │
//! │ (ignore)   │   │ (snapshot)│   │     +Embed       │   │  index    │
//! └────────────┘   └───────────┘   └──────────────────┘   └────┬─────┘
//!        ▲                                                     │
//!   ┌────┴─────┐                          ┌───────────────────┤
//!   │  Watcher │                          ▼                   ▼
//!   │ (notify) │                    ┌──────────┐       ┌──────────┐
//!   └──────────┘                    │   CLI    │       │   HTTP   │
//!                                   │  (dac)   │       │  server  │
//!                                   └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dac init                      # scaffold .dac/ and the context store
//! dac generate                  # summarize, embed, and index the project
//! dac query "auth flow"         # semantic search over the generated docs
//! dac dev                       # watch for changes and serve /query
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`files`] | Project file enumeration and ignore rules |
//! | [`tracker`] | Change tracking against the stored snapshot |
//! | [`summarize`] | Summary and architecture generation |
//! | [`chunker`] | Markdown-aware chunking |
//! | [`generation`] | Text-generation provider abstraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | SQLite vector index |
//! | [`analysis`] | The end-to-end analysis pipeline |
//! | [`service`] | Query and instruction-enrichment operations |
//! | [`watcher`] | Debounced filesystem watch loop |
//! | [`server`] | JSON HTTP retrieval server |

pub mod analysis;
pub mod chunker;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod files;
pub mod generation;
pub mod index;
pub mod migrate;
pub mod models;
pub mod server;
pub mod service;
pub mod summarize;
pub mod tracker;
pub mod watcher;
