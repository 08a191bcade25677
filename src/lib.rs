//! # Groundcrew
//!
//! A document-grounded question answering chat service for PDF knowledge
//! bases.
//!
//! Groundcrew ingests a directory of PDFs into a vector index and answers
//! questions by retrieving the most relevant passages and asking a
//! generative model to respond using only that context. Conversations can
//! be saved per owner and resumed later.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────────┐
//! │ PDF dir  │──▶│ Chunk+Embed │──▶│ Index (SQLite) │
//! └──────────┘   └─────────────┘   └──────┬────────┘
//!                                         │ top-k
//!                 ┌──────────┐     ┌──────▼───────┐
//!                 │ Question │────▶│  Synthesize   │──▶ answer
//!                 └──────────┘     └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crew process                  # ingest PDFs, build the index
//! crew ask "How much thrust does the engine produce?"
//! crew chat list                # saved conversations
//! crew serve                    # JSON API for a chat UI
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | PDF text extraction |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index build/open/search |
//! | [`synthesize`] | Grounded answer generation |
//! | [`chat`] | Conversation persistence |
//! | [`session`] | Per-action request handlers |
//! | [`server`] | JSON HTTP API |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod index;
pub mod loader;
pub mod models;
pub mod server;
pub mod session;
pub mod status;
pub mod synthesize;
