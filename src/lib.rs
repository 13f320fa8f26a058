//! # Catalog Harvest
//!
//! A resilient crawler for hierarchical product catalogs.
//!
//! Catalog Harvest walks a catalog's category and product pages, extracts a
//! structured record from each product page with a declarative selector
//! schema, and retries pages that came back incomplete through a ladder of
//! progressively looser schemas. Accepted records land in a canonical store
//! that feeds a similarity index for question answering.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │    Link     │──▶│  Extraction  │──▶│   Canonical   │
//! │  Discovery  │   │ + Retry Tiers│   │     Store     │
//! └─────────────┘   └──────┬───────┘   └───────┬───────┘
//!                          │                   │
//!                          ▼          ┌────────┴────────┐
//!                   ┌────────────┐    ▼                 ▼
//!                   │   Failed   │ ┌──────────┐   ┌────────────┐
//!                   │   Queue    │ │  SQLite  │   │   Vector   │
//!                   └────────────┘ │   Repo   │   │   Index    │
//!                                  └──────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init                  # create database
//! harvest crawl                 # discover + extract + retry ladder
//! harvest failed list           # what is still missing
//! harvest index                 # embed the canonical store
//! harvest ask "Which router supports PoE?"
//! harvest serve                 # start HTTP triggers
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed error taxonomy |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Core data types |
//! | [`schema`] | Selector schemas and the built-in tier ladder |
//! | [`dom`] | DOM query capability over `scraper` |
//! | [`driver`] | Navigation driver capability and the HTTP driver |
//! | [`extract`] | Page extraction engine |
//! | [`links`] | URL sanitization and link discovery |
//! | [`persist`] | File-backed JSON artifacts |
//! | [`retry`] | Failed queue and tiered retry controller |
//! | [`store`] | Canonical merge store |
//! | [`repository`] | Record repository (SQLite and in-memory) |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`vectorize`] | Tokenizer, vocabulary and cosine similarity |
//! | [`openai`] | Shared OpenAI client |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Text generation provider abstraction |
//! | [`retrieval`] | Vector index and question answering |
//! | [`pipeline`] | Stage orchestration |
//! | [`server`] | HTTP trigger surface |

pub mod config;
pub mod db;
pub mod dom;
pub mod driver;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod links;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod openai;
pub mod persist;
pub mod pipeline;
pub mod repository;
pub mod retrieval;
pub mod retry;
pub mod schema;
pub mod server;
pub mod store;
pub mod vectorize;
