//! # cli-mate
//!
//! Captures a failing command's output, finds the source location its
//! trace points at, retrieves similar past failures, and stores a
//! root-cause analysis for later lookup.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌──────────────┐
//! │ wtf run   │──▶│ TraceParser │──▶│ Context +    │
//! │ (capture) │   │ (raw trace) │   │ Redactor     │
//! └───────────┘   └─────────────┘   └──────┬───────┘
//!                                          │ AnalyzeRequest
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │ in-proc  │       │   HTTP   │
//!                 │          │       │ /api/... │
//!                 └────┬─────┘       └────┬─────┘
//!                      └────────┬─────────┘
//!                               ▼
//!                  ┌────────────────────────┐
//!                  │  AnalysisOrchestrator  │
//!                  │ index → analyze → store│
//!                  └────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wtf init                          # create database
//! wtf run -- python app.py          # run, and analyze on failure
//! wtf list --tag python             # browse stored cases
//! wtf show <id>                     # full case detail
//! wtf serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`trace`] | Ordered trace-dialect parsing |
//! | [`redact`] | Secret, IP and home-path redaction |
//! | [`context`] | Source snippet extraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Similarity index over past traces |
//! | [`analysis`] | Analysis provider and fallback |
//! | [`store`] | Case record persistence |
//! | [`orchestrator`] | End-to-end analysis pipeline |
//! | [`executor`] | Shell command launcher |
//! | [`capture`] | `wtf run` flow |
//! | [`cases`] | `wtf list` / `show` / `similar` |
//! | [`client`] | Remote server client |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Typed pipeline errors |

pub mod analysis;
pub mod capture;
pub mod cases;
pub mod client;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod executor;
pub mod index;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod redact;
pub mod server;
pub mod store;
pub mod trace;
