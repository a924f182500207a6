#![doc = "dir-ingest: scan a directory tree and ingest its documents into an R2R store exactly once."]

//! This crate holds all business logic: the directory scanner, the
//! ingestion orchestrator, the store contract and its HTTP client, and the
//! store-side admin commands. The `dir-ingest-cli` crate is only glue.
//!
//! # Usage
//! Scan with [`scan::scan`], then hand the matched paths to [`ingest::ingest`]
//! together with any [`contract::StoreClient`] implementation.

pub mod admin;
pub mod client;
pub mod config;
pub mod contract;
pub mod error;
pub mod ingest;
pub mod scan;

pub use client::R2RClient;
pub use config::{CallPolicy, IngestConfig, IngestionMode, StoreConfig};
pub use error::{IngestError, ScanError, SetupError, StoreError};
pub use ingest::{ingest, ingest_with, FileOutcome, IngestReport, IngestionOutcome};
pub use scan::{scan, FilterOverrides, FilterRuleSet, MatchedFiles};
