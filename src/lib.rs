//! # ra2-ini-core
//!
//! Incremental cross-file indexing and structural type inference for Red Alert 2 style INI
//! configuration.
//!
//! ## Overview
//!
//! A mod is a directory of INI files that reference each other by section name. A weapon
//! section names its projectile, a registration list such as `[WeaponTypes]` enumerates every
//! weapon, and none of it carries explicit types. This crate keeps a workspace-wide index of
//! section definitions, references and registration lists, and infers the type of any section
//! from how the rest of the workspace uses it.
//!
//! - **[`workspace`]**: `IndexManager`, the incremental per-file index with versioning
//! - **[`inference`]**: `TypeInference`, dictionary-driven type inference with dependency-tracked caches
//! - **[`event`]**: change events emitted after each commit
//! - **[`diagnostics`]**: syntax, duplicate, undefined-reference and unused-section checks
//! - **[`register`]**, **[`format`]**, **[`stats`]**: editor helpers built on the index
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ra2_ini_core::{
//!     config::IndexConfig, dictionary::Dictionary, inference::TypeInference,
//!     workspace::IndexManager,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let index = Arc::new(IndexManager::new("./mod", IndexConfig::default())?);
//!     if let Some(summary) = index.index_workspace().await {
//!         println!("indexed {} files", summary.indexed);
//!     }
//!
//!     let dictionary = Arc::new(Dictionary::load("./dictionary.json")?);
//!     let inference = TypeInference::new(dictionary, index.clone());
//!     println!("{:?}", inference.infer_section_type("Colt45"));
//!     Ok(())
//! }
//! ```
//!
//! ## Incremental Updates
//!
//! Every commit diffs the new [`file_index::FileIndex`] against the previous one. Only a
//! non-empty diff bumps the global, file and section versions; the resulting
//! [`event::IndexEvent`] lists exactly the sections whose facts changed. `TypeInference`
//! listens for these events and evicts only the cache entries that depended on them.
//!
//! ## Feature Flags
//!
//! - `bin`: the `ra2ini` command line tool
//! - `service`: the debounced filesystem watcher in [`watch`]

pub mod config;
pub mod diagnostics;
pub mod dictionary;
pub mod error;
pub mod event;
pub mod file_index;
pub mod format;
pub mod inference;
pub mod paths;
pub mod register;
pub mod scanner;
pub mod stats;
#[cfg(feature = "service")]
pub mod watch;
pub mod workspace;

pub use error::*;
pub use event::{IndexEvent, IndexEventKind};
pub use inference::TypeInference;
pub use workspace::IndexManager;
