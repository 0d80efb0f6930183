//! Environment file merging library.
//!
//! This library keeps a local `.env` file in step with a git-tracked template
//! such as `.env.example`. Keys the local file lacks are appended under a
//! timestamped comment header; nothing already in the local file is ever
//! rewritten.
//!
//! # Features
//!
//! - **Multiline values**: double-quoted values may span lines (certificates, keys)
//! - **Safe formatting**: values are quoted and escaped only when needed
//! - **Force mode**: optionally append updates for keys whose values differ
//! - **Tracing**: file reads, reconciliation and writes are logged with `tracing`
//!
//! # Example
//!
//! ```rust,no_run
//! use envmerge::sync::{EnvSync, EnvSyncOptions};
//!
//! let options = EnvSyncOptions {
//!     force: true,
//!     ..EnvSyncOptions::default() // .env.example -> .env
//! };
//!
//! EnvSync::sync_with_options(options).unwrap();
//! ```

pub mod format;
pub mod parse;
pub mod reconcile;
pub mod sync;
