//! modfetch - Resolve, download and reconcile versioned module artifacts
//!
//! This library resolves declared module dependencies against one or more
//! repositories, picks a single version for every module required more than
//! once, downloads the resulting artifacts concurrently and reconciles the
//! installation with the one recorded by the previous run.
//!
//! # Pipeline
//!
//! ```text
//! specifications ──► IdentificationEngine ──► ConflictResolver ──► artifacts
//!                         (Repository)                                 │
//!                                                                      ▼
//!          State ◄── Reconciler ◄── installed artifacts ◄──────── Downloader
//! ```
//!
//! [`installer::Installer`] drives a whole run.

pub mod barrier;
pub mod checksum;
pub mod config;
pub mod conflict;
pub mod download;
pub mod error;
pub mod graph;
pub mod identifier;
pub mod identify;
pub mod installer;
pub mod layout;
pub mod logging;
pub mod notify;
pub mod platform;
pub mod repository;
pub mod rule;
pub mod spec;
pub mod state;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::pin::Pin;

pub use error::{Error, Result};

/// A boxed, sendable future, used by the object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Version of this library, written into the state file header.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
