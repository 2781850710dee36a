//! Client-side core of a photo catalog.
//!
//! Large collections are fetched page by page behind a TTL cache with
//! stale-while-revalidate reads, and AI annotation jobs are submitted to a
//! remote service whose progress is tracked by polling. Everything the core
//! wants the presentation layer to know arrives as a typed [`event::Event`].

pub mod app;
pub mod cache;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod jobs;
pub mod loader;
pub mod photos;
pub mod session;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, CatalogSettings};
pub use error::{CatalogError, ErrorKind};
