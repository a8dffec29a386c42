//! Meilisearch backend.

mod client;
mod queries;

pub use client::MeilisearchBackend;
