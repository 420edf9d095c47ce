//! Source adapters for the API catalog.
//!
//! Each adapter pulls candidate records from one external catalog and hands
//! them to the orchestrator through the [`SourceAdapter`] contract. Adapters
//! are bound to layer numbers in a [`SourceRegistry`].

pub mod adapters;
pub mod client;

pub use adapters::{
    ApisGuruAdapter, CatalogFileAdapter, Collected, GitHubAdapter, PublicApisAdapter,
    SourceAdapter, SourceRegistry,
};
pub use client::SourceClient;
