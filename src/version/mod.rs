//! Version retrieval layer
//!
//! Fetches candidate versions from remote registries and memoizes them per
//! source so each distinct registry is queried at most once per run.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐     ┌───────────────┐     ┌─────────────┐
//! │ SourceRegistry │────▶│ VersionSource │────▶│  Registry   │
//! │ (one per key)  │     │ (memoized)    │     │  (fetch)    │
//! └────────────────┘     └───────────────┘     └─────────────┘
//!                                                     │
//!                                                     ▼
//!                                              ┌─────────────┐
//!                                              │  Registries │
//!                                              │(server, git)│
//!                                              └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`registry`]: Registry trait for fetching versions from remote sources
//! - [`registries`]: Gem server and GitHub releases implementations
//! - [`source`]: Memoized version sources and the provider factory
//! - [`error`]: Error types for registry operations
//! - [`types`]: `Version` and the ordered `VersionSet`

pub mod error;
pub mod registries;
pub mod registry;
pub mod source;
pub mod types;
