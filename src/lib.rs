//! # STORMer - multi-perspective research and cited article drafting
//!
//! STORMer turns a topic into a long-form, Wikipedia-style article whose
//! claims are grounded in web sources. It discovers a set of research
//! perspectives, simulates an interview per perspective between a question
//! asker and a search-backed answerer, merges the findings into an outline,
//! writes each section from the collected references and finally polishes
//! the result.
//!
//! ## Overview
//!
//! STORMer can be used in two ways:
//!
//! 1. **As a command line tool** - Run the `stormer` binary
//! 2. **As a library** - Embed the pipeline in your own Rust project
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use stormer::{ResearchCoordinator, Secrets, StormerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StormerConfig::resolve(None)?;
//!     let coordinator = ResearchCoordinator::from_config(&config, &Secrets::from_env())?;
//!
//!     let article = coordinator.run("2022 Winter Olympics").await?;
//!     println!("{}", article.to_markdown());
//!     Ok(())
//! }
//! ```
//!
//! ### Custom Gateways
//!
//! Any [`LLMClient`] and [`SearchClient`] can drive the pipeline, which is
//! how the test suite runs it against scripted mocks:
//!
//! ```rust,ignore
//! use stormer::{ReferenceStore, ResearchContext, ResearchCoordinator};
//! use std::sync::Arc;
//!
//! let ctx = ResearchContext::new(llm, search, Arc::new(ReferenceStore::new()), settings);
//! let coordinator = ResearchCoordinator::new(ctx);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `duckduckgo` | Keyless DuckDuckGo search via daedra (default) |
//! | `local-embeddings` | fastembed dense ranking in the reference store |
//!
//! ## Modules
//!
//! - [`research`] - Perspective discovery, conversations, outline, writing, polish
//! - [`store`] - Deduplicating reference store with semantic or lexical search
//! - [`llm`] - Language model gateway and retry policy
//! - [`search`] - Web search gateways and source policy
//! - [`health`] - Connectivity checks for the external services
//! - [`types`] - Domain types and error handling

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Command line parsing and terminal output.
pub mod cli;
/// Connectivity checks for the language model and search services.
pub mod health;
/// Language model gateway.
pub mod llm;
/// Research pipeline stages and their coordinator.
pub mod research;
/// Web search gateways.
pub mod search;
/// Reference store.
pub mod store;
/// Domain types and errors.
pub mod types;
/// Configuration and shared helpers.
pub mod utils;

// Re-export commonly used types
pub use llm::{LLMClient, Provider, RetryPolicy};
pub use research::{ResearchContext, ResearchCoordinator};
pub use search::{SearchClient, SearchHit, SourcePolicy};
pub use store::ReferenceStore;
pub use types::{AppError, Article, Degradation, Reference, ReferenceId, Result, Section};
pub use utils::toml_config::{Secrets, StormerConfig};
