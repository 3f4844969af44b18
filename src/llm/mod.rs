//! Language Model Gateway
//!
//! This module provides the single completion primitive the research pipeline
//! depends on, plus the retry contract around it.
//!
//! # Architecture
//!
//! - [`LLMClient`] - The core trait that all providers implement
//! - [`Provider`] - Runtime provider selection built from `stormer.toml`
//! - [`OpenRouterClient`] - OpenAI-compatible chat completions over HTTP
//! - [`RetryPolicy`] - Bounded exponential backoff for `RateLimited`/`Timeout`
//!
//! # Example
//!
//! ```ignore
//! use stormer::llm::{Provider, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = Provider::from_config(&config.openrouter, &secrets)?.create_client()?;
//! let policy = RetryPolicy::from(&config.retry);
//! let token = CancellationToken::new();
//!
//! let text = policy
//!     .run("example", &token, || client.complete("What is 2+2?", "You are terse."))
//!     .await?;
//! ```

/// Core LLM client trait and provider selection.
pub mod client;
/// OpenRouter (OpenAI-compatible) chat completions client.
pub mod openrouter;
/// Retry with exponential backoff and cancellation.
pub mod retry;

pub use client::{LLMClient, Provider};
pub use openrouter::OpenRouterClient;
pub use retry::RetryPolicy;
