//! LLM provider implementations for Spendwise.
//!
//! All providers implement the `spendwise_core::Provider` trait.
//! [`build_from_config`] picks the right one from configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, default_base_url};
