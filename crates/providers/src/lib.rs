//! Language model providers for memloop.
//!
//! Providers implement the `memloop_core::Provider` trait. Only the
//! Anthropic Messages API is bundled; tests use the scripted providers in
//! `memloop-agent`.

pub mod anthropic;

pub use anthropic::AnthropicProvider;
