//! Palaver is a conversation gateway for remote LLM and transcription
//! APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns credentials and their validation, the provider
//!   catalog, the model registry, conversation state with archives, and
//!   the gateway that dispatches sends, titling, and transcription.
//! - [`api`] defines the provider wire payloads (flat chat-completions
//!   and the multimodal parts dialect).
//! - [`cli`] is the thin command surface: credential setup, provider
//!   and model listings, and a one-shot send.
//! - [`utils`] holds URL helpers and test scaffolding.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and
//! route through [`crate::cli::main`], which wires a
//! [`core::session::Session`] over the keyring and a shared HTTP
//! transport.

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
