//! HTTP front door for the claude CLI bridge.
//!
//! Serves the native chat and session API alongside the Ollama and OpenAI
//! compatible chat surfaces.
pub mod gateway_server;

pub use gateway_server::*;
