//! Ragmark - RAG Evaluation Harness
//!
//! Sweeps embedding models, chunking parameters, and retrieval depths over a
//! document corpus, scoring every configuration with rank metrics and an LLM
//! judge. The surrounding workflow ships too: ticket-export cleaning, corpus
//! preparation, model verification, and an interactive RAG chat.

pub mod chunking;
pub mod clean;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod judge;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod registry;

pub use error::{RagmarkError, Result};
