//! RAG (Retrieval-Augmented Generation) module.
//!
//! This module provides:
//! - `chunker`: sliding-window text chunking
//! - `VectorIndex`: embedded chunks with persisted cosine-similarity search
//! - `IndexManager`: index lifecycle per configured scope
//! - `QaPipeline`: retrieval-augmented answering with cancellation and
//!   fallback

mod answerer;
mod chunker;
mod index;
mod manager;

pub use answerer::{
    Answerer, AnswerOutcome, ChainAnswer, ChainStatus, QaPipeline, APOLOGY_ANSWER,
    CANCELLED_ANSWER, NO_INDEX_PREFIX, UNGROUNDED_PREFIX,
};
pub use chunker::{chunk_text, TextChunk};
pub use index::{ScoredChunk, VectorIndex};
pub use manager::IndexManager;
