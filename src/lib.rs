//! syllabus - knowledge-graph retrieval over educational documents
//!
//! Ingests textbook-style documents into a Document -> Chapter -> Section ->
//! Chunk tree stored in SQLite, with chunk vectors in Qdrant and a concept
//! layer (mentions, prerequisites, similarity) on top. Retrieval combines
//! query expansion, vector search, and concept-aware re-ranking; the path
//! planner turns the prerequisite graph into ordered learning paths.

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod expand;
pub mod extract;
pub mod graph;
pub mod index;
pub mod model;
pub mod path;
pub mod progress;
pub mod score;
pub mod search;

pub use error::{Error, Result};
