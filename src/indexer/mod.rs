//! Turning repositories into chunk sets.
//!
//! [`resolver::ChunkResolver`] is the heart of it: syntax units from
//! [`extractor`], gaps found by [`coverage`], gaps filled by [`window`].
//! [`core::Indexer`] wraps it with acquisition, embedding and index build.
pub mod acquire;
pub mod core;
pub mod coverage;
pub mod extractor;
pub mod files;
pub mod languages;
pub mod resolver;
pub mod window;
