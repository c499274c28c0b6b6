//! Eviction policy implementations (replacers).
//!
//! Currently implements:
//! - [`LruReplacer`] - Least Recently Used over resident frames

mod lru;

pub use lru::LruReplacer;
