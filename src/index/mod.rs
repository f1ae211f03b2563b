//! Persistent geohash prefix-tree index.
//!
//! Built once from a dataset with [`build_index`], then opened read-only
//! with [`open_index`] and queried by point and radius.

pub mod builder;
pub mod prefix_tree;
pub mod reader;
pub mod schema;

pub use builder::{build_index, BuildReport};
pub use reader::{distinct_countries, open_index, IndexReader, ScoredPlace};
pub use schema::IndexMeta;
