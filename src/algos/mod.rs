//! Reference algorithms
//!
//! - [`sssp::ShortestPath`]: single-source shortest paths, recovers lost
//!   partitions through compensation
//! - [`page_rank::PageRank`]: PageRank stopped by its master context

pub mod page_rank;
pub mod sssp;

pub use page_rank::PageRank;
pub use sssp::ShortestPath;
