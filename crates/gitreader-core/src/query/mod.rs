pub mod graph;
pub mod guards;
pub mod snippet;
pub mod toc;
