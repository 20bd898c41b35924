pub mod acquire;
pub mod callgraph;
pub mod filesystem;
pub mod imports;
pub mod parser;
pub mod pipeline;
pub mod toc;
