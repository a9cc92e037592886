//! Resolution over a frozen [`Program`](crate::indexer::program::Program).

pub mod constraints;
pub mod resolver;
pub mod roots;
