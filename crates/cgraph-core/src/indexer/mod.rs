pub mod binding;
pub mod catalog;
pub mod filesystem;
pub mod hierarchy;
pub mod lower;
pub mod parser;
pub mod pipeline;
pub mod program;
pub mod syntax;
