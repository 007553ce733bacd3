pub mod exec;
pub mod flatten;
pub mod pipeline;
