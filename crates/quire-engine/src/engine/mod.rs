pub mod runtime;
pub mod sink;
