//! Helpers for sibling API wrappers built on top of the session pipeline.

pub mod poll;

pub use poll::*;
