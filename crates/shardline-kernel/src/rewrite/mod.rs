//! # Rewrite Module
//!
//! Token generation, per-unit SQL assembly and parameter regrouping.

pub mod builder;
pub mod engine;
pub mod generator;

pub use builder::assemble;
pub use engine::{RewriteEngine, RewriteResult};
pub use generator::{generate, RewritePlan, MAX_ROW_COUNT};
