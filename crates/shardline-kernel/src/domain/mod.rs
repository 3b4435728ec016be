//! # Domain Module
//!
//! Core types of the sharding kernel: values, the parsed statement model,
//! the sharding rule and the per-statement route artifacts.

pub mod errors;
pub mod invariants;
pub mod result;
pub mod route;
pub mod rule;
pub mod shape;
pub mod sharding;
pub mod statement;
pub mod token;
pub mod value;

pub use errors::*;
pub use invariants::*;
pub use result::*;
pub use route::*;
pub use rule::*;
pub use shape::*;
pub use sharding::*;
pub use statement::*;
pub use token::*;
pub use value::*;
