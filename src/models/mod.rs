//! Models Module - Data Structures & Errors
//!
//! Single source of truth for the pipeline's data model and error taxonomy.

pub mod errors;
pub mod types;

pub use errors::*;
pub use types::*;
