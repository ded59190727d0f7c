//! SQL validation and normalization on a parsed statement tree.

pub mod normalize;
pub mod sql_validator;

pub use normalize::{literal_eq, normalize};
pub use sql_validator::{parse, validate, ValidationError, ValidationOutcome};
