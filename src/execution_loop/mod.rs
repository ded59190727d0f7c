pub mod error_classifier;
pub mod pipeline;

pub use error_classifier::*;
pub use pipeline::*;
