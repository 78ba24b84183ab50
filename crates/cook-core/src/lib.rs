pub mod analytics;
pub mod artifact;
pub mod audit;
pub mod context;
pub mod coverage;
pub mod drift;
pub mod error;
pub mod git;
pub mod index;
pub mod io;
pub mod memory;
pub mod paths;
pub mod patterns;
pub mod similarity;
pub mod types;
pub mod validate;
pub mod verify;

pub use context::RunContext;
pub use error::{CookError, Result};
