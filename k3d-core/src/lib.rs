pub mod error;
pub mod output_macros;
pub mod paths;

pub use error::{K3dError, Result, RuntimeError};
