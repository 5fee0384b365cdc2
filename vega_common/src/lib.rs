//! Shared error types and identifiers for the Vega kernel compiler
//!
//! Every stage of the compiler (IR construction, bytecode lifting, code
//! generation, kernel caching) reports failures through the [`CompileError`]
//! type defined here, and refers to host methods through opaque
//! [`MethodHandle`] values.

pub mod error;
pub mod handle;

pub use error::{CompileError, Result};
pub use handle::{MethodHandle, SourceRef};
