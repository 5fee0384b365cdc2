use thiserror::Error;

/// Errors that can occur while compiling a kernel
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("construct has no device lowering: {0}")]
    NotSupported(String),

    #[error("internal code generation error: {0}")]
    InvalidCodeGeneration(String),

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    #[error("method already registered: {0}")]
    DuplicateMethod(String),

    #[error("a builder is already active for method {0}")]
    BuilderInUse(String),

    #[error("unsupported bytecode instruction: {0}")]
    UnsupportedInstruction(String),

    #[error("invalid evaluation stack state at offset {offset}: {message}")]
    InvalidStackState { offset: usize, message: String },

    #[error("call target cannot be compiled for the device: {0}")]
    UnsupportedCallTarget(String),

    #[error("backend rejected the compiled kernel: {0}")]
    CompilationFailed(String),
}

/// Result type for all compiler operations
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_display() {
        let error = CompileError::DuplicateMethod("kernel_main".to_string());
        assert_eq!(error.to_string(), "method already registered: kernel_main");

        let error = CompileError::TypeError {
            expected: "i32".to_string(),
            actual: "f64".to_string(),
        };
        assert!(error.to_string().contains("expected i32"));
    }
}
