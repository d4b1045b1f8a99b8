//! Compile-time errors of the script language

use enclave_core::Exception;
use thiserror::Error;

/// Lexing or parsing failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line})")]
pub struct SyntaxError {
    /// What went wrong
    pub message: String,
    /// 1-based line number
    pub line: u32,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl From<SyntaxError> for Exception {
    fn from(err: SyntaxError) -> Self {
        Exception::with_message("SyntaxError", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_becomes_exception() {
        let exc: Exception = SyntaxError::new("invalid syntax", 3).into();
        assert!(exc.is("SyntaxError"));
        assert_eq!(exc.message(), "invalid syntax (line 3)");
    }
}
