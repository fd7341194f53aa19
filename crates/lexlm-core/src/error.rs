use thiserror::Error;

/// Errors that can occur while preparing data for or running a lexical LM.
#[derive(Debug, Error)]
pub enum LexError {
    /// An annotated corpus line could not be decoded.
    #[error("malformed corpus line {line} in {path}: {reason}")]
    MalformedCorpus {
        /// File the line came from.
        path: String,
        /// 1-based line number.
        line: usize,
        /// Decoder message.
        reason: String,
    },

    /// A pretrained vector file is unusable for the requested embedding size.
    #[error("invalid pretrained vectors: {0}")]
    InvalidVectors(String),

    /// The requested model configuration is inconsistent.
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// A batch could not be assembled.
    #[error("batch error: {0}")]
    Batch(String),

    /// The parameter store could not be accessed.
    #[error("parameter store error: {0}")]
    ParameterStore(String),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle ML framework error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for lexlm operations.
pub type Result<T> = std::result::Result<T, LexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = LexError::MalformedCorpus {
            path: "train.txt".into(),
            line: 3,
            reason: "expected value".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("train.txt"));
        assert!(msg.contains("line 3"));

        let err = LexError::InvalidConfig("tied weights need nhid == emsize".into());
        assert!(err.to_string().starts_with("invalid model configuration"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LexError>();
    }
}
