use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Failure decoding a bind response or one of its BER elements.
///
/// All variants are reported synchronously and never leave a partially
/// decoded message observable. Encoding has no failure mode.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A trailing element of the bind response carried a tag that is neither
    /// the referral list nor the server SASL credentials.
    #[error("invalid element type 0x{tag:02X} in bind response")]
    UnexpectedElement { tag: u8 },

    #[error("expected element of type 0x{expected:02X}, got 0x{tag:02X}")]
    TagMismatch { expected: u8, tag: u8 },

    #[error("BER truncated: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// Tree-mode decode of a bind response with fewer than the three
    /// mandatory elements.
    #[error("bind response sequence has {count} elements, need at least 3")]
    ElementCount { count: usize },

    #[error("invalid UTF-8 in string value")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("malformed BER: {0}")]
    Malformed(String),
}
