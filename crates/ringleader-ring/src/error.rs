//! Error types for the ring codec.

/// Errors produced while encoding or decoding rings and builders.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// The blob does not start with the expected magic bytes.
    #[error("bad magic: expected {expected:?}")]
    BadMagic {
        /// Magic the decoder was looking for.
        expected: [u8; 4],
    },

    /// The blob is shorter than its header.
    #[error("blob truncated: {0} bytes")]
    Truncated(usize),

    /// Postcard serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// Rendering was refused (used by codecs that validate the builder).
    #[error("render failed: {0}")]
    Render(String),
}
