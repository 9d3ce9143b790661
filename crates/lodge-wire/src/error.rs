//! Error types for the wire layer.

/// Errors that can occur while registering, encoding, or decoding
/// tagged messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The line carried a tag no decoder was registered for.
    #[error("unknown message tag: {0:?}")]
    UnknownTag(String),

    /// A decoder for this tag was already registered.
    #[error("message tag {0:?} was already registered")]
    DuplicateTag(&'static str),

    /// The line was empty or started with a separator.
    #[error("message line is missing a tag")]
    MissingTag,

    /// The payload did not deserialize into the registered type.
    #[error("malformed payload: {0}")]
    Malformed(serde_json::Error),

    /// Serializing an outbound message failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),
}
