#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A recipient token that doesn't match the fixed 64 hex character format.
    #[error("Invalid recipient token: '{}'", .0)]
    InvalidRecipient(String),

    /// Caller-side misuse, e.g. a custom payload key colliding with the
    /// reserved namespace or connecting an already connected client.
    #[error("Invalid configuration: {}", .0)]
    InvalidConfiguration(String),

    /// The serialized payload exceeds the wire format's size limit and
    /// auto-trim is either disabled or cannot recover the overflow.
    #[error("Payload is too large: {size} bytes. Max size is 256 bytes")]
    PayloadTooLarge { size: usize },

    #[error("Couldn't find or open file: {}", .0)]
    FileNotFound(String),

    /// Any errors regarding the certificate setup.
    #[error("Invalid or malformed certificate: {}", .0)]
    CertificateFailure(String),

    /// A transport-level failure. This aborts a running send cycle.
    #[error("{}", .0)]
    Connection(String),

    #[error("Error while reading configuration:\n{}", .0)]
    ConfigDeserialization(String),

    #[error("Some error occurred. {}", .0)]
    Generic(String),

    #[error("I/O error while {}:\n{}", .0, .1)]
    IoError(String, std::io::Error),

    #[error("Unexpected I/O error:\n{}", .0)]
    RawIoError(#[from] std::io::Error),
}
