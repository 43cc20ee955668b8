use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Page markup deviates from the expected shape.
    #[error("structure mismatch: {0}")]
    StructureMismatch(String),
    /// An attribute or declared count the extractor relies on is absent.
    #[error("metadata missing: {0}")]
    MetadataMissing(String),
    /// A single create-page call failed; eligible for retry.
    #[error("delivery of '{title}' failed: {reason}")]
    TransientDelivery { title: String, reason: String },
    /// Retry budget exhausted for one request. Aborts the whole run.
    #[error("delivery of '{title}' aborted after {attempts} attempts: {reason}")]
    DeliveryAborted {
        title: String,
        attempts: u32,
        reason: String,
    },
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    /// The batcher refused to emit a payload over a destination limit.
    #[error("payload limit exceeded: {0}")]
    PayloadLimit(String),
}

pub type Result<T> = std::result::Result<T, Error>;
