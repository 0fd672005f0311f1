//! Error types for IPNS publishing and resolution

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpnsError {
    #[error("missing private key")]
    InvalidPrivateKey,

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("invalid datastore key: {0}")]
    InvalidDatastoreKey(String),

    #[error("unexpected error when determining the last published record: {0}")]
    DeterminingPublishedRecord(String),

    #[error("error storing the record in the datastore: {0}")]
    StoringInDatastore(String),

    #[error("error putting the record to routing: {0}")]
    PuttingToRouting(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("unexpected error getting the record for {name}: {reason}")]
    UnexpectedErrorGettingRecord { name: String, reason: String },

    #[error("record requested was not found for {0} in the network")]
    NoRecordFound(String),

    #[error("found a record that is not a valid IPNS record for {0}")]
    InvalidRecordReceived(String),

    #[error("invalid record data: {0}")]
    InvalidRecordData(String),

    #[error("record signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("record has expired (validity {validity})")]
    ExpiredRecord { validity: DateTime<Utc> },

    #[error("could not resolve name: recursion limit of {depth} exceeded")]
    RecursionLimit { depth: usize },

    #[error("operation timed out")]
    Timeout,

    #[error("no key named {0}")]
    UnknownKey(String),

    #[error("republish process already running")]
    RepublishAlreadyRunning,

    #[error("republish process is not running")]
    RepublishNotRunning,
}

impl IpnsError {
    /// Stable identifier surfaced to callers
    pub fn code(&self) -> &'static str {
        match self {
            IpnsError::InvalidPrivateKey => "ERR_INVALID_PRIVATE_KEY",
            IpnsError::InvalidKey(_) => "ERR_INVALID_KEY",
            IpnsError::InvalidDatastoreKey(_) => "ERR_INVALID_DATASTORE_KEY",
            IpnsError::DeterminingPublishedRecord(_) => "ERR_DETERMINING_PUBLISHED_RECORD",
            IpnsError::StoringInDatastore(_) => "ERR_STORING_IN_DATASTORE",
            IpnsError::PuttingToRouting(_) => "ERR_PUTTING_TO_ROUTING",
            IpnsError::InvalidName(_) => "ERR_INVALID_NAME",
            IpnsError::InvalidPath(_) => "ERR_INVALID_PATH",
            IpnsError::UnexpectedErrorGettingRecord { .. } => "ERR_UNEXPECTED_ERROR_GETTING_RECORD",
            IpnsError::NoRecordFound(_) => "ERR_NO_RECORD_FOUND",
            IpnsError::InvalidRecordReceived(_) => "ERR_INVALID_RECORD_RECEIVED",
            IpnsError::InvalidRecordData(_) => "ERR_INVALID_RECORD_DATA",
            IpnsError::SignatureVerification(_) => "ERR_SIGNATURE_VERIFICATION",
            IpnsError::ExpiredRecord { .. } => "ERR_IPNS_EXPIRED_RECORD",
            IpnsError::RecursionLimit { .. } => "ERR_RESOLVE_RECURSION_LIMIT",
            IpnsError::Timeout => "ERR_TIMEOUT",
            IpnsError::UnknownKey(_) => "ERR_UNKNOWN_KEY",
            IpnsError::RepublishAlreadyRunning => "ERR_REPUBLISH_ALREADY_RUNNING",
            IpnsError::RepublishNotRunning => "ERR_REPUBLISH_NOT_RUNNING",
        }
    }
}

pub type Result<T> = std::result::Result<T, IpnsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(IpnsError::InvalidPrivateKey.code(), "ERR_INVALID_PRIVATE_KEY");
        assert_eq!(
            IpnsError::NoRecordFound("/ipns/x".into()).code(),
            "ERR_NO_RECORD_FOUND"
        );
        assert_eq!(
            IpnsError::UnexpectedErrorGettingRecord {
                name: "/ipns/x".into(),
                reason: "boom".into()
            }
            .code(),
            "ERR_UNEXPECTED_ERROR_GETTING_RECORD"
        );
        assert_eq!(
            IpnsError::RepublishAlreadyRunning.code(),
            "ERR_REPUBLISH_ALREADY_RUNNING"
        );
    }
}
