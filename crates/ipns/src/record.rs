//! Signed IPNS records
//!
//! A record points a key's name at a value. It is signed over a canonical
//! encoding of its fields and carries the signer's public key, so a
//! fetched record can be checked against the name it was requested for.

use crate::errors::*;
use chrono::{DateTime, SecondsFormat, Utc};
use ippan_crypto::{verify_signature, PeerId, PrivateKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::time::Duration;

const SIGNATURE_DOMAIN: &[u8] = b"IPPAN_IPNS_RECORD";

/// How the `validity` field is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidityType {
    /// `validity` is an absolute end-of-life timestamp
    #[serde(rename = "EOL")]
    Eol,
}

impl ValidityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidityType::Eol => "EOL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpnsRecord {
    pub value: String,
    pub validity_type: ValidityType,
    pub validity: DateTime<Utc>,
    pub sequence: u64,
    /// Suggested caching lifetime, independent of `validity`
    pub ttl: Duration,
    #[serde(with = "serde_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl IpnsRecord {
    /// Build and sign a new record
    pub fn create(
        key: &PrivateKey,
        value: impl Into<String>,
        sequence: u64,
        validity: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self> {
        let keypair = key
            .to_keypair()
            .map_err(|e| IpnsError::InvalidKey(e.to_string()))?;

        let mut record = Self {
            value: value.into(),
            validity_type: ValidityType::Eol,
            validity,
            sequence,
            ttl,
            public_key: keypair.public_key().to_vec(),
            signature: Vec::new(),
        };
        record.signature = keypair.sign(&record.signing_digest()).to_vec();
        Ok(record)
    }

    /// Build a record that stays valid for `lifetime` from now
    pub fn with_lifetime(
        key: &PrivateKey,
        value: impl Into<String>,
        sequence: u64,
        lifetime: Duration,
        ttl: Duration,
    ) -> Result<Self> {
        Self::create(key, value, sequence, validity_from_lifetime(lifetime)?, ttl)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| IpnsError::InvalidRecordData(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| IpnsError::InvalidRecordData(e.to_string()))
    }

    /// Check the signature against `public_key`, then the validity window.
    ///
    /// A tampered record fails with `SignatureVerification`, a stale one
    /// with `ExpiredRecord`.
    pub fn verify(&self, public_key: &[u8]) -> Result<()> {
        verify_signature(public_key, &self.signing_digest(), &self.signature)
            .map_err(|e| IpnsError::SignatureVerification(e.to_string()))?;
        self.check_validity(Utc::now())
    }

    /// Verify a record fetched for `peer_id` using its embedded public key
    pub fn verify_for_peer(&self, peer_id: &PeerId) -> Result<()> {
        self.verify_signer(peer_id)?;
        self.check_validity(Utc::now())
    }

    /// Check that `peer_id` signed this record, ignoring the validity window
    pub fn verify_signer(&self, peer_id: &PeerId) -> Result<()> {
        if !peer_id.matches_public_key(&self.public_key) {
            return Err(IpnsError::SignatureVerification(format!(
                "embedded public key does not belong to {peer_id}"
            )));
        }
        verify_signature(&self.public_key, &self.signing_digest(), &self.signature)
            .map_err(|e| IpnsError::SignatureVerification(e.to_string()))
    }

    pub fn check_validity(&self, now: DateTime<Utc>) -> Result<()> {
        match self.validity_type {
            ValidityType::Eol if now > self.validity => Err(IpnsError::ExpiredRecord {
                validity: self.validity,
            }),
            ValidityType::Eol => Ok(()),
        }
    }

    /// Order two records for the same key: higher sequence wins, then
    /// the later validity.
    pub fn compare(&self, other: &IpnsRecord) -> Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.validity.cmp(&other.validity))
    }

    fn signing_digest(&self) -> [u8; 32] {
        let mut message = Vec::new();
        message.extend_from_slice(SIGNATURE_DOMAIN);
        message.extend_from_slice(&(self.value.len() as u64).to_be_bytes());
        message.extend_from_slice(self.value.as_bytes());
        message.extend_from_slice(self.validity_type.as_str().as_bytes());
        message.extend_from_slice(
            self.validity
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
        message.extend_from_slice(&self.sequence.to_be_bytes());
        message.extend_from_slice(&self.ttl.as_secs().to_be_bytes());
        message.extend_from_slice(&self.ttl.subsec_nanos().to_be_bytes());

        Sha256::digest(&message).into()
    }
}

/// End of life for a record published now with the given lifetime
pub fn validity_from_lifetime(lifetime: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| IpnsError::InvalidRecordData(format!("lifetime {lifetime:?} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ippan_crypto::KeyPair;

    const IPFS_REF: &str = "/ipfs/QmPFVLPmp9zv5Z5KUqLhe2EivAGccQW2r7M7jhVJGLZoZU";

    fn sample(keypair: &KeyPair, sequence: u64) -> IpnsRecord {
        IpnsRecord::with_lifetime(
            &keypair.private_key(),
            IPFS_REF,
            sequence,
            Duration::from_secs(3600),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[test]
    fn serialize_roundtrip_and_verify() {
        let keypair = KeyPair::from_seed([1u8; 32]);
        let record = sample(&keypair, 5);

        let bytes = record.serialize().unwrap();
        let decoded = IpnsRecord::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.verify(&keypair.public_key()).is_ok());
        assert!(decoded.verify_for_peer(&keypair.peer_id()).is_ok());
    }

    #[test]
    fn expired_record_is_not_reported_as_tampered() {
        let keypair = KeyPair::from_seed([2u8; 32]);
        let validity = Utc::now() - chrono::Duration::seconds(10);
        let record = IpnsRecord::create(
            &keypair.private_key(),
            IPFS_REF,
            0,
            validity,
            Duration::from_secs(60),
        )
        .unwrap();

        let err = record.verify(&keypair.public_key()).unwrap_err();
        assert_eq!(err, IpnsError::ExpiredRecord { validity });
        assert_eq!(err.code(), "ERR_IPNS_EXPIRED_RECORD");
    }

    #[test]
    fn tampered_record_fails_signature_check() {
        let keypair = KeyPair::from_seed([3u8; 32]);
        let mut record = sample(&keypair, 1);
        record.value = "/ipfs/QmSomethingElse".into();
        let err = record.verify(&keypair.public_key()).unwrap_err();
        assert_eq!(err.code(), "ERR_SIGNATURE_VERIFICATION");

        let mut record = sample(&keypair, 1);
        record.sequence += 1;
        assert!(record.verify(&keypair.public_key()).is_err());
    }

    #[test]
    fn wrong_key_or_peer_is_rejected() {
        let keypair = KeyPair::from_seed([4u8; 32]);
        let other = KeyPair::from_seed([5u8; 32]);
        let record = sample(&keypair, 0);

        assert!(matches!(
            record.verify(&other.public_key()),
            Err(IpnsError::SignatureVerification(_))
        ));
        assert!(matches!(
            record.verify_for_peer(&other.peer_id()),
            Err(IpnsError::SignatureVerification(_))
        ));
    }

    #[test]
    fn invalid_signing_material_is_rejected() {
        for bytes in [Vec::new(), b"not that valid".to_vec()] {
            let err = IpnsRecord::with_lifetime(
                &PrivateKey::from_bytes(bytes),
                IPFS_REF,
                0,
                Duration::from_secs(60),
                Duration::from_secs(60),
            )
            .unwrap_err();
            assert_eq!(err.code(), "ERR_INVALID_KEY");
        }
    }

    #[test]
    fn malformed_bytes_are_invalid_record_data() {
        for bytes in [&b"data"[..], &b""[..], &b"{\"value\":1}"[..]] {
            let err = IpnsRecord::deserialize(bytes).unwrap_err();
            assert_eq!(err.code(), "ERR_INVALID_RECORD_DATA");
        }
    }

    #[test]
    fn higher_sequence_then_later_validity_wins() {
        let keypair = KeyPair::from_seed([6u8; 32]);
        let older = sample(&keypair, 1);
        let newer = sample(&keypair, 2);
        assert_eq!(newer.compare(&older), Ordering::Greater);

        let mut later = older.clone();
        later.validity = older.validity + chrono::Duration::seconds(5);
        assert_eq!(later.compare(&older), Ordering::Greater);
        assert_eq!(older.compare(&older), Ordering::Equal);
    }

    #[test]
    fn ttl_is_signed_in_full() {
        let keypair = KeyPair::from_seed([7u8; 32]);
        let mut record = IpnsRecord::with_lifetime(
            &keypair.private_key(),
            IPFS_REF,
            0,
            Duration::from_secs(3600),
            Duration::from_nanos(5),
        )
        .unwrap();

        // 2^64 + 5 nanoseconds
        record.ttl = Duration::new(18_446_744_073, 709_551_621);
        assert_eq!(
            record.verify(&keypair.public_key()).unwrap_err().code(),
            "ERR_SIGNATURE_VERIFICATION"
        );

        let long = IpnsRecord::with_lifetime(
            &keypair.private_key(),
            IPFS_REF,
            0,
            Duration::from_secs(3600),
            Duration::MAX,
        )
        .unwrap();
        assert!(long.verify(&keypair.public_key()).is_ok());
    }
}
