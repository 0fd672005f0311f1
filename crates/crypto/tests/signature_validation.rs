use ippan_crypto::{verify_signature, KeyError, KeyPair, PeerId, PrivateKey};

const DETERMINISTIC_SEED: [u8; 32] = [42u8; 32];

#[test]
fn ed25519_signature_roundtrip_succeeds() {
    let key_pair = KeyPair::generate();
    let message = b"ippan::ipns::signature::roundtrip";

    let signature = key_pair.sign(message);
    assert!(verify_signature(&key_pair.public_key(), message, &signature).is_ok());
}

#[test]
fn ed25519_signature_rejects_tampered_signature() {
    let key_pair = KeyPair::generate();
    let message = b"ippan::ipns::signature::tamper-check";

    let mut signature = key_pair.sign(message);
    signature[0] ^= 0xFF;

    assert_eq!(
        verify_signature(&key_pair.public_key(), message, &signature),
        Err(KeyError::BadSignature)
    );
}

#[test]
fn deterministic_identity_is_reproducible() {
    let key_pair = KeyPair::from_seed(DETERMINISTIC_SEED);
    let again = PrivateKey::from_bytes(DETERMINISTIC_SEED.to_vec())
        .to_keypair()
        .expect("valid seed");

    assert_eq!(key_pair.public_key(), again.public_key());
    assert_eq!(key_pair.peer_id(), again.peer_id());

    let message = b"ippan::ipns::deterministic-keypair";
    assert_eq!(key_pair.sign(message), again.sign(message));

    let rendered = key_pair.peer_id().to_string();
    let parsed: PeerId = rendered.parse().expect("peer id parses");
    assert_eq!(parsed, key_pair.peer_id());
    assert_ne!(parsed, KeyPair::from_seed([7u8; 32]).peer_id());
}
