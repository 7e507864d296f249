//! Cryptographic primitives: P-256 ECDSA keygen/sign, SHA-256, PEM-loading
//! the attestation key, and the AES-256-CBC + HMAC-SHA-256 encrypt-then-MAC
//! scheme used to wrap key handles.
//!
//! Each function is a pure operation over byte buffers with no knowledge
//! of the HID/APDU framing above it.

use aes::cipher::generic_array::GenericArray;
use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use ring::{digest, hmac};

use crate::error::{AuthenticatorError, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const EC_POINT_SIZE: usize = 65;
const HMAC_TAG_LEN: usize = 16;
const AES_IV_LEN: usize = 16;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    out
}

/// Loads a PEM-encoded PKCS#8 ECDSA P-256 private key from disk.
pub fn load_attestation_key(path: &std::path::Path) -> Result<EcdsaKeyPair> {
    let pem_bytes = std::fs::read(path)?;
    let parsed = pem::parse(&pem_bytes)?;
    let rng = SystemRandom::new();
    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, parsed.contents(), &rng)
        .map_err(|_| AuthenticatorError::Config(format!("invalid attestation key at {path:?}")))
}

/// Loads a DER-encoded X.509 certificate from disk, verbatim.
pub fn load_attestation_cert(path: &std::path::Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

/// Generates a fresh P-256 key pair, returning the reloadable PKCS#8
/// document alongside the live signing key. `ring` does not expose the raw
/// 32-byte scalar of an `EcdsaKeyPair`, so the PKCS#8 bytes are what gets
/// stored inside a wrapped key handle.
pub fn generate_p256_keypair() -> Result<(EcdsaKeyPair, Vec<u8>)> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)?;
    let key_pair =
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
            .map_err(AuthenticatorError::from)?;
    Ok((key_pair, pkcs8.as_ref().to_vec()))
}

/// Reloads a signing key from PKCS#8 bytes previously produced by
/// [`generate_p256_keypair`] or extracted from an unwrapped key handle.
pub fn key_pair_from_pkcs8(pkcs8: &[u8]) -> Result<EcdsaKeyPair> {
    let rng = SystemRandom::new();
    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8, &rng)
        .map_err(|_| AuthenticatorError::Internal("key handle held an unloadable private key".into()))
}

/// Encodes a P-256 public key as the uncompressed SEC1 form `0x04 ‖ X ‖ Y`.
pub fn public_key_uncompressed(key_pair: &EcdsaKeyPair) -> [u8; EC_POINT_SIZE] {
    let mut out = [0u8; EC_POINT_SIZE];
    out.copy_from_slice(key_pair.public_key().as_ref());
    out
}

/// SHA-256 the buffer and sign it with `key_pair`, returning an ASN.1 DER
/// signature.
pub fn sign_der(key_pair: &EcdsaKeyPair, buffer: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let sig = key_pair.sign(&rng, buffer)?;
    Ok(sig.as_ref().to_vec())
}

pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf)
        .map_err(|_| AuthenticatorError::Internal("RNG fill failed".into()))?;
    Ok(buf)
}

/// Encrypts `plaintext` under AES-256-CBC with PKCS#7 padding using a fresh
/// random IV, then appends an HMAC-SHA-256 tag (truncated to 16 bytes) over
/// `iv ‖ ciphertext`. Wire format: `iv:16 ‖ ciphertext ‖ tag:16`.
pub fn seal(wrap_key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let iv_vec = random_bytes(AES_IV_LEN)?;
    let mut iv = [0u8; AES_IV_LEN];
    iv.copy_from_slice(&iv_vec);

    let enc = Aes256CbcEnc::new(GenericArray::from_slice(wrap_key), GenericArray::from_slice(&iv));
    let ciphertext = enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mac_key = hmac::Key::new(hmac::HMAC_SHA256, wrap_key);
    let mut mac_input = Vec::with_capacity(AES_IV_LEN + ciphertext.len());
    mac_input.extend_from_slice(&iv);
    mac_input.extend_from_slice(&ciphertext);
    let tag = hmac::sign(&mac_key, &mac_input);

    let mut out = Vec::with_capacity(AES_IV_LEN + ciphertext.len() + HMAC_TAG_LEN);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag.as_ref()[..HMAC_TAG_LEN]);
    Ok(out)
}

/// Verifies the HMAC tag and decrypts a blob produced by [`seal`].
pub fn unseal(wrap_key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < AES_IV_LEN + HMAC_TAG_LEN {
        return Err(AuthenticatorError::Crypto("sealed blob too short".into()));
    }
    let (iv, rest) = sealed.split_at(AES_IV_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - HMAC_TAG_LEN);

    let mac_key = hmac::Key::new(hmac::HMAC_SHA256, wrap_key);
    let mut mac_input = Vec::with_capacity(iv.len() + ciphertext.len());
    mac_input.extend_from_slice(iv);
    mac_input.extend_from_slice(ciphertext);
    let expected = hmac::sign(&mac_key, &mac_input);
    if ring::constant_time::verify_slices_are_equal(&expected.as_ref()[..HMAC_TAG_LEN], tag).is_err() {
        return Err(AuthenticatorError::Crypto("key handle tag mismatch".into()));
    }

    let dec = Aes256CbcDec::new(GenericArray::from_slice(wrap_key), GenericArray::from_slice(iv));
    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| AuthenticatorError::Crypto("key handle padding invalid".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_unseal_round_trip() {
        let key = [0x42u8; 32];
        let plaintext = b"private key bytes || application param";
        let sealed = seal(&key, plaintext).unwrap();
        let opened = unseal(&key, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn unseal_rejects_tampered_tag() {
        let key = [0x11u8; 32];
        let mut sealed = seal(&key, b"hello world").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(unseal(&key, &sealed).is_err());
    }

    #[test]
    fn keypair_round_trips_through_pkcs8() {
        let (key_pair, pkcs8) = generate_p256_keypair().unwrap();
        let reloaded = key_pair_from_pkcs8(&pkcs8).unwrap();
        assert_eq!(
            key_pair.public_key().as_ref(),
            reloaded.public_key().as_ref()
        );
    }
}
