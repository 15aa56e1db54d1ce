#![forbid(unsafe_code)]

//! Key derivation functions: ConcatKDF (NIST SP 800-56A), PBKDF2 (RFC 8018),
//! and the legacy Diffie-Hellman KDF from XML Encryption 1.1 section 5.6.2.2.

use digest::Digest;
use sigtuna_core::{algorithm, Error};

/// Derive `key_len` bytes with the single-step ConcatKDF.
///
/// `K(i) = H(be32(i) || secret || other_info)` for i = 1.., concatenated and
/// truncated. `other_info` is the concatenation of AlgorithmID, PartyUInfo,
/// PartyVInfo, SuppPubInfo, and SuppPrivInfo, already hex-decoded by the
/// caller.
pub fn concat_kdf(
    digest_uri: &str,
    secret: &[u8],
    other_info: &[u8],
    key_len: usize,
) -> Result<Vec<u8>, Error> {
    match digest_uri {
        algorithm::SHA1 => Ok(concat_rounds::<sha1::Sha1>(secret, other_info, key_len)),
        algorithm::SHA224 => Ok(concat_rounds::<sha2::Sha224>(secret, other_info, key_len)),
        algorithm::SHA256 => Ok(concat_rounds::<sha2::Sha256>(secret, other_info, key_len)),
        algorithm::SHA384 => Ok(concat_rounds::<sha2::Sha384>(secret, other_info, key_len)),
        algorithm::SHA512 => Ok(concat_rounds::<sha2::Sha512>(secret, other_info, key_len)),
        algorithm::SHA3_224 => Ok(concat_rounds::<sha3::Sha3_224>(secret, other_info, key_len)),
        algorithm::SHA3_256 => Ok(concat_rounds::<sha3::Sha3_256>(secret, other_info, key_len)),
        algorithm::SHA3_384 => Ok(concat_rounds::<sha3::Sha3_384>(secret, other_info, key_len)),
        algorithm::SHA3_512 => Ok(concat_rounds::<sha3::Sha3_512>(secret, other_info, key_len)),
        _ => Err(Error::UnsupportedAlgorithm(format!(
            "ConcatKDF digest: {digest_uri}"
        ))),
    }
}

fn concat_rounds<H: Digest>(secret: &[u8], other_info: &[u8], key_len: usize) -> Vec<u8> {
    let hash_len = <H as Digest>::output_size();
    let reps = key_len.div_ceil(hash_len);
    let mut derived = Vec::with_capacity(reps * hash_len);
    for counter in 1..=(reps as u32) {
        let mut hasher = H::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(secret);
        hasher.update(other_info);
        derived.extend_from_slice(&hasher.finalize());
    }
    derived.truncate(key_len);
    derived
}

/// Derive `key_len` bytes with PBKDF2. The `secret` plays the password role;
/// the PRF is selected by its HMAC algorithm URI.
pub fn pbkdf2(
    prf_uri: &str,
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
    key_len: usize,
) -> Result<Vec<u8>, Error> {
    if iterations == 0 {
        return Err(Error::KeyDerivation("PBKDF2 iteration count is zero".into()));
    }
    let mut derived = vec![0u8; key_len];
    match prf_uri {
        algorithm::HMAC_SHA1 => {
            pbkdf2::pbkdf2_hmac::<sha1::Sha1>(secret, salt, iterations, &mut derived)
        }
        algorithm::HMAC_SHA224 => {
            pbkdf2::pbkdf2_hmac::<sha2::Sha224>(secret, salt, iterations, &mut derived)
        }
        algorithm::HMAC_SHA256 => {
            pbkdf2::pbkdf2_hmac::<sha2::Sha256>(secret, salt, iterations, &mut derived)
        }
        algorithm::HMAC_SHA384 => {
            pbkdf2::pbkdf2_hmac::<sha2::Sha384>(secret, salt, iterations, &mut derived)
        }
        algorithm::HMAC_SHA512 => {
            pbkdf2::pbkdf2_hmac::<sha2::Sha512>(secret, salt, iterations, &mut derived)
        }
        _ => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "PBKDF2 PRF: {prf_uri}"
            )))
        }
    }
    Ok(derived)
}

/// Derive a key with the legacy DH KDF.
///
/// Each round hashes `secret || counter || encryption-algorithm URI || nonce
/// || key-length`, where the counter is a two-digit decimal string starting
/// at "01" and the key length is the bit count in decimal. Rounds are
/// concatenated until `key_len_bits` are available, then truncated.
pub fn dh_legacy_kdf(
    digest_uri: &str,
    secret: &[u8],
    encryption_algorithm: &str,
    nonce: &[u8],
    key_len_bits: usize,
) -> Result<Vec<u8>, Error> {
    if key_len_bits == 0 || key_len_bits % 8 != 0 {
        return Err(Error::KeyDerivation(format!(
            "legacy DH KDF key length must be a positive multiple of 8 bits, got {key_len_bits}"
        )));
    }

    let key_bits_text = key_len_bits.to_string();
    let mut derived = Vec::new();
    let mut counter = 0u32;
    while derived.len() * 8 < key_len_bits {
        counter += 1;
        let counter_text = format!("{counter:02}");
        let mut input = Vec::with_capacity(
            secret.len()
                + counter_text.len()
                + encryption_algorithm.len()
                + nonce.len()
                + key_bits_text.len(),
        );
        input.extend_from_slice(secret);
        input.extend_from_slice(counter_text.as_bytes());
        input.extend_from_slice(encryption_algorithm.as_bytes());
        input.extend_from_slice(nonce);
        input.extend_from_slice(key_bits_text.as_bytes());
        derived.extend_from_slice(&digest_once(digest_uri, &input)?);
    }
    derived.truncate(key_len_bits / 8);
    Ok(derived)
}

/// One-shot digest by algorithm URI.
pub fn digest_once(digest_uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    match digest_uri {
        algorithm::SHA1 => Ok(sha1::Sha1::digest(data).to_vec()),
        algorithm::SHA224 => Ok(sha2::Sha224::digest(data).to_vec()),
        algorithm::SHA256 => Ok(sha2::Sha256::digest(data).to_vec()),
        algorithm::SHA384 => Ok(sha2::Sha384::digest(data).to_vec()),
        algorithm::SHA512 => Ok(sha2::Sha512::digest(data).to_vec()),
        algorithm::SHA3_224 => Ok(sha3::Sha3_224::digest(data).to_vec()),
        algorithm::SHA3_256 => Ok(sha3::Sha3_256::digest(data).to_vec()),
        algorithm::SHA3_384 => Ok(sha3::Sha3_384::digest(data).to_vec()),
        algorithm::SHA3_512 => Ok(sha3::Sha3_512::digest(data).to_vec()),
        _ => Err(Error::UnsupportedAlgorithm(format!("digest: {digest_uri}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_kdf_matches_manual_computation() {
        // One round of SHA-256 over counter || Z || OtherInfo.
        use sha2::Digest;
        let secret = b"shared secret material";
        let other_info = b"\x01\x02\x03";
        let mut hasher = sha2::Sha256::new();
        hasher.update(1u32.to_be_bytes());
        hasher.update(secret);
        hasher.update(other_info);
        let expected = hasher.finalize();

        let derived = concat_kdf(algorithm::SHA256, secret, other_info, 16).unwrap();
        assert_eq!(derived, expected[..16]);
    }

    #[test]
    fn concat_kdf_spans_multiple_rounds() {
        let derived = concat_kdf(algorithm::SHA256, b"z", b"", 48).unwrap();
        assert_eq!(derived.len(), 48);
        // First 32 bytes are round one, independent of the total length.
        let first = concat_kdf(algorithm::SHA256, b"z", b"", 32).unwrap();
        assert_eq!(derived[..32], first[..]);
    }

    #[test]
    fn concat_kdf_unknown_digest_rejected() {
        assert!(concat_kdf("http://example.com/hash", b"z", b"", 16).is_err());
    }

    #[test]
    fn pbkdf2_rfc6070_style_vector() {
        // RFC 6070 vector #2 (password/salt, 2 iterations), HMAC-SHA1.
        let derived = pbkdf2(algorithm::HMAC_SHA1, b"password", b"salt", 2, 20).unwrap();
        assert_eq!(
            hex::encode(&derived),
            "ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957"
        );
    }

    #[test]
    fn pbkdf2_zero_iterations_rejected() {
        assert!(pbkdf2(algorithm::HMAC_SHA256, b"p", b"s", 0, 16).is_err());
    }

    #[test]
    fn dh_legacy_kdf_matches_definition() {
        // Single round: SHA-256(secret || "01" || uri || nonce || "128").
        use sha2::Digest;
        let secret = b"0123456789abcdef";
        let uri = algorithm::AES128_CBC;
        let nonce = b"\xaa\xbb";
        let mut hasher = sha2::Sha256::new();
        hasher.update(secret);
        hasher.update(b"01");
        hasher.update(uri.as_bytes());
        hasher.update(nonce);
        hasher.update(b"128");
        let expected = hasher.finalize();

        let derived = dh_legacy_kdf(algorithm::SHA256, secret, uri, nonce, 128).unwrap();
        assert_eq!(derived, expected[..16]);
    }

    #[test]
    fn dh_legacy_kdf_iterates_for_long_output() {
        // 512 bits from SHA-1 (160-bit output) needs four rounds.
        let derived =
            dh_legacy_kdf(algorithm::SHA1, b"z", algorithm::AES256_CBC, b"", 512).unwrap();
        assert_eq!(derived.len(), 64);
    }

    #[test]
    fn dh_legacy_kdf_odd_bit_length_rejected() {
        assert!(dh_legacy_kdf(algorithm::SHA256, b"z", algorithm::AES128_CBC, b"", 129).is_err());
    }
}
