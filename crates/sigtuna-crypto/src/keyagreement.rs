#![forbid(unsafe_code)]

//! Raw key-agreement computations: ECDH over the NIST curves and
//! finite-field Diffie-Hellman.
//!
//! These produce the shared secret only; deriving a usable key from it is
//! the KDF layer's job.

use sigtuna_core::Error;

/// Compute an ECDH shared secret on P-256.
///
/// `peer_public` is an uncompressed SEC1 point.
pub fn ecdh_p256(peer_public: &[u8], private: &p256::SecretKey) -> Result<Vec<u8>, Error> {
    use p256::elliptic_curve::sec1::FromEncodedPoint;

    let point = p256::EncodedPoint::from_bytes(peer_public)
        .map_err(|e| Error::Key(format!("invalid P-256 public key: {e}")))?;
    let public: p256::PublicKey = Option::from(p256::PublicKey::from_encoded_point(&point))
        .ok_or_else(|| Error::Key("P-256 public key is not a curve point".into()))?;

    let shared = p256::ecdh::diffie_hellman(private.to_nonzero_scalar(), public.as_affine());
    Ok(shared.raw_secret_bytes().to_vec())
}

/// Compute an ECDH shared secret on P-384.
pub fn ecdh_p384(peer_public: &[u8], private: &p384::SecretKey) -> Result<Vec<u8>, Error> {
    use p384::elliptic_curve::sec1::FromEncodedPoint;

    let point = p384::EncodedPoint::from_bytes(peer_public)
        .map_err(|e| Error::Key(format!("invalid P-384 public key: {e}")))?;
    let public: p384::PublicKey = Option::from(p384::PublicKey::from_encoded_point(&point))
        .ok_or_else(|| Error::Key("P-384 public key is not a curve point".into()))?;

    let shared = p384::ecdh::diffie_hellman(private.to_nonzero_scalar(), public.as_affine());
    Ok(shared.raw_secret_bytes().to_vec())
}

/// Compute an ECDH shared secret on P-521.
pub fn ecdh_p521(peer_public: &[u8], private: &p521::SecretKey) -> Result<Vec<u8>, Error> {
    use p521::elliptic_curve::sec1::FromEncodedPoint;

    let point = p521::EncodedPoint::from_bytes(peer_public)
        .map_err(|e| Error::Key(format!("invalid P-521 public key: {e}")))?;
    let public: p521::PublicKey = Option::from(p521::PublicKey::from_encoded_point(&point))
        .ok_or_else(|| Error::Key("P-521 public key is not a curve point".into()))?;

    let shared = p521::ecdh::diffie_hellman(private.to_nonzero_scalar(), public.as_affine());
    Ok(shared.raw_secret_bytes().to_vec())
}

/// Compute a finite-field Diffie-Hellman shared secret.
///
/// `shared = peer_public ^ private mod p`, all big-endian. The result is
/// left-padded with zeros to the byte length of `p`, as the agreement value
/// feeds a KDF byte-for-byte.
pub fn dh_shared_secret(peer_public: &[u8], private: &[u8], p: &[u8]) -> Result<Vec<u8>, Error> {
    use num_bigint_dig::BigUint;

    let modulus = BigUint::from_bytes_be(p);
    if modulus.bits() < 2 {
        return Err(Error::Key("DH prime modulus is degenerate".into()));
    }
    let peer = BigUint::from_bytes_be(peer_public);
    if peer.bits() == 0 || peer >= modulus {
        return Err(Error::Key("DH peer public value out of range".into()));
    }

    let shared = peer.modpow(&BigUint::from_bytes_be(private), &modulus);
    let mut bytes = shared.to_bytes_be();
    if bytes.len() < p.len() {
        let mut padded = vec![0u8; p.len() - bytes.len()];
        padded.extend_from_slice(&bytes);
        bytes = padded;
    }
    Ok(bytes)
}

/// Generate a DH key pair `(private, public)` in the group `(p, g)`.
///
/// The private exponent is sampled uniformly with two fewer bits than the
/// modulus, which keeps it in range for any sensible group.
pub fn dh_generate_keypair(p: &[u8], g: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error> {
    use num_bigint_dig::{BigUint, RandBigInt};

    let modulus = BigUint::from_bytes_be(p);
    if modulus.bits() < 64 {
        return Err(Error::Key("DH prime modulus too small".into()));
    }
    let generator = BigUint::from_bytes_be(g);
    if generator.bits() < 2 {
        return Err(Error::Key("DH generator is degenerate".into()));
    }

    let mut rng = rand::thread_rng();
    let private = rng.gen_biguint(modulus.bits() - 2) | BigUint::from(1u8);
    let public = generator.modpow(&private, &modulus);

    Ok((private.to_bytes_be(), public.to_bytes_be()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_p256_both_sides_agree() {
        let mut rng = rand::thread_rng();
        let a = p256::SecretKey::random(&mut rng);
        let b = p256::SecretKey::random(&mut rng);

        use p256::elliptic_curve::sec1::ToEncodedPoint;
        let a_pub = a.public_key().to_encoded_point(false);
        let b_pub = b.public_key().to_encoded_point(false);

        let ab = ecdh_p256(b_pub.as_bytes(), &a).unwrap();
        let ba = ecdh_p256(a_pub.as_bytes(), &b).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 32);
    }

    #[test]
    fn ecdh_rejects_garbage_point() {
        let mut rng = rand::thread_rng();
        let sk = p256::SecretKey::random(&mut rng);
        assert!(ecdh_p256(&[0x04u8; 65], &sk).is_err());
    }

    // RFC 3526 group 14 prime (2048-bit MODP), generator 2.
    fn modp2048() -> (Vec<u8>, Vec<u8>) {
        let p = hex::decode(concat!(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
            "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
            "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
            "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
            "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
            "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
            "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
            "3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF"
        ))
        .unwrap();
        (p, vec![0x02])
    }

    #[test]
    fn dh_both_sides_agree() {
        let (p, g) = modp2048();
        let (a_priv, a_pub) = dh_generate_keypair(&p, &g).unwrap();
        let (b_priv, b_pub) = dh_generate_keypair(&p, &g).unwrap();

        let ab = dh_shared_secret(&b_pub, &a_priv, &p).unwrap();
        let ba = dh_shared_secret(&a_pub, &b_priv, &p).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), p.len());
    }

    #[test]
    fn dh_rejects_out_of_range_public() {
        let (p, g) = modp2048();
        let (priv_a, _) = dh_generate_keypair(&p, &g).unwrap();
        assert!(dh_shared_secret(&p, &priv_a, &p).is_err());
        assert!(dh_shared_secret(&[], &priv_a, &p).is_err());
    }
}
