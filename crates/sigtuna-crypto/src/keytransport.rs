#![forbid(unsafe_code)]

//! RSA key transport algorithms (PKCS#1 v1.5 and OAEP).
//!
//! The OAEP digest and MGF1 hash are independent inputs here; resolving the
//! XML-level defaulting rules for the two OAEP algorithm URIs is the caller's
//! job (see the encryption engine). The optional label is the decoded
//! `OAEPparams` value.

use sigtuna_core::{algorithm, Error};

/// Hash function selector for OAEP digest and MGF1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OaepHash {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl OaepHash {
    /// Map a digest algorithm URI to an OAEP hash.
    pub fn from_digest_uri(uri: &str) -> Result<Self, Error> {
        match uri {
            algorithm::SHA1 => Ok(Self::Sha1),
            algorithm::SHA224 => Ok(Self::Sha224),
            algorithm::SHA256 => Ok(Self::Sha256),
            algorithm::SHA384 => Ok(Self::Sha384),
            algorithm::SHA512 => Ok(Self::Sha512),
            _ => Err(Error::UnsupportedAlgorithm(format!("OAEP digest: {uri}"))),
        }
    }

    /// Map an MGF algorithm URI to the MGF1 hash.
    pub fn from_mgf_uri(uri: &str) -> Result<Self, Error> {
        match uri {
            algorithm::MGF1_SHA1 => Ok(Self::Sha1),
            algorithm::MGF1_SHA224 => Ok(Self::Sha224),
            algorithm::MGF1_SHA256 => Ok(Self::Sha256),
            algorithm::MGF1_SHA384 => Ok(Self::Sha384),
            algorithm::MGF1_SHA512 => Ok(Self::Sha512),
            _ => Err(Error::UnsupportedAlgorithm(format!("OAEP MGF: {uri}"))),
        }
    }
}

/// A key transport algorithm with fully resolved parameters.
#[derive(Debug, Clone)]
pub enum KeyTransport {
    RsaV15,
    RsaOaep {
        digest: OaepHash,
        mgf: OaepHash,
        label: Option<Vec<u8>>,
    },
}

impl KeyTransport {
    /// Encrypt raw key bytes to the recipient's RSA public key.
    pub fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut rng = rand::thread_rng();
        match self {
            Self::RsaV15 => public_key
                .encrypt(&mut rng, rsa::Pkcs1v15Encrypt, key_data)
                .map_err(|e| Error::Crypto(format!("RSA PKCS#1 v1.5 encrypt: {e}"))),
            Self::RsaOaep { digest, mgf, label } => {
                let padding = oaep_padding(*digest, *mgf, label.as_deref());
                public_key
                    .encrypt(&mut rng, padding, key_data)
                    .map_err(|e| Error::Crypto(format!("RSA-OAEP encrypt: {e}")))
            }
        }
    }

    /// Decrypt transported key bytes with the recipient's RSA private key.
    pub fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        match self {
            Self::RsaV15 => private_key
                .decrypt(rsa::Pkcs1v15Encrypt, encrypted)
                .map_err(|e| Error::Crypto(format!("RSA PKCS#1 v1.5 decrypt: {e}"))),
            Self::RsaOaep { digest, mgf, label } => {
                let padding = oaep_padding(*digest, *mgf, label.as_deref());
                private_key
                    .decrypt(padding, encrypted)
                    .map_err(|e| Error::Crypto(format!("RSA-OAEP decrypt: {e}")))
            }
        }
    }
}

/// Build the `rsa` crate OAEP padding for a (digest, MGF hash) pair.
fn oaep_padding(digest: OaepHash, mgf: OaepHash, label: Option<&[u8]>) -> rsa::Oaep {
    macro_rules! with_mgf {
        ($d:ty) => {
            match mgf {
                OaepHash::Sha1 => rsa::Oaep::new_with_mgf_hash::<$d, sha1::Sha1>(),
                OaepHash::Sha224 => rsa::Oaep::new_with_mgf_hash::<$d, sha2::Sha224>(),
                OaepHash::Sha256 => rsa::Oaep::new_with_mgf_hash::<$d, sha2::Sha256>(),
                OaepHash::Sha384 => rsa::Oaep::new_with_mgf_hash::<$d, sha2::Sha384>(),
                OaepHash::Sha512 => rsa::Oaep::new_with_mgf_hash::<$d, sha2::Sha512>(),
            }
        };
    }

    let mut padding = match digest {
        OaepHash::Sha1 => with_mgf!(sha1::Sha1),
        OaepHash::Sha224 => with_mgf!(sha2::Sha224),
        OaepHash::Sha256 => with_mgf!(sha2::Sha256),
        OaepHash::Sha384 => with_mgf!(sha2::Sha384),
        OaepHash::Sha512 => with_mgf!(sha2::Sha512),
    };
    if let Some(bytes) = label {
        padding.label = Some(String::from_utf8_lossy(bytes).into_owned());
    }
    padding
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One shared key pair; RSA key generation dominates test time.
    fn test_keypair() -> (rsa::RsaPrivateKey, rsa::RsaPublicKey) {
        use std::sync::OnceLock;
        static KEY: OnceLock<rsa::RsaPrivateKey> = OnceLock::new();
        let private = KEY
            .get_or_init(|| {
                let mut rng = rand::thread_rng();
                rsa::RsaPrivateKey::new(&mut rng, 2048).expect("keygen")
            })
            .clone();
        let public = private.to_public_key();
        (private, public)
    }

    #[test]
    fn v15_roundtrip() {
        let (private, public) = test_keypair();
        let key = [0xabu8; 32];
        let ct = KeyTransport::RsaV15.encrypt(&public, &key).unwrap();
        assert_eq!(KeyTransport::RsaV15.decrypt(&private, &ct).unwrap(), key);
    }

    #[test]
    fn oaep_sha1_roundtrip() {
        let (private, public) = test_keypair();
        let transport = KeyTransport::RsaOaep {
            digest: OaepHash::Sha1,
            mgf: OaepHash::Sha1,
            label: None,
        };
        let key = [0x17u8; 16];
        let ct = transport.encrypt(&public, &key).unwrap();
        assert_eq!(transport.decrypt(&private, &ct).unwrap(), key);
    }

    #[test]
    fn oaep_sha256_with_label_roundtrip() {
        let (private, public) = test_keypair();
        let transport = KeyTransport::RsaOaep {
            digest: OaepHash::Sha256,
            mgf: OaepHash::Sha256,
            label: Some(b"label".to_vec()),
        };
        let key = [0x55u8; 24];
        let ct = transport.encrypt(&public, &key).unwrap();
        assert_eq!(transport.decrypt(&private, &ct).unwrap(), key);
    }

    #[test]
    fn oaep_digest_mismatch_fails() {
        let (private, public) = test_keypair();
        let enc = KeyTransport::RsaOaep {
            digest: OaepHash::Sha256,
            mgf: OaepHash::Sha1,
            label: None,
        };
        let dec = KeyTransport::RsaOaep {
            digest: OaepHash::Sha1,
            mgf: OaepHash::Sha1,
            label: None,
        };
        let ct = enc.encrypt(&public, &[0x01u8; 16]).unwrap();
        assert!(dec.decrypt(&private, &ct).is_err());
    }
}
