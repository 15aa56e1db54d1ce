#![forbid(unsafe_code)]

//! Algorithm registry mapping URIs to descriptors.
//!
//! The registry is an owned value threaded through the encryption engine and
//! parameter resolvers, rather than a process-wide singleton, so independent
//! configurations cannot observe each other.

use sigtuna_core::algorithm;
use std::collections::HashMap;

/// The role an algorithm URI plays in XML Encryption processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    BlockCipher,
    KeyTransport,
    KeyWrap,
    KeyAgreement,
    KeyDerivation,
    Digest,
    Mac,
}

/// Static description of one algorithm URI.
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmDescriptor {
    pub uri: &'static str,
    pub kind: AlgorithmKind,
    /// Key length in bits, for algorithms that imply one.
    pub key_length: Option<u32>,
}

/// Registry of the algorithms this library understands.
#[derive(Debug, Clone)]
pub struct AlgorithmRegistry {
    descriptors: HashMap<&'static str, AlgorithmDescriptor>,
}

impl AlgorithmRegistry {
    /// Look up a descriptor by algorithm URI.
    pub fn get(&self, uri: &str) -> Option<&AlgorithmDescriptor> {
        self.descriptors.get(uri)
    }

    /// Look up the key length in bits implied by an algorithm URI.
    pub fn key_length(&self, uri: &str) -> Option<u32> {
        self.get(uri).and_then(|d| d.key_length)
    }

    /// Whether `uri` is registered with the given kind.
    pub fn is_kind(&self, uri: &str, kind: AlgorithmKind) -> bool {
        self.get(uri).is_some_and(|d| d.kind == kind)
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        use AlgorithmKind::*;

        let entries: &[(&'static str, AlgorithmKind, Option<u32>)] = &[
            (algorithm::AES128_CBC, BlockCipher, Some(128)),
            (algorithm::AES192_CBC, BlockCipher, Some(192)),
            (algorithm::AES256_CBC, BlockCipher, Some(256)),
            (algorithm::AES128_GCM, BlockCipher, Some(128)),
            (algorithm::AES192_GCM, BlockCipher, Some(192)),
            (algorithm::AES256_GCM, BlockCipher, Some(256)),
            (algorithm::TRIPLEDES_CBC, BlockCipher, Some(192)),
            (algorithm::RSA_V15, KeyTransport, None),
            (algorithm::RSA_OAEP_MGF1P, KeyTransport, None),
            (algorithm::RSA_OAEP_ENC11, KeyTransport, None),
            (algorithm::KW_AES128, KeyWrap, Some(128)),
            (algorithm::KW_AES192, KeyWrap, Some(192)),
            (algorithm::KW_AES256, KeyWrap, Some(256)),
            (algorithm::KW_TRIPLEDES, KeyWrap, Some(192)),
            (algorithm::DH, KeyAgreement, None),
            (algorithm::DH_ES, KeyAgreement, None),
            (algorithm::ECDH_ES, KeyAgreement, None),
            (algorithm::CONCAT_KDF, KeyDerivation, None),
            (algorithm::PBKDF2, KeyDerivation, None),
            (algorithm::SHA1, Digest, None),
            (algorithm::SHA224, Digest, None),
            (algorithm::SHA256, Digest, None),
            (algorithm::SHA384, Digest, None),
            (algorithm::SHA512, Digest, None),
            (algorithm::SHA3_224, Digest, None),
            (algorithm::SHA3_256, Digest, None),
            (algorithm::SHA3_384, Digest, None),
            (algorithm::SHA3_512, Digest, None),
            (algorithm::HMAC_SHA1, Mac, None),
            (algorithm::HMAC_SHA224, Mac, None),
            (algorithm::HMAC_SHA256, Mac, None),
            (algorithm::HMAC_SHA384, Mac, None),
            (algorithm::HMAC_SHA512, Mac, None),
        ];

        let descriptors = entries
            .iter()
            .map(|&(uri, kind, key_length)| {
                (uri, AlgorithmDescriptor { uri, kind, key_length })
            })
            .collect();
        Self { descriptors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cipher_key_lengths() {
        let registry = AlgorithmRegistry::default();
        assert_eq!(registry.key_length(algorithm::AES128_GCM), Some(128));
        assert_eq!(registry.key_length(algorithm::AES256_CBC), Some(256));
        assert_eq!(registry.key_length(algorithm::KW_AES192), Some(192));
    }

    #[test]
    fn kinds_are_distinguished() {
        let registry = AlgorithmRegistry::default();
        assert!(registry.is_kind(algorithm::AES128_CBC, AlgorithmKind::BlockCipher));
        assert!(!registry.is_kind(algorithm::AES128_CBC, AlgorithmKind::KeyWrap));
        assert!(registry.is_kind(algorithm::ECDH_ES, AlgorithmKind::KeyAgreement));
        assert!(registry.get("http://example.com/unknown").is_none());
    }
}
