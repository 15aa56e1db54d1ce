#![forbid(unsafe_code)]

//! Pre-decryption validation.
//!
//! Stateless structural checks that run before any cryptographic operation
//! on untrusted input. The decrypter aborts on the first violation, before
//! key material is touched.

use crate::model::{CipherData, EncryptedData, EncryptedKey, EncryptionMethod};
use sigtuna_core::Error;

/// Structural validation hook consulted by the decrypter.
pub trait PreDecryptionValidator: Send + Sync {
    fn validate_data(&self, data: &EncryptedData) -> Result<(), Error>;
    fn validate_key(&self, key: &EncryptedKey) -> Result<(), Error>;
}

/// Default validation rules.
///
/// Rejects any node whose `CipherData` is a `CipherReference` — decryption
/// must never become a vector for dereferencing attacker-chosen locations —
/// and nodes that are structurally incomplete.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPreDecryptionValidator;

impl DefaultPreDecryptionValidator {
    fn check(&self, what: &str, method: &EncryptionMethod, cipher_data: &CipherData) -> Result<(), Error> {
        if method.algorithm.trim().is_empty() {
            return Err(Error::PreDecryptionValidation(format!(
                "{what} has an empty EncryptionMethod algorithm"
            )));
        }
        match cipher_data {
            CipherData::Reference(reference) => Err(Error::PreDecryptionValidation(format!(
                "{what} uses a CipherReference ({}); external dereference is not permitted",
                reference.uri
            ))),
            CipherData::Value(bytes) if bytes.is_empty() => Err(Error::PreDecryptionValidation(
                format!("{what} has an empty CipherValue"),
            )),
            CipherData::Value(_) => Ok(()),
        }
    }
}

impl PreDecryptionValidator for DefaultPreDecryptionValidator {
    fn validate_data(&self, data: &EncryptedData) -> Result<(), Error> {
        self.check("EncryptedData", &data.encryption_method, &data.cipher_data)
    }

    fn validate_key(&self, key: &EncryptedKey) -> Result<(), Error> {
        self.check("EncryptedKey", &key.encryption_method, &key.cipher_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CipherReference;
    use sigtuna_core::algorithm;

    fn data_with(cipher_data: CipherData) -> EncryptedData {
        EncryptedData {
            id: None,
            type_uri: None,
            mime_type: None,
            encoding: None,
            encryption_method: EncryptionMethod::new(algorithm::AES128_GCM),
            key_info: None,
            cipher_data,
        }
    }

    #[test]
    fn inline_value_passes() {
        let validator = DefaultPreDecryptionValidator;
        assert!(validator
            .validate_data(&data_with(CipherData::Value(vec![1, 2, 3])))
            .is_ok());
    }

    #[test]
    fn cipher_reference_rejected() {
        let validator = DefaultPreDecryptionValidator;
        let data = data_with(CipherData::Reference(CipherReference {
            uri: "#ct".into(),
            transforms: Vec::new(),
        }));
        assert!(matches!(
            validator.validate_data(&data),
            Err(Error::PreDecryptionValidation(_))
        ));
    }

    #[test]
    fn empty_cipher_value_rejected() {
        let validator = DefaultPreDecryptionValidator;
        assert!(validator
            .validate_data(&data_with(CipherData::Value(Vec::new())))
            .is_err());
    }

    #[test]
    fn empty_algorithm_rejected() {
        let validator = DefaultPreDecryptionValidator;
        let mut data = data_with(CipherData::Value(vec![1]));
        data.encryption_method.algorithm = String::new();
        assert!(validator.validate_data(&data).is_err());
    }
}
