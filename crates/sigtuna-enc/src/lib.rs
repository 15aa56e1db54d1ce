#![forbid(unsafe_code)]

//! XML Encryption (XML-Enc 1.0 and the 1.1 extensions) for Sigtuna.
//!
//! The crate provides the typed model of the `xenc`/`xenc11` element set,
//! an [`Encrypter`]/[`Decrypter`] pair orchestrating the cryptography, the
//! key-agreement processors (classic DH, DH with explicit KDF, ECDH-ES),
//! a composable [`resolver::EncryptedKeyResolver`] chain for locating the
//! right `EncryptedKey`, and pre-decryption validation of untrusted input.
//!
//! Everything is synchronous and per-call: Encrypter and Decrypter hold
//! configuration only and may be shared freely across threads.

pub mod agreement;
pub mod decrypter;
pub mod encrypter;
pub mod marshal;
pub mod model;
pub mod params;
pub mod resolver;
pub mod unmarshal;
pub mod validator;

pub use decrypter::Decrypter;
pub use encrypter::Encrypter;
pub use model::{
    AgreementKeyInfo, AgreementMethod, CipherData, CipherReference, ConcatKdfParams,
    EncryptedData, EncryptedKey, EncryptionMethod, KdfParams, KeyDerivationMethod, KeyInfo,
    Pbkdf2Params, ReferenceList, RetrievalMethod,
};
pub use params::{
    DataEncryptionParameters, DecryptionConfiguration, DecryptionParameters,
    DecryptionParametersResolver, DecryptionRequestCriteria, EncryptionConfiguration,
    EncryptionParameters, EncryptionParametersResolver, EncryptionRequestCriteria,
    KdfConfiguration, KeyAgreementConfiguration, KeyEncryptionParameters, RsaOaepParameters,
};
pub use resolver::{
    ChainingEncryptedKeyResolver, EncryptedKeyResolver, InlineEncryptedKeyResolver,
    ResolutionContext, RetrievalMethodEncryptedKeyResolver,
};
pub use unmarshal::{parse_document, parse_encrypted_data, parse_encrypted_key, DocumentKeyIndex};
pub use validator::{DefaultPreDecryptionValidator, PreDecryptionValidator};
