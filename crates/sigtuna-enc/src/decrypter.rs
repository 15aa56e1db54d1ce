#![forbid(unsafe_code)]

//! The Decrypter: recovers plaintext (or a raw key) from encrypted
//! structures.
//!
//! Processing order: pre-decryption validation, algorithm resolution, key
//! recovery (direct credential, then the encrypted-key resolver chain),
//! decryption. A failed operation yields no plaintext and no partial state.

use crate::agreement;
use crate::model::{AgreementMethod, CipherData, EncryptedData, EncryptedKey, EncryptionMethod};
use crate::params::DecryptionParameters;
use crate::resolver::ResolutionContext;
use crate::unmarshal::DocumentKeyIndex;
use base64::Engine;
use sigtuna_core::{algorithm, Error};
use sigtuna_crypto::keytransport::OaepHash;
use sigtuna_crypto::{AlgorithmKind, AlgorithmRegistry, BlockCipher, KeyTransport, KeyWrap};
use sigtuna_keys::Credential;
use tracing::debug;

/// Recovers plaintext from encrypted structures. Holds configuration only;
/// one instance is safe for concurrent use by independent calls.
pub struct Decrypter {
    registry: AlgorithmRegistry,
    params: DecryptionParameters,
}

impl Decrypter {
    pub fn new(registry: AlgorithmRegistry, params: DecryptionParameters) -> Self {
        Self { registry, params }
    }

    /// Decrypt an `EncryptedData`, returning the plaintext bytes of the
    /// original element or content. `index` supplies the containing
    /// document's `EncryptedKey`s for retrieval-method resolution.
    pub fn decrypt_data(
        &self,
        encrypted_data: &EncryptedData,
        index: Option<&DocumentKeyIndex>,
    ) -> Result<Vec<u8>, Error> {
        self.params.validator.validate_data(encrypted_data)?;

        let cipher = self.data_cipher(&encrypted_data.encryption_method.algorithm)?;
        let ciphertext = inline_value(&encrypted_data.cipher_data)?;

        // Directly configured data credentials first, then any stored
        // credential the EncryptedData names via KeyName.
        let named = encrypted_data
            .key_info
            .as_ref()
            .map(|ki| ki.key_names.as_slice())
            .unwrap_or_default();
        let direct = self.params.data_credentials.iter().map(|c| c.as_ref());
        let by_name = named
            .iter()
            .filter_map(|name| self.params.kek_credentials.find_by_name(name));
        for credential in direct.chain(by_name) {
            let Some(bytes) = credential.symmetric_bytes() else {
                continue;
            };
            let Some(key) = fit_key(bytes, cipher) else {
                continue;
            };
            match cipher.decrypt(key, ciphertext) {
                Ok(plaintext) => return Ok(plaintext),
                Err(e) => debug!(
                    name = credential.name.as_deref().unwrap_or("<unnamed>"),
                    "direct data credential failed: {e}"
                ),
            }
        }

        // Resolve candidate EncryptedKeys and try each in document order.
        let ctx = ResolutionContext {
            encrypted_data,
            document_keys: index,
        };
        let candidates = self.params.resolver.resolve(&ctx, &self.params.recipients);
        if candidates.is_empty() {
            return Err(Error::Decryption(
                "no direct credential succeeded and no candidate EncryptedKey resolved".into(),
            ));
        }
        if self.params.require_unique_candidate && candidates.len() > 1 {
            return Err(Error::Decryption(format!(
                "{} candidate EncryptedKeys resolved but a unique match is required",
                candidates.len()
            )));
        }

        let mut last_error = None;
        for encrypted_key in candidates {
            match self.decrypt_key(encrypted_key, &encrypted_data.encryption_method.algorithm) {
                Ok(key) => match cipher.decrypt(&key, ciphertext) {
                    Ok(plaintext) => return Ok(plaintext),
                    Err(e) => {
                        debug!("recovered key failed to decrypt the data: {e}");
                        last_error = Some(e);
                    }
                },
                Err(e) => {
                    debug!("candidate EncryptedKey could not be processed: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(Error::Decryption(format!(
            "no resolved EncryptedKey yielded the data encryption key: {}",
            last_error.expect("at least one candidate was attempted")
        )))
    }

    /// Like [`decrypt_data`](Self::decrypt_data), but re-roots the
    /// decrypted fragment as a new, independent XML document, so that
    /// document-local ID lookups (e.g. a signature reference into the
    /// fragment) work against the result.
    pub fn decrypt_data_rooted(
        &self,
        encrypted_data: &EncryptedData,
        index: Option<&DocumentKeyIndex>,
    ) -> Result<String, Error> {
        let plaintext = self.decrypt_data(encrypted_data, index)?;
        let text = String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("decrypted content is not valid UTF-8".into()))?;

        roxmltree::Document::parse_with_options(&text, crate::unmarshal::parsing_options())
            .map_err(|e| {
            Error::Decryption(format!(
                "decrypted content does not form a well-formed document: {e}"
            ))
        })?;

        if text.trim_start().starts_with("<?xml") {
            Ok(text)
        } else {
            Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{text}"))
        }
    }

    /// Decrypt an `EncryptedKey`, returning the raw key bytes. The
    /// expected algorithm determines the required key length.
    pub fn decrypt_key(
        &self,
        encrypted_key: &EncryptedKey,
        expected_algorithm: &str,
    ) -> Result<Vec<u8>, Error> {
        self.params.validator.validate_key(encrypted_key)?;

        let wrapped = inline_value(&encrypted_key.cipher_data)?;
        let method = &encrypted_key.encryption_method;

        let key = match self.registry.get(&method.algorithm).map(|d| d.kind) {
            Some(AlgorithmKind::KeyTransport) => {
                let transport = transport_from_method(method)?;
                self.try_credentials(encrypted_key, |credential| {
                    let private = credential.rsa_private().ok_or_else(|| {
                        Error::Key("credential has no RSA private key".into())
                    })?;
                    transport.decrypt(private, wrapped)
                })?
            }
            Some(AlgorithmKind::KeyWrap) => {
                let kw = KeyWrap::from_uri(&method.algorithm)?;
                if let Some(am) = first_agreement_method(encrypted_key) {
                    let kek = agreement::complete(
                        am,
                        &self.params.kek_credentials,
                        &method.algorithm,
                        &self.registry,
                    )?;
                    kw.unwrap(&kek, wrapped)?
                } else {
                    self.try_credentials(encrypted_key, |credential| {
                        let kek = credential.symmetric_bytes().ok_or_else(|| {
                            Error::Key("credential has no symmetric key".into())
                        })?;
                        kw.unwrap(kek, wrapped)
                    })?
                }
            }
            Some(AlgorithmKind::BlockCipher) => {
                // A session key protected with a regular cipher rather than
                // a wrap algorithm.
                let cipher = BlockCipher::from_uri(&method.algorithm)?;
                self.try_credentials(encrypted_key, |credential| {
                    let kek = credential.symmetric_bytes().ok_or_else(|| {
                        Error::Key("credential has no symmetric key".into())
                    })?;
                    let kek = fit_key(kek, cipher).ok_or_else(|| {
                        Error::Key("credential does not fit the key encryption cipher".into())
                    })?;
                    cipher.decrypt(kek, wrapped)
                })?
            }
            _ => {
                return Err(Error::UnsupportedAlgorithm(format!(
                    "key encryption algorithm: {}",
                    method.algorithm
                )))
            }
        };

        // Size the recovered key for the algorithm it is destined for.
        if let Some(bits) = self.registry.key_length(expected_algorithm) {
            let wanted = bits as usize / 8;
            if key.len() < wanted {
                return Err(Error::Decryption(format!(
                    "recovered key is {} bytes but {expected_algorithm} requires {wanted}",
                    key.len()
                )));
            }
            if key.len() > wanted {
                debug!(
                    from = key.len(),
                    to = wanted,
                    "truncating recovered key to the expected algorithm's size"
                );
                return Ok(key[..wanted].to_vec());
            }
        }
        Ok(key)
    }

    fn data_cipher(&self, uri: &str) -> Result<BlockCipher, Error> {
        if !self.registry.is_kind(uri, AlgorithmKind::BlockCipher) {
            return Err(Error::UnsupportedAlgorithm(format!(
                "data decryption algorithm: {uri}"
            )));
        }
        BlockCipher::from_uri(uri)
    }

    /// Try KEK credentials against `attempt`: key-info key names first,
    /// then every remaining credential in configured order.
    fn try_credentials<F>(&self, encrypted_key: &EncryptedKey, attempt: F) -> Result<Vec<u8>, Error>
    where
        F: Fn(&Credential) -> Result<Vec<u8>, Error>,
    {
        let mut last_error = None;

        let named: Vec<&str> = encrypted_key
            .key_info
            .as_ref()
            .map(|ki| ki.key_names.iter().map(String::as_str).collect())
            .unwrap_or_default();

        for name in named.iter().copied() {
            if let Some(credential) = self.params.kek_credentials.find_by_name(name) {
                match attempt(credential) {
                    Ok(key) => return Ok(key),
                    Err(e) => {
                        debug!(name, "named KEK credential failed: {e}");
                        last_error = Some(e);
                    }
                }
            }
        }

        for credential in self.params.kek_credentials.iter() {
            if credential
                .name
                .as_deref()
                .is_some_and(|n| named.contains(&n))
            {
                continue;
            }
            match attempt(credential) {
                Ok(key) => return Ok(key),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Key("no key encryption credential available to process the EncryptedKey".into())
        }))
    }
}

/// The validator rejects references before any cryptography; this is the
/// backstop for callers that bypass it.
fn inline_value(cipher_data: &CipherData) -> Result<&[u8], Error> {
    match cipher_data {
        CipherData::Value(bytes) => Ok(bytes),
        CipherData::Reference(_) => Err(Error::PreDecryptionValidation(
            "CipherReference is not processed".into(),
        )),
    }
}

fn first_agreement_method(encrypted_key: &EncryptedKey) -> Option<&AgreementMethod> {
    encrypted_key
        .key_info
        .as_ref()
        .and_then(|ki| ki.agreement_methods.first())
}

/// Truncate an over-long key to the cipher's size; some encrypters wrap a
/// longer session key than the data algorithm consumes.
fn fit_key(bytes: &[u8], cipher: BlockCipher) -> Option<&[u8]> {
    if bytes.len() >= cipher.key_size() {
        Some(&bytes[..cipher.key_size()])
    } else {
        None
    }
}

/// Reconstruct the RSA transport from a parsed `EncryptionMethod`,
/// applying the per-URI OAEP defaulting rules: digest defaults to SHA-1;
/// the MGF is implicitly MGF1-SHA1 for `rsa-oaep-mgf1p` and defaults to
/// MGF1-SHA1 for the 1.1 URI when no `MGF` element is present.
pub(crate) fn transport_from_method(method: &EncryptionMethod) -> Result<KeyTransport, Error> {
    match method.algorithm.as_str() {
        algorithm::RSA_V15 => Ok(KeyTransport::RsaV15),
        algorithm::RSA_OAEP_MGF1P | algorithm::RSA_OAEP_ENC11 => {
            let digest_uri = method.digest_method.as_deref().unwrap_or(algorithm::SHA1);
            let mgf_uri = method.mgf.as_deref().unwrap_or(algorithm::MGF1_SHA1);
            let label = method
                .oaep_params
                .as_deref()
                .map(|text| {
                    base64::engine::general_purpose::STANDARD
                        .decode(text.split_whitespace().collect::<String>())
                        .map_err(|e| Error::Base64(format!("OAEPparams: {e}")))
                })
                .transpose()?;
            Ok(KeyTransport::RsaOaep {
                digest: OaepHash::from_digest_uri(digest_uri)?,
                mgf: OaepHash::from_mgf_uri(mgf_uri)?,
                label,
            })
        }
        other => Err(Error::UnsupportedAlgorithm(format!("key transport: {other}"))),
    }
}
