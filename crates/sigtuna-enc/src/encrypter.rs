#![forbid(unsafe_code)]

//! The Encrypter: turns plaintext XML (or a raw key) into a complete
//! `EncryptedData` / `EncryptedKey` tree.

use crate::agreement;
use crate::model::{
    CipherData, EncryptedData, EncryptedKey, EncryptionMethod, KeyInfo, ReferenceList,
};
use crate::params::{EncryptionParameters, KeyEncryptionParameters, RsaOaepParameters};
use base64::Engine;
use rand::RngCore;
use sigtuna_core::{algorithm, ns, Error};
use sigtuna_crypto::keytransport::OaepHash;
use sigtuna_crypto::{AlgorithmKind, AlgorithmRegistry, BlockCipher, KeyTransport, KeyWrap};
use tracing::debug;

/// Produces encrypted structures. Holds configuration only; one instance
/// is safe for concurrent use by independent calls.
#[derive(Debug, Clone, Default)]
pub struct Encrypter {
    registry: AlgorithmRegistry,
}

impl Encrypter {
    pub fn new(registry: AlgorithmRegistry) -> Self {
        Self { registry }
    }

    /// Encrypt a whole element. `element_xml` is the serialized element;
    /// the result carries `Type = ...#Element`.
    pub fn encrypt_element(
        &self,
        element_xml: &str,
        params: &EncryptionParameters,
    ) -> Result<EncryptedData, Error> {
        // Parse once so malformed input fails here, not at decryption.
        roxmltree::Document::parse_with_options(element_xml, crate::unmarshal::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))?;
        self.encrypt_bytes(element_xml.trim().as_bytes(), ns::TYPE_ELEMENT, params)
    }

    /// Encrypt only the content of an element. The element's child nodes
    /// are the plaintext; the result carries `Type = ...#Content`.
    pub fn encrypt_content(
        &self,
        element_xml: &str,
        params: &EncryptionParameters,
    ) -> Result<EncryptedData, Error> {
        let content = element_content(element_xml)?;
        self.encrypt_bytes(content.as_bytes(), ns::TYPE_CONTENT, params)
    }

    /// Key-only entry point: one `EncryptedKey` per parameter set, for
    /// callers that manage the data encryption themselves.
    pub fn encrypt_key(
        &self,
        key: &[u8],
        key_params: &[KeyEncryptionParameters],
    ) -> Result<Vec<EncryptedKey>, Error> {
        key_params
            .iter()
            .map(|kp| self.encrypt_key_with(key, kp))
            .collect()
    }

    fn encrypt_bytes(
        &self,
        plaintext: &[u8],
        type_uri: &str,
        params: &EncryptionParameters,
    ) -> Result<EncryptedData, Error> {
        let cipher = self.data_cipher(&params.data.algorithm)?;
        let data_key = self.resolve_data_key(cipher, params)?;
        let ciphertext = cipher.encrypt(&data_key, plaintext)?;

        let mut key_info = KeyInfo::default();
        if let Some(credential) = &params.data.credential {
            if let Some(name) = &credential.name {
                key_info.key_names.push(name.clone());
            }
        }
        for kp in &params.keys {
            key_info.encrypted_keys.push(self.encrypt_key_with(&data_key, kp)?);
        }

        Ok(EncryptedData {
            id: None,
            type_uri: Some(type_uri.to_owned()),
            mime_type: None,
            encoding: None,
            encryption_method: EncryptionMethod::new(&params.data.algorithm),
            key_info: (!key_info.is_empty()).then_some(key_info),
            cipher_data: CipherData::Value(ciphertext),
        })
    }

    fn data_cipher(&self, uri: &str) -> Result<BlockCipher, Error> {
        if !self.registry.is_kind(uri, AlgorithmKind::BlockCipher) {
            return Err(Error::UnsupportedAlgorithm(format!(
                "data encryption algorithm: {uri}"
            )));
        }
        BlockCipher::from_uri(uri)
    }

    /// The data-encryption key: taken from the credential when supplied,
    /// generated otherwise. A generated key with nothing to protect it
    /// would be unrecoverable, so that case is refused.
    fn resolve_data_key(
        &self,
        cipher: BlockCipher,
        params: &EncryptionParameters,
    ) -> Result<Vec<u8>, Error> {
        if let Some(credential) = &params.data.credential {
            let bytes = credential.symmetric_bytes().ok_or_else(|| {
                Error::Encryption("data encryption credential is not a symmetric key".into())
            })?;
            if bytes.len() != cipher.key_size() {
                return Err(Error::Encryption(format!(
                    "data encryption credential is {} bytes but {} requires {}",
                    bytes.len(),
                    cipher.uri(),
                    cipher.key_size()
                )));
            }
            return Ok(bytes.to_vec());
        }

        if params.keys.is_empty() {
            return Err(Error::Encryption(
                "refusing to generate a data encryption key with no key encryption \
                 parameters to protect it"
                    .into(),
            ));
        }
        debug!(algorithm = cipher.uri(), "generating fresh data encryption key");
        let mut key = vec![0u8; cipher.key_size()];
        rand::thread_rng().fill_bytes(&mut key);
        Ok(key)
    }

    /// Produce one `EncryptedKey` for `key` under the given parameters.
    fn encrypt_key_with(
        &self,
        key: &[u8],
        kp: &KeyEncryptionParameters,
    ) -> Result<EncryptedKey, Error> {
        let mut key_info = KeyInfo::default();
        let (encryption_method, ciphertext) = match self.registry.get(&kp.algorithm).map(|d| d.kind)
        {
            Some(AlgorithmKind::KeyTransport) => {
                let (transport, method) = transport_for(&kp.algorithm, kp.rsa_oaep.as_ref())?;
                let public_key = kp.credential.rsa_public().ok_or_else(|| {
                    Error::Key("key transport requires an RSA public credential".into())
                })?;
                if let Some(name) = &kp.credential.name {
                    key_info.key_names.push(name.clone());
                }
                (method, transport.encrypt(public_key, key)?)
            }
            Some(AlgorithmKind::KeyWrap) => {
                let kw = KeyWrap::from_uri(&kp.algorithm)?;
                let wrapped = if let Some(agreement_config) = &kp.agreement {
                    let outcome = agreement::originate(
                        agreement_config,
                        &kp.credential,
                        &kp.algorithm,
                        &self.registry,
                    )?;
                    key_info.agreement_methods.push(outcome.agreement_method);
                    kw.wrap(&outcome.key, key)?
                } else {
                    let kek = kp.credential.symmetric_bytes().ok_or_else(|| {
                        Error::Key("key wrap requires a symmetric credential".into())
                    })?;
                    if let Some(name) = &kp.credential.name {
                        key_info.key_names.push(name.clone());
                    }
                    kw.wrap(kek, key)?
                };
                (EncryptionMethod::new(&kp.algorithm), wrapped)
            }
            _ => {
                return Err(Error::UnsupportedAlgorithm(format!(
                    "key encryption algorithm: {}",
                    kp.algorithm
                )))
            }
        };

        Ok(EncryptedKey {
            id: None,
            type_uri: None,
            mime_type: None,
            encoding: None,
            encryption_method,
            key_info: (!key_info.is_empty()).then_some(key_info),
            cipher_data: CipherData::Value(ciphertext),
            recipient: kp.recipient.clone(),
            carried_key_name: kp.carried_key_name.clone(),
            reference_list: None,
        })
    }
}

/// Attach data/key reference URIs to an `EncryptedKey` after the fact, for
/// callers that assemble multi-recipient structures themselves.
pub fn with_reference_list(
    mut key: EncryptedKey,
    data_references: Vec<String>,
    key_references: Vec<String>,
) -> EncryptedKey {
    key.reference_list = Some(ReferenceList {
        data_references,
        key_references,
    });
    key
}

/// Resolve the effective RSA transport and the `EncryptionMethod` children
/// to express for it.
///
/// For `rsa-oaep-mgf1p` the digest defaults to SHA-1 and no MGF element is
/// ever emitted (MGF1 with SHA-1 is implicit in the algorithm itself). For
/// the 1.1 `rsa-oaep` URI the digest defaults to SHA-1 and the MGF to
/// MGF1-SHA1, each independently overridable; defaults are expressed
/// explicitly to maximize interoperability.
pub(crate) fn transport_for(
    algorithm_uri: &str,
    oaep: Option<&RsaOaepParameters>,
) -> Result<(KeyTransport, EncryptionMethod), Error> {
    match algorithm_uri {
        algorithm::RSA_V15 => Ok((KeyTransport::RsaV15, EncryptionMethod::new(algorithm_uri))),
        algorithm::RSA_OAEP_MGF1P | algorithm::RSA_OAEP_ENC11 => {
            let digest_uri = oaep
                .and_then(|p| p.digest.as_deref())
                .unwrap_or(algorithm::SHA1);
            let explicit_mgf = oaep.and_then(|p| p.mgf.as_deref());
            let label_b64 = oaep.and_then(|p| p.oaep_params.clone());
            let label = label_b64
                .as_deref()
                .map(|text| {
                    base64::engine::general_purpose::STANDARD
                        .decode(text.split_whitespace().collect::<String>())
                        .map_err(|e| Error::Base64(format!("OAEPparams: {e}")))
                })
                .transpose()?;

            let mut method = EncryptionMethod::new(algorithm_uri);
            method.digest_method = Some(digest_uri.to_owned());
            method.oaep_params = label_b64;

            let mgf_uri = if algorithm_uri == algorithm::RSA_OAEP_ENC11 {
                let uri = explicit_mgf.unwrap_or(algorithm::MGF1_SHA1);
                method.mgf = Some(uri.to_owned());
                uri
            } else {
                // Honored for the computation when supplied, never emitted.
                explicit_mgf.unwrap_or(algorithm::MGF1_SHA1)
            };

            let transport = KeyTransport::RsaOaep {
                digest: OaepHash::from_digest_uri(digest_uri)?,
                mgf: OaepHash::from_mgf_uri(mgf_uri)?,
                label,
            };
            Ok((transport, method))
        }
        other => Err(Error::UnsupportedAlgorithm(format!("key transport: {other}"))),
    }
}

/// Extract the serialized content (all child nodes) of the root element.
fn element_content(element_xml: &str) -> Result<String, Error> {
    let doc = roxmltree::Document::parse_with_options(element_xml, crate::unmarshal::parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    let root = doc.root_element();
    let mut children = root.children();
    let Some(first) = children.next() else {
        return Ok(String::new());
    };
    let last = children.last().unwrap_or(first);
    Ok(element_xml[first.range().start..last.range().end].to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DataEncryptionParameters;
    use sigtuna_keys::{Credential, KeyMaterial};
    use std::sync::Arc;

    fn aes_params(len: usize) -> EncryptionParameters {
        let algorithm_uri = match len {
            16 => algorithm::AES128_GCM,
            24 => algorithm::AES192_GCM,
            _ => algorithm::AES256_GCM,
        };
        EncryptionParameters {
            data: DataEncryptionParameters::new(algorithm_uri).with_credential(Arc::new(
                Credential::new(KeyMaterial::Symmetric(vec![0x42u8; len])).with_name("data-key"),
            )),
            keys: Vec::new(),
        }
    }

    #[test]
    fn element_encryption_produces_inline_value() {
        let encrypter = Encrypter::default();
        let data = encrypter
            .encrypt_element("<doc><secret/></doc>", &aes_params(16))
            .unwrap();
        assert_eq!(data.type_uri.as_deref(), Some(ns::TYPE_ELEMENT));
        assert!(matches!(data.cipher_data, CipherData::Value(ref v) if !v.is_empty()));
        assert_eq!(data.key_info.unwrap().key_names, ["data-key"]);
    }

    #[test]
    fn content_extraction_excludes_the_element_itself() {
        let content = element_content("<doc><a/>text<b/></doc>").unwrap();
        assert_eq!(content, "<a/>text<b/>");
        assert_eq!(element_content("<doc/>").unwrap(), "");
    }

    #[test]
    fn generated_key_without_protection_is_refused() {
        let encrypter = Encrypter::default();
        let params = EncryptionParameters {
            data: DataEncryptionParameters::new(algorithm::AES128_GCM),
            keys: Vec::new(),
        };
        assert!(matches!(
            encrypter.encrypt_element("<doc/>", &params),
            Err(Error::Encryption(_))
        ));
    }

    #[test]
    fn oaep_10_defaults_emit_sha1_and_no_mgf() {
        let (_, method) = transport_for(algorithm::RSA_OAEP_MGF1P, None).unwrap();
        assert_eq!(method.digest_method.as_deref(), Some(algorithm::SHA1));
        assert!(method.mgf.is_none());
    }

    #[test]
    fn oaep_11_defaults_emit_sha1_and_mgf1_sha1() {
        let (_, method) = transport_for(algorithm::RSA_OAEP_ENC11, None).unwrap();
        assert_eq!(method.digest_method.as_deref(), Some(algorithm::SHA1));
        assert_eq!(method.mgf.as_deref(), Some(algorithm::MGF1_SHA1));
    }

    #[test]
    fn oaep_overrides_are_independent() {
        let oaep = RsaOaepParameters {
            digest: Some(algorithm::SHA256.into()),
            mgf: Some(algorithm::MGF1_SHA256.into()),
            oaep_params: Some("9lWu3Q==".into()),
        };
        let (transport, method) = transport_for(algorithm::RSA_OAEP_ENC11, Some(&oaep)).unwrap();
        assert_eq!(method.digest_method.as_deref(), Some(algorithm::SHA256));
        assert_eq!(method.mgf.as_deref(), Some(algorithm::MGF1_SHA256));
        assert_eq!(method.oaep_params.as_deref(), Some("9lWu3Q=="));
        match transport {
            KeyTransport::RsaOaep { digest, mgf, label } => {
                assert_eq!(digest, OaepHash::Sha256);
                assert_eq!(mgf, OaepHash::Sha256);
                assert_eq!(label.unwrap(), [0xf6, 0x55, 0xae, 0xdd]);
            }
            KeyTransport::RsaV15 => panic!("expected OAEP"),
        }
    }
}
