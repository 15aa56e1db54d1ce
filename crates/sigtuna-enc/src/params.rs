#![forbid(unsafe_code)]

//! Per-operation parameters and the layered configuration that produces
//! them.
//!
//! `EncryptionParameters` / `DecryptionParameters` are immutable values
//! resolved once per operation from a stack of configurations plus
//! request-specific criteria. The first layer that supplies a value wins.

use crate::resolver::{ChainingEncryptedKeyResolver, EncryptedKeyResolver};
use crate::validator::{DefaultPreDecryptionValidator, PreDecryptionValidator};
use sigtuna_core::Error;
use sigtuna_crypto::{AlgorithmKind, AlgorithmRegistry};
use sigtuna_keys::{Credential, CredentialResolver, KeyFamily};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Parameters for encrypting the data itself.
#[derive(Debug, Clone)]
pub struct DataEncryptionParameters {
    /// Block cipher algorithm URI.
    pub algorithm: String,
    /// Symmetric credential; a fresh key is generated when absent.
    pub credential: Option<Arc<Credential>>,
}

impl DataEncryptionParameters {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            credential: None,
        }
    }

    pub fn with_credential(mut self, credential: Arc<Credential>) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// Parameters producing one `EncryptedKey`.
#[derive(Debug, Clone)]
pub struct KeyEncryptionParameters {
    /// Key transport or key wrap algorithm URI.
    pub algorithm: String,
    /// The recipient's key-encryption credential.
    pub credential: Arc<Credential>,
    /// Value for the `Recipient` attribute.
    pub recipient: Option<String>,
    /// Value for the `CarriedKeyName` element.
    pub carried_key_name: Option<String>,
    pub rsa_oaep: Option<RsaOaepParameters>,
    /// When set, the KEK is derived by key agreement instead of taken from
    /// the credential directly.
    pub agreement: Option<KeyAgreementConfiguration>,
}

impl KeyEncryptionParameters {
    pub fn new(algorithm: impl Into<String>, credential: Arc<Credential>) -> Self {
        Self {
            algorithm: algorithm.into(),
            credential,
            recipient: None,
            carried_key_name: None,
            rsa_oaep: None,
            agreement: None,
        }
    }
}

/// Explicit RSA-OAEP parameters. Absent members follow the per-URI
/// defaulting rules at encryption time.
#[derive(Debug, Clone, Default)]
pub struct RsaOaepParameters {
    /// Digest algorithm URI.
    pub digest: Option<String>,
    /// MGF algorithm URI.
    pub mgf: Option<String>,
    /// OAEP source parameters, base64-encoded.
    pub oaep_params: Option<String>,
}

/// Per-key-family key agreement configuration.
#[derive(Debug, Clone)]
pub struct KeyAgreementConfiguration {
    pub kdf: KdfConfiguration,
}

/// Which derivation function an agreement uses, with local overrides for
/// its parameters. Absent members take the standard defaults.
#[derive(Debug, Clone)]
pub enum KdfConfiguration {
    /// Legacy DH derivation (classic DH only).
    Legacy {
        digest: Option<String>,
        /// Length of the generated `KA-Nonce` in bytes; zero or absent
        /// means no nonce.
        nonce_length: Option<usize>,
    },
    Concat {
        digest: Option<String>,
        /// Unpadded hex strings, as in the model.
        algorithm_id: Option<String>,
        party_u_info: Option<String>,
        party_v_info: Option<String>,
        supp_pub_info: Option<String>,
        supp_priv_info: Option<String>,
    },
    Pbkdf2 {
        prf: Option<String>,
        iteration_count: Option<u32>,
        salt_length: Option<usize>,
    },
}

/// Everything one encryption operation needs.
#[derive(Debug, Clone)]
pub struct EncryptionParameters {
    pub data: DataEncryptionParameters,
    pub keys: Vec<KeyEncryptionParameters>,
}

/// Everything one decryption operation needs.
pub struct DecryptionParameters {
    /// Credentials tried directly against the `EncryptedData`.
    pub data_credentials: Vec<Arc<Credential>>,
    /// Credentials for unwrapping resolved `EncryptedKey`s.
    pub kek_credentials: CredentialResolver,
    /// Acceptable `Recipient` values; empty accepts all.
    pub recipients: HashSet<String>,
    pub resolver: Arc<dyn EncryptedKeyResolver>,
    pub validator: Arc<dyn PreDecryptionValidator>,
    /// When set, more than one resolved candidate is an error instead of
    /// first-success-wins.
    pub require_unique_candidate: bool,
}

impl DecryptionParameters {
    pub fn new(kek_credentials: CredentialResolver) -> Self {
        Self {
            data_credentials: Vec::new(),
            kek_credentials,
            recipients: HashSet::new(),
            resolver: Arc::new(ChainingEncryptedKeyResolver::default_chain()),
            validator: Arc::new(DefaultPreDecryptionValidator),
            require_unique_candidate: false,
        }
    }
}

// ── Layered configuration ────────────────────────────────────────────

/// One layer of encryption configuration. Layers are consulted in order;
/// for each aspect the first layer that supplies a value wins.
#[derive(Default)]
pub struct EncryptionConfiguration {
    /// Ranked data encryption algorithm URIs.
    pub data_encryption_algorithms: Vec<String>,
    /// Ranked key encryption algorithm URIs (transport and wrap mixed).
    pub key_encryption_algorithms: Vec<String>,
    pub data_encryption_credential: Option<Arc<Credential>>,
    pub key_encryption_credentials: Vec<Arc<Credential>>,
    pub rsa_oaep: Option<RsaOaepParameters>,
    /// Key agreement configuration per credential family.
    pub agreement: HashMap<KeyFamily, KeyAgreementConfiguration>,
}

/// Request-specific inputs merged into the resolved parameters.
#[derive(Debug, Clone, Default)]
pub struct EncryptionRequestCriteria {
    /// `Recipient` attribute stamped on every produced `EncryptedKey`.
    pub recipient: Option<String>,
}

/// Resolves layered `EncryptionConfiguration`s into one immutable
/// `EncryptionParameters` value.
pub struct EncryptionParametersResolver {
    registry: AlgorithmRegistry,
}

impl EncryptionParametersResolver {
    pub fn new(registry: AlgorithmRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(
        &self,
        layers: &[&EncryptionConfiguration],
        criteria: &EncryptionRequestCriteria,
    ) -> Result<EncryptionParameters, Error> {
        let data_algorithm = self.resolve_data_algorithm(layers)?;
        let data_credential = layers
            .iter()
            .find_map(|l| l.data_encryption_credential.clone());
        let rsa_oaep = layers.iter().find_map(|l| l.rsa_oaep.clone());

        let key_credentials = layers
            .iter()
            .find(|l| !l.key_encryption_credentials.is_empty())
            .map(|l| l.key_encryption_credentials.as_slice())
            .unwrap_or_default();

        let mut keys = Vec::with_capacity(key_credentials.len());
        for credential in key_credentials {
            let algorithm = self.resolve_key_algorithm(layers, credential)?;
            let agreement = match credential.family() {
                KeyFamily::Ec | KeyFamily::Dh => {
                    Some(self.resolve_agreement(layers, credential.family())?)
                }
                _ => None,
            };
            keys.push(KeyEncryptionParameters {
                algorithm,
                credential: Arc::clone(credential),
                recipient: criteria.recipient.clone(),
                carried_key_name: None,
                rsa_oaep: rsa_oaep.clone(),
                agreement,
            });
        }

        if data_credential.is_none() && keys.is_empty() {
            return Err(Error::Config(
                "no data encryption credential and no key encryption credentials: \
                 a generated data key would be unprotectable"
                    .into(),
            ));
        }

        Ok(EncryptionParameters {
            data: DataEncryptionParameters {
                algorithm: data_algorithm,
                credential: data_credential,
            },
            keys,
        })
    }

    fn resolve_data_algorithm(&self, layers: &[&EncryptionConfiguration]) -> Result<String, Error> {
        let ranked = layers
            .iter()
            .find(|l| !l.data_encryption_algorithms.is_empty())
            .map(|l| l.data_encryption_algorithms.as_slice())
            .unwrap_or_default();
        ranked
            .iter()
            .find(|uri| self.registry.is_kind(uri, AlgorithmKind::BlockCipher))
            .cloned()
            .ok_or_else(|| Error::Config("no usable data encryption algorithm configured".into()))
    }

    fn resolve_key_algorithm(
        &self,
        layers: &[&EncryptionConfiguration],
        credential: &Credential,
    ) -> Result<String, Error> {
        let ranked = layers
            .iter()
            .find(|l| !l.key_encryption_algorithms.is_empty())
            .map(|l| l.key_encryption_algorithms.as_slice())
            .unwrap_or_default();

        let compatible = |uri: &String| match credential.family() {
            KeyFamily::Rsa => self.registry.is_kind(uri, AlgorithmKind::KeyTransport),
            KeyFamily::Symmetric => {
                self.registry.is_kind(uri, AlgorithmKind::KeyWrap)
                    && self.registry.key_length(uri)
                        == credential.symmetric_bytes().map(|b| b.len() as u32 * 8)
            }
            // Agreement-derived KEKs feed a key wrap algorithm.
            KeyFamily::Ec | KeyFamily::Dh => self.registry.is_kind(uri, AlgorithmKind::KeyWrap),
        };

        ranked.iter().find(|uri| compatible(uri)).cloned().ok_or_else(|| {
            Error::Config(format!(
                "no configured key encryption algorithm is compatible with the {:?} credential",
                credential.family()
            ))
        })
    }

    fn resolve_agreement(
        &self,
        layers: &[&EncryptionConfiguration],
        family: KeyFamily,
    ) -> Result<KeyAgreementConfiguration, Error> {
        let config = layers
            .iter()
            .find_map(|l| l.agreement.get(&family))
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!(
                    "no key agreement configuration for the {family:?} family"
                ))
            })?;
        if matches!(config.kdf, KdfConfiguration::Legacy { .. }) && family != KeyFamily::Dh {
            return Err(Error::Config(
                "the legacy key derivation function applies to DH credentials only".into(),
            ));
        }
        Ok(config)
    }
}

/// One layer of decryption configuration.
#[derive(Default)]
pub struct DecryptionConfiguration {
    pub data_credentials: Vec<Arc<Credential>>,
    pub kek_credentials: Vec<Arc<Credential>>,
    pub recipients: HashSet<String>,
    pub resolver: Option<Arc<dyn EncryptedKeyResolver>>,
    pub validator: Option<Arc<dyn PreDecryptionValidator>>,
    pub require_unique_candidate: Option<bool>,
}

/// Request-specific inputs for decryption.
#[derive(Debug, Clone, Default)]
pub struct DecryptionRequestCriteria {
    /// Recipients merged with the configured set.
    pub recipients: HashSet<String>,
}

/// Resolves layered `DecryptionConfiguration`s into one
/// `DecryptionParameters` value.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecryptionParametersResolver;

impl DecryptionParametersResolver {
    pub fn resolve(
        &self,
        layers: &[&DecryptionConfiguration],
        criteria: &DecryptionRequestCriteria,
    ) -> Result<DecryptionParameters, Error> {
        let data_credentials = layers
            .iter()
            .find(|l| !l.data_credentials.is_empty())
            .map(|l| l.data_credentials.clone())
            .unwrap_or_default();

        let mut kek_credentials = CredentialResolver::new();
        if let Some(layer) = layers.iter().find(|l| !l.kek_credentials.is_empty()) {
            for credential in &layer.kek_credentials {
                kek_credentials.add(Arc::clone(credential));
            }
        }

        let mut recipients: HashSet<String> = layers
            .iter()
            .find(|l| !l.recipients.is_empty())
            .map(|l| l.recipients.clone())
            .unwrap_or_default();
        recipients.extend(criteria.recipients.iter().cloned());

        let resolver = layers
            .iter()
            .find_map(|l| l.resolver.clone())
            .unwrap_or_else(|| Arc::new(ChainingEncryptedKeyResolver::default_chain()));
        let validator = layers
            .iter()
            .find_map(|l| l.validator.clone())
            .unwrap_or_else(|| Arc::new(DefaultPreDecryptionValidator));
        let require_unique_candidate = layers
            .iter()
            .find_map(|l| l.require_unique_candidate)
            .unwrap_or(false);

        Ok(DecryptionParameters {
            data_credentials,
            kek_credentials,
            recipients,
            resolver,
            validator,
            require_unique_candidate,
        })
    }
}
