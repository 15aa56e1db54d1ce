#![forbid(unsafe_code)]

//! Key-agreement processors.
//!
//! The originator side generates an ephemeral key pair, derives a key for
//! the target algorithm, and produces the `AgreementMethod` tree that lets
//! the recipient repeat the derivation. The recipient side consumes that
//! tree together with its static private credential and must arrive at the
//! identical key.

use crate::model::{
    AgreementKeyInfo, AgreementMethod, ConcatKdfParams, KdfParams, KeyDerivationMethod,
    Pbkdf2Params, DEFAULT_CONCAT_KDF_DIGEST, DEFAULT_DH_DIGEST, DEFAULT_PBKDF2_ITERATIONS,
    DEFAULT_PBKDF2_PRF, DEFAULT_PBKDF2_SALT_LENGTH,
};
use crate::params::{KdfConfiguration, KeyAgreementConfiguration};
use rand::RngCore;
use sigtuna_core::{algorithm, ns, Error};
use sigtuna_crypto::{kdf, keyagreement, AlgorithmRegistry};
use sigtuna_keys::{Credential, CredentialResolver, KeyFamily, KeyMaterial};
use tracing::debug;

/// Result of the originator side: the derived key and the parameters the
/// recipient needs.
pub struct AgreementOutcome {
    pub key: Vec<u8>,
    pub agreement_method: AgreementMethod,
}

/// Originator side: derive a key for `target_algorithm` against the
/// recipient's public credential, generating a fresh ephemeral key pair.
pub fn originate(
    config: &KeyAgreementConfiguration,
    recipient: &Credential,
    target_algorithm: &str,
    registry: &AlgorithmRegistry,
) -> Result<AgreementOutcome, Error> {
    let key_bits = registry.key_length(target_algorithm).ok_or_else(|| {
        Error::KeyAgreement(format!(
            "cannot determine derived key length for {target_algorithm}"
        ))
    })?;

    match &recipient.material {
        KeyMaterial::Dh { p, generator, public, .. } => originate_dh(
            config,
            recipient,
            p,
            generator,
            public,
            target_algorithm,
            key_bits,
        ),
        KeyMaterial::EcP256 { .. } | KeyMaterial::EcP384 { .. } | KeyMaterial::EcP521 { .. } => {
            originate_ecdh(config, recipient, target_algorithm, key_bits)
        }
        _ => Err(Error::KeyAgreement(format!(
            "credential family {:?} does not support key agreement",
            recipient.family()
        ))),
    }
}

fn originate_dh(
    config: &KeyAgreementConfiguration,
    recipient: &Credential,
    p: &[u8],
    generator: &[u8],
    recipient_public: &[u8],
    target_algorithm: &str,
    key_bits: u32,
) -> Result<AgreementOutcome, Error> {
    let (ephemeral_private, ephemeral_public) = keyagreement::dh_generate_keypair(p, generator)?;
    let secret = keyagreement::dh_shared_secret(recipient_public, &ephemeral_private, p)?;

    let originator = AgreementKeyInfo::DhPublicKey {
        p: p.to_vec(),
        generator: generator.to_vec(),
        public: ephemeral_public,
    };
    let recipient_info = recipient
        .name
        .clone()
        .map(AgreementKeyInfo::KeyName);

    match &config.kdf {
        KdfConfiguration::Legacy { digest, nonce_length } => {
            let digest_uri = digest.as_deref().unwrap_or(DEFAULT_DH_DIGEST);
            let nonce = match nonce_length {
                Some(len) if *len > 0 => {
                    let mut bytes = vec![0u8; *len];
                    rand::thread_rng().fill_bytes(&mut bytes);
                    Some(bytes)
                }
                _ => None,
            };
            let key = kdf::dh_legacy_kdf(
                digest_uri,
                &secret,
                target_algorithm,
                nonce.as_deref().unwrap_or_default(),
                key_bits as usize,
            )?;
            Ok(AgreementOutcome {
                key,
                agreement_method: AgreementMethod {
                    algorithm: algorithm::DH.into(),
                    ka_nonce: nonce,
                    // The chosen digest is always expressed, default or not.
                    digest_method: Some(digest_uri.into()),
                    key_derivation_method: None,
                    originator_key_info: Some(originator),
                    recipient_key_info: recipient_info,
                },
            })
        }
        explicit => {
            let (kdm, key) = derive_with_explicit_kdf(explicit, &secret, key_bits)?;
            Ok(AgreementOutcome {
                key,
                agreement_method: AgreementMethod {
                    algorithm: algorithm::DH_ES.into(),
                    ka_nonce: None,
                    digest_method: None,
                    key_derivation_method: Some(kdm),
                    originator_key_info: Some(originator),
                    recipient_key_info: recipient_info,
                },
            })
        }
    }
}

fn originate_ecdh(
    config: &KeyAgreementConfiguration,
    recipient: &Credential,
    _target_algorithm: &str,
    key_bits: u32,
) -> Result<AgreementOutcome, Error> {
    if matches!(config.kdf, KdfConfiguration::Legacy { .. }) {
        return Err(Error::KeyAgreement(
            "the legacy key derivation function is not defined for ECDH-ES".into(),
        ));
    }

    let mut rng = rand::thread_rng();
    let (named_curve, ephemeral_public, secret) = match &recipient.material {
        KeyMaterial::EcP256 { public, .. } => {
            use p256::elliptic_curve::sec1::ToEncodedPoint;
            let ephemeral = p256::SecretKey::random(&mut rng);
            let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
            let secret =
                keyagreement::ecdh_p256(public.to_encoded_point(false).as_bytes(), &ephemeral)?;
            (ns::CURVE_P256, ephemeral_public.as_bytes().to_vec(), secret)
        }
        KeyMaterial::EcP384 { public, .. } => {
            use p384::elliptic_curve::sec1::ToEncodedPoint;
            let ephemeral = p384::SecretKey::random(&mut rng);
            let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
            let secret =
                keyagreement::ecdh_p384(public.to_encoded_point(false).as_bytes(), &ephemeral)?;
            (ns::CURVE_P384, ephemeral_public.as_bytes().to_vec(), secret)
        }
        KeyMaterial::EcP521 { public, .. } => {
            use p521::elliptic_curve::sec1::ToEncodedPoint;
            let ephemeral = p521::SecretKey::random(&mut rng);
            let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
            let secret =
                keyagreement::ecdh_p521(public.to_encoded_point(false).as_bytes(), &ephemeral)?;
            (ns::CURVE_P521, ephemeral_public.as_bytes().to_vec(), secret)
        }
        _ => unreachable!("caller dispatched on EC material"),
    };

    let (kdm, key) = derive_with_explicit_kdf(&config.kdf, &secret, key_bits)?;
    Ok(AgreementOutcome {
        key,
        agreement_method: AgreementMethod {
            algorithm: algorithm::ECDH_ES.into(),
            ka_nonce: None,
            digest_method: None,
            key_derivation_method: Some(kdm),
            originator_key_info: Some(AgreementKeyInfo::EcPublicKey {
                named_curve: named_curve.into(),
                public: ephemeral_public,
            }),
            recipient_key_info: recipient.name.clone().map(AgreementKeyInfo::KeyName),
        },
    })
}

/// Build the `KeyDerivationMethod` from local configuration and derive.
fn derive_with_explicit_kdf(
    config: &KdfConfiguration,
    secret: &[u8],
    key_bits: u32,
) -> Result<(KeyDerivationMethod, Vec<u8>), Error> {
    match config {
        KdfConfiguration::Concat {
            digest,
            algorithm_id,
            party_u_info,
            party_v_info,
            supp_pub_info,
            supp_priv_info,
        } => {
            let params = ConcatKdfParams {
                digest_method: digest.clone().unwrap_or_else(|| DEFAULT_CONCAT_KDF_DIGEST.into()),
                algorithm_id: algorithm_id.clone(),
                party_u_info: party_u_info.clone(),
                party_v_info: party_v_info.clone(),
                supp_pub_info: supp_pub_info.clone(),
                supp_priv_info: supp_priv_info.clone(),
            };
            let key = kdf::concat_kdf(
                &params.digest_method,
                secret,
                &params.other_info()?,
                key_bits as usize / 8,
            )?;
            Ok((
                KeyDerivationMethod {
                    algorithm: algorithm::CONCAT_KDF.into(),
                    params: KdfParams::Concat(params),
                },
                key,
            ))
        }
        KdfConfiguration::Pbkdf2 { prf, iteration_count, salt_length } => {
            let mut salt = vec![0u8; salt_length.unwrap_or(DEFAULT_PBKDF2_SALT_LENGTH)];
            rand::thread_rng().fill_bytes(&mut salt);
            let params = Pbkdf2Params {
                salt,
                iteration_count: iteration_count.unwrap_or(DEFAULT_PBKDF2_ITERATIONS),
                key_length_bits: key_bits,
                prf: prf.clone().unwrap_or_else(|| DEFAULT_PBKDF2_PRF.into()),
            };
            let key = kdf::pbkdf2(
                &params.prf,
                secret,
                &params.salt,
                params.iteration_count,
                key_bits as usize / 8,
            )?;
            Ok((
                KeyDerivationMethod {
                    algorithm: algorithm::PBKDF2.into(),
                    params: KdfParams::Pbkdf2(params),
                },
                key,
            ))
        }
        KdfConfiguration::Legacy { .. } => Err(Error::KeyAgreement(
            "legacy key derivation has no explicit KeyDerivationMethod form".into(),
        )),
    }
}

/// Recipient side: repeat the derivation described by `agreement` using the
/// recipient's static private credential.
pub fn complete(
    agreement: &AgreementMethod,
    credentials: &CredentialResolver,
    target_algorithm: &str,
    registry: &AlgorithmRegistry,
) -> Result<Vec<u8>, Error> {
    let key_bits = registry.key_length(target_algorithm).ok_or_else(|| {
        Error::KeyAgreement(format!(
            "cannot determine derived key length for {target_algorithm}"
        ))
    })?;

    match agreement.algorithm.as_str() {
        algorithm::DH => {
            let secret = dh_secret(agreement, credentials)?;
            // The digest may be omitted; classic DH has an implied default.
            let digest_uri = agreement
                .digest_method
                .as_deref()
                .unwrap_or(DEFAULT_DH_DIGEST);
            if agreement.digest_method.is_none() {
                debug!("AgreementMethod carries no DigestMethod, using the implied default");
            }
            kdf::dh_legacy_kdf(
                digest_uri,
                &secret,
                target_algorithm,
                agreement.ka_nonce.as_deref().unwrap_or_default(),
                key_bits as usize,
            )
        }
        algorithm::DH_ES => {
            let secret = dh_secret(agreement, credentials)?;
            let kdm = agreement.key_derivation_method.as_ref().ok_or_else(|| {
                Error::KeyAgreement("dh-es requires an explicit KeyDerivationMethod".into())
            })?;
            derive_from_kdm(kdm, &secret, key_bits)
        }
        algorithm::ECDH_ES => {
            let secret = ecdh_secret(agreement, credentials)?;
            let kdm = agreement.key_derivation_method.as_ref().ok_or_else(|| {
                Error::KeyAgreement("ECDH-ES requires an explicit KeyDerivationMethod".into())
            })?;
            derive_from_kdm(kdm, &secret, key_bits)
        }
        other => Err(Error::UnsupportedAlgorithm(format!("key agreement: {other}"))),
    }
}

/// Repeat a parsed `KeyDerivationMethod` over the shared secret.
fn derive_from_kdm(
    kdm: &KeyDerivationMethod,
    secret: &[u8],
    key_bits: u32,
) -> Result<Vec<u8>, Error> {
    match &kdm.params {
        KdfParams::Concat(params) => kdf::concat_kdf(
            &params.digest_method,
            secret,
            &params.other_info()?,
            key_bits as usize / 8,
        ),
        KdfParams::Pbkdf2(params) => {
            if params.key_length_bits != key_bits {
                return Err(Error::KeyDerivation(format!(
                    "PBKDF2 KeyLength {} does not match the {} bits required by the target algorithm",
                    params.key_length_bits, key_bits
                )));
            }
            kdf::pbkdf2(
                &params.prf,
                secret,
                &params.salt,
                params.iteration_count,
                key_bits as usize / 8,
            )
        }
    }
}

fn dh_secret(
    agreement: &AgreementMethod,
    credentials: &CredentialResolver,
) -> Result<Vec<u8>, Error> {
    let Some(AgreementKeyInfo::DhPublicKey { public, .. }) = &agreement.originator_key_info else {
        return Err(Error::KeyAgreement(
            "OriginatorKeyInfo does not carry a DH public key".into(),
        ));
    };

    let credential = select_recipient_credential(agreement, credentials, KeyFamily::Dh)?;
    let KeyMaterial::Dh { p, private: Some(private), .. } = &credential.material else {
        return Err(Error::Key("recipient credential is not a DH private key".into()));
    };
    keyagreement::dh_shared_secret(public, private, p)
}

fn ecdh_secret(
    agreement: &AgreementMethod,
    credentials: &CredentialResolver,
) -> Result<Vec<u8>, Error> {
    let Some(AgreementKeyInfo::EcPublicKey { named_curve, public }) =
        &agreement.originator_key_info
    else {
        return Err(Error::KeyAgreement(
            "OriginatorKeyInfo does not carry an EC public key".into(),
        ));
    };

    let credential = select_recipient_credential(agreement, credentials, KeyFamily::Ec)?;
    match (named_curve.as_str(), &credential.material) {
        (ns::CURVE_P256, KeyMaterial::EcP256 { private: Some(private), .. }) => {
            keyagreement::ecdh_p256(public, private)
        }
        (ns::CURVE_P384, KeyMaterial::EcP384 { private: Some(private), .. }) => {
            keyagreement::ecdh_p384(public, private)
        }
        (ns::CURVE_P521, KeyMaterial::EcP521 { private: Some(private), .. }) => {
            keyagreement::ecdh_p521(public, private)
        }
        (ns::CURVE_P256 | ns::CURVE_P384 | ns::CURVE_P521, _) => Err(Error::Key(
            "recipient credential does not match the originator's curve".into(),
        )),
        (other, _) => Err(Error::UnsupportedAlgorithm(format!("EC named curve: {other}"))),
    }
}

/// Pick the recipient's private credential: by `RecipientKeyInfo` key name
/// when present, otherwise the first private credential of the family.
fn select_recipient_credential<'a>(
    agreement: &AgreementMethod,
    credentials: &'a CredentialResolver,
    family: KeyFamily,
) -> Result<&'a Credential, Error> {
    if let Some(AgreementKeyInfo::KeyName(name)) = &agreement.recipient_key_info {
        return credentials
            .find_by_name(name)
            .ok_or_else(|| Error::KeyNotFound(format!("recipient credential '{name}'")));
    }
    credentials
        .private_of_family(family)
        .next()
        .ok_or_else(|| Error::Key(format!("no private {family:?} credential for key agreement")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigtuna_core::algorithm as alg;

    fn p256_recipient(name: &str) -> (Credential, CredentialResolver) {
        let mut rng = rand::thread_rng();
        let private = p256::SecretKey::random(&mut rng);
        let public = private.public_key();
        let public_cred = Credential::new(KeyMaterial::EcP256 {
            private: None,
            public,
        })
        .with_name(name);
        let mut resolver = CredentialResolver::new();
        resolver.add(
            Credential::new(KeyMaterial::EcP256 {
                private: Some(private),
                public,
            })
            .with_name(name),
        );
        (public_cred, resolver)
    }

    #[test]
    fn ecdh_concat_roundtrip() {
        let registry = AlgorithmRegistry::default();
        let (public_cred, resolver) = p256_recipient("recipient");
        let config = KeyAgreementConfiguration {
            kdf: KdfConfiguration::Concat {
                digest: None,
                algorithm_id: Some("00".into()),
                party_u_info: None,
                party_v_info: None,
                supp_pub_info: None,
                supp_priv_info: None,
            },
        };

        let outcome = originate(&config, &public_cred, alg::KW_AES128, &registry).unwrap();
        assert_eq!(outcome.key.len(), 16);
        assert_eq!(outcome.agreement_method.algorithm, alg::ECDH_ES);

        let recovered = complete(
            &outcome.agreement_method,
            &resolver,
            alg::KW_AES128,
            &registry,
        )
        .unwrap();
        assert_eq!(recovered, outcome.key);
    }

    #[test]
    fn ecdh_pbkdf2_roundtrip() {
        let registry = AlgorithmRegistry::default();
        let (public_cred, resolver) = p256_recipient("recipient");
        let config = KeyAgreementConfiguration {
            kdf: KdfConfiguration::Pbkdf2 {
                prf: None,
                iteration_count: None,
                salt_length: None,
            },
        };

        let outcome = originate(&config, &public_cred, alg::KW_AES256, &registry).unwrap();
        assert_eq!(outcome.key.len(), 32);
        let kdm = outcome.agreement_method.key_derivation_method.as_ref().unwrap();
        match &kdm.params {
            KdfParams::Pbkdf2(p) => {
                assert_eq!(p.iteration_count, DEFAULT_PBKDF2_ITERATIONS);
                assert_eq!(p.key_length_bits, 256);
            }
            KdfParams::Concat(_) => panic!("expected PBKDF2 parameters"),
        }

        let recovered = complete(
            &outcome.agreement_method,
            &resolver,
            alg::KW_AES256,
            &registry,
        )
        .unwrap();
        assert_eq!(recovered, outcome.key);
    }

    #[test]
    fn pbkdf2_key_length_mismatch_rejected() {
        let registry = AlgorithmRegistry::default();
        let (public_cred, resolver) = p256_recipient("recipient");
        let config = KeyAgreementConfiguration {
            kdf: KdfConfiguration::Pbkdf2 {
                prf: None,
                iteration_count: None,
                salt_length: None,
            },
        };

        // Derive for a 128-bit KEK, then claim a 256-bit one on completion:
        // the parsed KeyLength no longer matches the target algorithm.
        let outcome = originate(&config, &public_cred, alg::KW_AES128, &registry).unwrap();
        let err = complete(
            &outcome.agreement_method,
            &resolver,
            alg::KW_AES256,
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, Error::KeyDerivation(_)), "{err}");
    }

    #[test]
    fn legacy_kdf_rejected_for_ec() {
        let registry = AlgorithmRegistry::default();
        let (public_cred, _) = p256_recipient("recipient");
        let config = KeyAgreementConfiguration {
            kdf: KdfConfiguration::Legacy {
                digest: None,
                nonce_length: None,
            },
        };
        assert!(originate(&config, &public_cred, alg::KW_AES128, &registry).is_err());
    }
}
