//! End-to-end round trips: encrypt, marshal to XML, parse back, decrypt.

use sigtuna_core::{algorithm, ns};
use sigtuna_enc::marshal::{marshal_encrypted_data, marshal_encrypted_key};
use sigtuna_enc::{
    parse_document, parse_encrypted_data, parse_encrypted_key, DataEncryptionParameters,
    Decrypter, DecryptionParameters, Encrypter, EncryptionParameters, KeyEncryptionParameters,
    RsaOaepParameters,
};
use sigtuna_crypto::AlgorithmRegistry;
use sigtuna_keys::{Credential, CredentialResolver, KeyMaterial};
use std::sync::{Arc, OnceLock};

const PAYLOAD: &str = r#"<records xmlns="urn:example:payroll"><entry name="alice" salary="42"/><entry name="bob" salary="17"/></records>"#;

const DATA_ALGORITHMS: &[(&str, usize)] = &[
    (algorithm::AES128_CBC, 16),
    (algorithm::AES192_CBC, 24),
    (algorithm::AES256_CBC, 32),
    (algorithm::AES128_GCM, 16),
    (algorithm::AES192_GCM, 24),
    (algorithm::AES256_GCM, 32),
];

fn rsa_credential() -> Arc<Credential> {
    static KEY: OnceLock<Arc<Credential>> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let private = rsa::RsaPrivateKey::new(&mut rng, 2048).expect("RSA keygen");
        let public = private.to_public_key();
        Arc::new(
            Credential::new(KeyMaterial::Rsa {
                private: Some(private),
                public,
            })
            .with_name("rsa-recipient"),
        )
    })
    .clone()
}

fn symmetric(len: usize, name: &str) -> Arc<Credential> {
    let bytes: Vec<u8> = (0..len).map(|i| (i * 31 + 7) as u8).collect();
    Arc::new(Credential::new(KeyMaterial::Symmetric(bytes)).with_name(name))
}

fn decrypter_with(credentials: Vec<Arc<Credential>>) -> Decrypter {
    let mut resolver = CredentialResolver::new();
    for credential in credentials {
        resolver.add(credential);
    }
    Decrypter::new(
        AlgorithmRegistry::default(),
        DecryptionParameters::new(resolver),
    )
}

#[test]
fn direct_symmetric_roundtrip_all_data_algorithms() {
    let encrypter = Encrypter::default();
    for &(uri, len) in DATA_ALGORITHMS {
        let key = symmetric(len, "session");
        let params = EncryptionParameters {
            data: DataEncryptionParameters::new(uri).with_credential(Arc::clone(&key)),
            keys: Vec::new(),
        };
        let encrypted = encrypter.encrypt_element(PAYLOAD, &params).unwrap();
        let xml = marshal_encrypted_data(&encrypted);
        let reparsed = parse_encrypted_data(&xml).unwrap();

        let mut dparams = DecryptionParameters::new(CredentialResolver::new());
        dparams.data_credentials.push(key);
        let decrypter = Decrypter::new(AlgorithmRegistry::default(), dparams);

        let plaintext = decrypter.decrypt_data(&reparsed, None).unwrap();
        assert_eq!(String::from_utf8(plaintext).unwrap(), PAYLOAD, "{uri}");
    }
}

#[test]
fn key_wrap_roundtrip_all_data_algorithms() {
    let encrypter = Encrypter::default();
    let kek = symmetric(32, "kek");
    for &(uri, _) in DATA_ALGORITHMS {
        let params = EncryptionParameters {
            data: DataEncryptionParameters::new(uri),
            keys: vec![KeyEncryptionParameters::new(
                algorithm::KW_AES256,
                Arc::clone(&kek),
            )],
        };
        let encrypted = encrypter.encrypt_element(PAYLOAD, &params).unwrap();
        let xml = marshal_encrypted_data(&encrypted);
        let reparsed = parse_encrypted_data(&xml).unwrap();

        let decrypter = decrypter_with(vec![Arc::clone(&kek)]);
        let plaintext = decrypter.decrypt_data(&reparsed, None).unwrap();
        assert_eq!(String::from_utf8(plaintext).unwrap(), PAYLOAD, "{uri}");
    }
}

#[test]
fn rsa_transport_roundtrip_all_variants() {
    let encrypter = Encrypter::default();
    let rsa = rsa_credential();
    for transport in [
        algorithm::RSA_V15,
        algorithm::RSA_OAEP_MGF1P,
        algorithm::RSA_OAEP_ENC11,
    ] {
        let params = EncryptionParameters {
            data: DataEncryptionParameters::new(algorithm::AES256_GCM),
            keys: vec![KeyEncryptionParameters::new(transport, Arc::clone(&rsa))],
        };
        let encrypted = encrypter.encrypt_element(PAYLOAD, &params).unwrap();
        let xml = marshal_encrypted_data(&encrypted);
        let reparsed = parse_encrypted_data(&xml).unwrap();

        let decrypter = decrypter_with(vec![Arc::clone(&rsa)]);
        let plaintext = decrypter.decrypt_data(&reparsed, None).unwrap();
        assert_eq!(String::from_utf8(plaintext).unwrap(), PAYLOAD, "{transport}");
    }
}

#[test]
fn content_encryption_roundtrip() {
    let encrypter = Encrypter::default();
    let key = symmetric(16, "session");
    let params = EncryptionParameters {
        data: DataEncryptionParameters::new(algorithm::AES128_GCM)
            .with_credential(Arc::clone(&key)),
        keys: Vec::new(),
    };
    let encrypted = encrypter.encrypt_content(PAYLOAD, &params).unwrap();
    assert_eq!(encrypted.type_uri.as_deref(), Some(ns::TYPE_CONTENT));

    let xml = marshal_encrypted_data(&encrypted);
    let reparsed = parse_encrypted_data(&xml).unwrap();

    let mut dparams = DecryptionParameters::new(CredentialResolver::new());
    dparams.data_credentials.push(key);
    let decrypter = Decrypter::new(AlgorithmRegistry::default(), dparams);
    let plaintext = String::from_utf8(decrypter.decrypt_data(&reparsed, None).unwrap()).unwrap();
    assert!(plaintext.starts_with("<entry"));
    assert!(plaintext.ends_with("/>"));
    assert!(!plaintext.contains("records"));
}

#[test]
fn oaep_parameters_roundtrip_through_xml() {
    let encrypter = Encrypter::default();
    let rsa = rsa_credential();
    let session_key = [0x5au8; 32];

    let mut kp = KeyEncryptionParameters::new(algorithm::RSA_OAEP_ENC11, Arc::clone(&rsa));
    kp.rsa_oaep = Some(RsaOaepParameters {
        digest: Some(algorithm::SHA256.into()),
        mgf: Some(algorithm::MGF1_SHA256.into()),
        oaep_params: Some("9lWu3Q==".into()),
    });

    let keys = encrypter.encrypt_key(&session_key, &[kp]).unwrap();
    let xml = marshal_encrypted_key(&keys[0]);
    assert!(xml.contains("9lWu3Q=="));

    let reparsed = parse_encrypted_key(&xml).unwrap();
    let method = &reparsed.encryption_method;
    assert_eq!(method.digest_method.as_deref(), Some(algorithm::SHA256));
    assert_eq!(method.mgf.as_deref(), Some(algorithm::MGF1_SHA256));
    assert_eq!(method.oaep_params.as_deref(), Some("9lWu3Q=="));

    let decrypter = decrypter_with(vec![rsa]);
    let recovered = decrypter
        .decrypt_key(&reparsed, algorithm::AES256_GCM)
        .unwrap();
    assert_eq!(recovered, session_key);
}

#[test]
fn encrypt_key_for_multiple_recipients() {
    let encrypter = Encrypter::default();
    let kek_foo = symmetric(16, "kek-foo");
    let kek_bar = symmetric(24, "kek-bar");
    let session_key = [0x33u8; 16];

    let mut for_foo = KeyEncryptionParameters::new(algorithm::KW_AES128, Arc::clone(&kek_foo));
    for_foo.recipient = Some("foo".into());
    let mut for_bar = KeyEncryptionParameters::new(algorithm::KW_AES192, Arc::clone(&kek_bar));
    for_bar.recipient = Some("bar".into());

    let keys = encrypter
        .encrypt_key(&session_key, &[for_foo, for_bar])
        .unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].recipient.as_deref(), Some("foo"));
    assert_eq!(keys[1].recipient.as_deref(), Some("bar"));

    for (ek, kek) in keys.iter().zip([kek_foo, kek_bar]) {
        let reparsed = parse_encrypted_key(&marshal_encrypted_key(ek)).unwrap();
        let decrypter = decrypter_with(vec![kek]);
        assert_eq!(
            decrypter
                .decrypt_key(&reparsed, algorithm::AES128_GCM)
                .unwrap(),
            session_key
        );
    }
}

#[test]
fn named_data_credential_is_found_in_the_store() {
    // The EncryptedData names its key via KeyName; the decrypter finds it
    // in the credential store without an explicit data credential.
    let encrypter = Encrypter::default();
    let key = symmetric(32, "shared-session-key");
    let params = EncryptionParameters {
        data: DataEncryptionParameters::new(algorithm::AES256_GCM)
            .with_credential(Arc::clone(&key)),
        keys: Vec::new(),
    };
    let encrypted = encrypter.encrypt_element(PAYLOAD, &params).unwrap();
    let xml = marshal_encrypted_data(&encrypted);
    assert!(xml.contains("<ds:KeyName>shared-session-key</ds:KeyName>"));

    let reparsed = parse_encrypted_data(&xml).unwrap();
    let decrypter = decrypter_with(vec![key]);
    let plaintext = decrypter.decrypt_data(&reparsed, None).unwrap();
    assert_eq!(String::from_utf8(plaintext).unwrap(), PAYLOAD);
}

#[test]
fn reference_list_and_carried_key_name_roundtrip() {
    let encrypter = Encrypter::default();
    let kek = symmetric(16, "kek");
    let session_key = [0x44u8; 16];

    let mut kp = KeyEncryptionParameters::new(algorithm::KW_AES128, Arc::clone(&kek));
    kp.carried_key_name = Some("session-key-7".into());
    let keys = encrypter.encrypt_key(&session_key, &[kp]).unwrap();
    let shared = sigtuna_enc::encrypter::with_reference_list(
        keys.into_iter().next().unwrap(),
        vec!["#ed-1".into(), "#ed-2".into()],
        Vec::new(),
    );

    let reparsed = parse_encrypted_key(&marshal_encrypted_key(&shared)).unwrap();
    assert_eq!(reparsed.carried_key_name.as_deref(), Some("session-key-7"));
    let list = reparsed.reference_list.as_ref().unwrap();
    assert_eq!(list.data_references, ["#ed-1", "#ed-2"]);

    let decrypter = decrypter_with(vec![kek]);
    assert_eq!(
        decrypter
            .decrypt_key(&reparsed, algorithm::AES128_CBC)
            .unwrap(),
        session_key
    );
}

#[test]
fn wrong_kek_never_yields_plaintext() {
    let encrypter = Encrypter::default();
    let right = symmetric(32, "right");
    let wrong = symmetric(32, "wrong-key-material");

    let params = EncryptionParameters {
        data: DataEncryptionParameters::new(algorithm::AES128_GCM),
        keys: vec![KeyEncryptionParameters::new(
            algorithm::KW_AES256,
            Arc::clone(&right),
        )],
    };
    let encrypted = encrypter.encrypt_element(PAYLOAD, &params).unwrap();
    let reparsed = parse_encrypted_data(&marshal_encrypted_data(&encrypted)).unwrap();

    let decrypter = decrypter_with(vec![wrong]);
    let err = decrypter.decrypt_data(&reparsed, None).unwrap_err();
    assert!(matches!(err, sigtuna_core::Error::Decryption(_)), "{err}");

    let decrypter = decrypter_with(vec![right]);
    decrypter.decrypt_data(&reparsed, None).unwrap();
}

#[test]
fn recipient_filter_selects_the_right_key() {
    let encrypter = Encrypter::default();
    let kek_foo = symmetric(16, "kek-foo");
    let kek_bar = symmetric(16, "kek-bar");

    let mut for_foo = KeyEncryptionParameters::new(algorithm::KW_AES128, Arc::clone(&kek_foo));
    for_foo.recipient = Some("foo".into());
    let mut for_bar = KeyEncryptionParameters::new(algorithm::KW_AES128, Arc::clone(&kek_bar));
    for_bar.recipient = Some("bar".into());

    let params = EncryptionParameters {
        data: DataEncryptionParameters::new(algorithm::AES128_CBC),
        keys: vec![for_foo, for_bar],
    };
    let encrypted = encrypter.encrypt_element(PAYLOAD, &params).unwrap();
    let reparsed = parse_encrypted_data(&marshal_encrypted_data(&encrypted)).unwrap();

    // Holding only foo's KEK and filtering to foo succeeds.
    let mut resolver = CredentialResolver::new();
    resolver.add(Arc::clone(&kek_foo));
    let mut dparams = DecryptionParameters::new(resolver);
    dparams.recipients.insert("foo".into());
    let decrypter = Decrypter::new(AlgorithmRegistry::default(), dparams);
    decrypter.decrypt_data(&reparsed, None).unwrap();

    // Filtering to bar while holding only foo's KEK fails: foo's key is
    // excluded by the filter, bar's cannot be unwrapped.
    let mut resolver = CredentialResolver::new();
    resolver.add(kek_foo);
    let mut dparams = DecryptionParameters::new(resolver);
    dparams.recipients.insert("bar".into());
    let decrypter = Decrypter::new(AlgorithmRegistry::default(), dparams);
    assert!(decrypter.decrypt_data(&reparsed, None).is_err());
}

#[test]
fn retrieval_method_resolution_within_a_document() {
    let encrypter = Encrypter::default();
    let kek = symmetric(16, "kek");

    // Encrypt normally, then rebuild the document with the EncryptedKey
    // detached and referenced by RetrievalMethod.
    let params = EncryptionParameters {
        data: DataEncryptionParameters::new(algorithm::AES128_GCM),
        keys: vec![KeyEncryptionParameters::new(
            algorithm::KW_AES128,
            Arc::clone(&kek),
        )],
    };
    let encrypted = encrypter.encrypt_element(PAYLOAD, &params).unwrap();
    let mut detached_key = encrypted.key_info.clone().unwrap().encrypted_keys[0].clone();
    detached_key.id = Some("shared-ek".into());

    let mut inline_free = encrypted.clone();
    inline_free.key_info = Some(sigtuna_enc::KeyInfo {
        retrieval_methods: vec![sigtuna_enc::RetrievalMethod {
            uri: "#shared-ek".into(),
            type_uri: Some(ns::TYPE_ENCRYPTED_KEY.into()),
            transforms: Vec::new(),
        }],
        ..sigtuna_enc::KeyInfo::default()
    });

    let document = format!(
        "<wrapper>{}{}</wrapper>",
        marshal_encrypted_key(&detached_key),
        marshal_encrypted_data(&inline_free),
    );
    let parsed = parse_document(&document).unwrap();

    let decrypter = decrypter_with(vec![kek]);
    let plaintext = decrypter
        .decrypt_data(&parsed.encrypted_data, Some(&parsed.key_index))
        .unwrap();
    assert_eq!(String::from_utf8(plaintext).unwrap(), PAYLOAD);
}
