#![forbid(unsafe_code)]

//! Unmarshalling of XML text into the typed model.
//!
//! Parsing is done with `roxmltree`; DTDs are allowed because the parser
//! performs no external entity expansion. `Id` attributes of every
//! `EncryptedKey` in a document are indexed so retrieval-method references
//! can be resolved without touching the document again.

use crate::model::{
    AgreementKeyInfo, AgreementMethod, CipherData, CipherReference, ConcatKdfParams,
    EncryptedData, EncryptedKey, EncryptionMethod, KdfParams, KeyDerivationMethod, KeyInfo,
    Pbkdf2Params, ReferenceList, RetrievalMethod,
};
use base64::Engine;
use sigtuna_core::{algorithm, ns, Error};
use std::collections::HashMap;

/// roxmltree options used for all documents this engine parses.
///
/// DTDs are tolerated: roxmltree substitutes only internal entities and the
/// five predefined ones, so no external fetch can occur.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Every `EncryptedKey` of one document, indexed by its `Id` attribute.
#[derive(Debug, Default)]
pub struct DocumentKeyIndex {
    by_id: HashMap<String, EncryptedKey>,
}

impl DocumentKeyIndex {
    pub fn get(&self, id: &str) -> Option<&EncryptedKey> {
        self.by_id.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn insert(&mut self, id: impl Into<String>, key: EncryptedKey) {
        self.by_id.insert(id.into(), key);
    }
}

/// An `EncryptedData` together with the key index of its document.
#[derive(Debug)]
pub struct ParsedDocument {
    pub encrypted_data: EncryptedData,
    pub key_index: DocumentKeyIndex,
}

/// Parse a document and extract its first `EncryptedData`, indexing every
/// `EncryptedKey` found anywhere in the document.
pub fn parse_document(xml: &str) -> Result<ParsedDocument, Error> {
    let doc = roxmltree::Document::parse_with_options(xml, parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;

    let data_node = doc
        .descendants()
        .find(|n| is_element(n, ns::ENC, ns::node::ENCRYPTED_DATA))
        .ok_or_else(|| Error::MissingElement(ns::node::ENCRYPTED_DATA.into()))?;
    let encrypted_data = encrypted_data_from_node(data_node)?;

    let mut key_index = DocumentKeyIndex::default();
    for node in doc.descendants() {
        if is_element(&node, ns::ENC, ns::node::ENCRYPTED_KEY) {
            if let Some(id) = node.attribute(ns::attr::ID) {
                key_index.insert(id, encrypted_key_from_node(node)?);
            }
        }
    }

    Ok(ParsedDocument { encrypted_data, key_index })
}

/// Parse a standalone `EncryptedData` element.
pub fn parse_encrypted_data(xml: &str) -> Result<EncryptedData, Error> {
    let doc = roxmltree::Document::parse_with_options(xml, parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    let node = doc
        .descendants()
        .find(|n| is_element(n, ns::ENC, ns::node::ENCRYPTED_DATA))
        .ok_or_else(|| Error::MissingElement(ns::node::ENCRYPTED_DATA.into()))?;
    encrypted_data_from_node(node)
}

/// Parse a standalone `EncryptedKey` element.
pub fn parse_encrypted_key(xml: &str) -> Result<EncryptedKey, Error> {
    let doc = roxmltree::Document::parse_with_options(xml, parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))?;
    let node = doc
        .descendants()
        .find(|n| is_element(n, ns::ENC, ns::node::ENCRYPTED_KEY))
        .ok_or_else(|| Error::MissingElement(ns::node::ENCRYPTED_KEY.into()))?;
    encrypted_key_from_node(node)
}

// ── Element readers ──────────────────────────────────────────────────

pub(crate) fn encrypted_data_from_node(node: roxmltree::Node<'_, '_>) -> Result<EncryptedData, Error> {
    let encryption_method = required_child(node, ns::ENC, ns::node::ENCRYPTION_METHOD)
        .and_then(encryption_method_from_node)?;
    let key_info = find_child(node, ns::DSIG, ns::node::KEY_INFO)
        .map(key_info_from_node)
        .transpose()?;
    let cipher_data = required_child(node, ns::ENC, ns::node::CIPHER_DATA)
        .and_then(cipher_data_from_node)?;

    Ok(EncryptedData {
        id: attr_owned(node, ns::attr::ID),
        type_uri: attr_owned(node, ns::attr::TYPE),
        mime_type: attr_owned(node, ns::attr::MIME_TYPE),
        encoding: attr_owned(node, ns::attr::ENCODING),
        encryption_method,
        key_info,
        cipher_data,
    })
}

pub(crate) fn encrypted_key_from_node(node: roxmltree::Node<'_, '_>) -> Result<EncryptedKey, Error> {
    let encryption_method = required_child(node, ns::ENC, ns::node::ENCRYPTION_METHOD)
        .and_then(encryption_method_from_node)?;
    let key_info = find_child(node, ns::DSIG, ns::node::KEY_INFO)
        .map(key_info_from_node)
        .transpose()?;
    let cipher_data = required_child(node, ns::ENC, ns::node::CIPHER_DATA)
        .and_then(cipher_data_from_node)?;
    let carried_key_name = find_child(node, ns::ENC, ns::node::CARRIED_KEY_NAME)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty());
    let reference_list = find_child(node, ns::ENC, ns::node::REFERENCE_LIST)
        .map(reference_list_from_node)
        .transpose()?;

    Ok(EncryptedKey {
        id: attr_owned(node, ns::attr::ID),
        type_uri: attr_owned(node, ns::attr::TYPE),
        mime_type: attr_owned(node, ns::attr::MIME_TYPE),
        encoding: attr_owned(node, ns::attr::ENCODING),
        encryption_method,
        key_info,
        cipher_data,
        recipient: attr_owned(node, ns::attr::RECIPIENT),
        carried_key_name,
        reference_list,
    })
}

fn encryption_method_from_node(node: roxmltree::Node<'_, '_>) -> Result<EncryptionMethod, Error> {
    let algorithm = node
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on EncryptionMethod".into()))?;

    let key_size = find_child(node, ns::ENC, ns::node::KEY_SIZE)
        .and_then(|n| n.text())
        .map(|t| {
            t.trim()
                .parse::<u32>()
                .map_err(|_| Error::XmlStructure("invalid KeySize value".into()))
        })
        .transpose()?;

    let oaep_params = find_child(node, ns::ENC, ns::node::OAEP_PARAMS)
        .and_then(|n| n.text())
        .map(|t| t.split_whitespace().collect::<String>())
        .filter(|t| !t.is_empty());

    let digest_method = find_child(node, ns::DSIG, ns::node::DIGEST_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .map(str::to_owned);

    let mgf = find_child(node, ns::ENC11, ns::node::MGF)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .map(str::to_owned);

    Ok(EncryptionMethod {
        algorithm: algorithm.to_owned(),
        key_size,
        oaep_params,
        digest_method,
        mgf,
    })
}

fn cipher_data_from_node(node: roxmltree::Node<'_, '_>) -> Result<CipherData, Error> {
    if let Some(value) = find_child(node, ns::ENC, ns::node::CIPHER_VALUE) {
        let text = value.text().unwrap_or("");
        return Ok(CipherData::Value(decode_b64(text, "CipherValue")?));
    }
    if let Some(reference) = find_child(node, ns::ENC, ns::node::CIPHER_REFERENCE) {
        let uri = reference
            .attribute(ns::attr::URI)
            .ok_or_else(|| Error::MissingAttribute("URI on CipherReference".into()))?;
        return Ok(CipherData::Reference(CipherReference {
            uri: uri.to_owned(),
            transforms: transforms_from_node(reference),
        }));
    }
    Err(Error::MissingElement("CipherValue or CipherReference".into()))
}

fn key_info_from_node(node: roxmltree::Node<'_, '_>) -> Result<KeyInfo, Error> {
    let mut key_info = KeyInfo::default();
    for child in node.children().filter(|n| n.is_element()) {
        let child_ns = child.tag_name().namespace().unwrap_or("");
        match (child_ns, child.tag_name().name()) {
            (ns::DSIG, ns::node::KEY_NAME) => {
                let name = child.text().unwrap_or("").trim();
                if !name.is_empty() {
                    key_info.key_names.push(name.to_owned());
                }
            }
            (ns::DSIG, ns::node::RETRIEVAL_METHOD) => {
                key_info
                    .retrieval_methods
                    .push(retrieval_method_from_node(child)?);
            }
            (ns::ENC, ns::node::ENCRYPTED_KEY) => {
                key_info.encrypted_keys.push(encrypted_key_from_node(child)?);
            }
            (ns::ENC, ns::node::AGREEMENT_METHOD) => {
                key_info
                    .agreement_methods
                    .push(agreement_method_from_node(child)?);
            }
            _ => {}
        }
    }
    Ok(key_info)
}

fn retrieval_method_from_node(node: roxmltree::Node<'_, '_>) -> Result<RetrievalMethod, Error> {
    let uri = node
        .attribute(ns::attr::URI)
        .ok_or_else(|| Error::MissingAttribute("URI on RetrievalMethod".into()))?;
    Ok(RetrievalMethod {
        uri: uri.to_owned(),
        type_uri: attr_owned(node, ns::attr::TYPE),
        transforms: transforms_from_node(node),
    })
}

fn transforms_from_node(node: roxmltree::Node<'_, '_>) -> Vec<String> {
    let transforms = find_child(node, ns::DSIG, ns::node::TRANSFORMS)
        .or_else(|| find_child(node, ns::ENC, ns::node::TRANSFORMS));
    let Some(transforms) = transforms else {
        return Vec::new();
    };
    transforms
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == ns::node::TRANSFORM)
        .filter_map(|n| n.attribute(ns::attr::ALGORITHM))
        .map(str::to_owned)
        .collect()
}

fn agreement_method_from_node(node: roxmltree::Node<'_, '_>) -> Result<AgreementMethod, Error> {
    let algorithm = node
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on AgreementMethod".into()))?;

    let ka_nonce = find_child(node, ns::ENC, ns::node::KA_NONCE)
        .and_then(|n| n.text())
        .map(|t| decode_b64(t, "KA-Nonce"))
        .transpose()?;

    let digest_method = find_child(node, ns::DSIG, ns::node::DIGEST_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .map(str::to_owned);

    let key_derivation_method = find_child(node, ns::ENC11, ns::node::KEY_DERIVATION_METHOD)
        .map(key_derivation_method_from_node)
        .transpose()?;

    let originator_key_info = find_child(node, ns::ENC, ns::node::ORIGINATOR_KEY_INFO)
        .map(agreement_key_info_from_node)
        .transpose()?;
    let recipient_key_info = find_child(node, ns::ENC, ns::node::RECIPIENT_KEY_INFO)
        .map(agreement_key_info_from_node)
        .transpose()?;

    Ok(AgreementMethod {
        algorithm: algorithm.to_owned(),
        ka_nonce,
        digest_method,
        key_derivation_method,
        originator_key_info,
        recipient_key_info,
    })
}

fn agreement_key_info_from_node(node: roxmltree::Node<'_, '_>) -> Result<AgreementKeyInfo, Error> {
    if let Some(key_name) = find_child(node, ns::DSIG, ns::node::KEY_NAME) {
        let name = key_name.text().unwrap_or("").trim();
        if !name.is_empty() {
            return Ok(AgreementKeyInfo::KeyName(name.to_owned()));
        }
    }

    let key_value = required_child(node, ns::DSIG, ns::node::KEY_VALUE)?;

    if let Some(ec) = find_child(key_value, ns::DSIG11, ns::node::EC_KEY_VALUE)
        .or_else(|| find_child(key_value, ns::DSIG, ns::node::EC_KEY_VALUE))
    {
        let named_curve = find_child(ec, ns::DSIG11, ns::node::NAMED_CURVE)
            .or_else(|| find_child(ec, ns::DSIG, ns::node::NAMED_CURVE))
            .and_then(|n| n.attribute(ns::attr::URI))
            .ok_or_else(|| Error::MissingElement("NamedCurve in ECKeyValue".into()))?;
        let public = child_b64(ec, ns::node::PUBLIC_KEY)?
            .ok_or_else(|| Error::MissingElement("PublicKey in ECKeyValue".into()))?;
        return Ok(AgreementKeyInfo::EcPublicKey {
            named_curve: named_curve.to_owned(),
            public,
        });
    }

    if let Some(dh) = find_child(key_value, ns::ENC, ns::node::DH_KEY_VALUE)
        .or_else(|| find_child(key_value, ns::DSIG, ns::node::DH_KEY_VALUE))
    {
        let public = child_b64(dh, ns::node::DH_PUBLIC)?
            .ok_or_else(|| Error::MissingElement("Public in DHKeyValue".into()))?;
        return Ok(AgreementKeyInfo::DhPublicKey {
            p: child_b64(dh, ns::node::DH_P)?.unwrap_or_default(),
            generator: child_b64(dh, ns::node::DH_GENERATOR)?.unwrap_or_default(),
            public,
        });
    }

    Err(Error::XmlStructure(
        "agreement KeyInfo carries no usable key material".into(),
    ))
}

fn key_derivation_method_from_node(
    node: roxmltree::Node<'_, '_>,
) -> Result<KeyDerivationMethod, Error> {
    let kdf_algorithm = node
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on KeyDerivationMethod".into()))?;

    let params = match kdf_algorithm {
        algorithm::CONCAT_KDF => {
            let params_node = required_child(node, ns::ENC11, ns::node::CONCAT_KDF_PARAMS)?;
            KdfParams::Concat(concat_params_from_node(params_node)?)
        }
        algorithm::PBKDF2 => {
            let params_node = required_child(node, ns::ENC11, ns::node::PBKDF2_PARAMS)?;
            KdfParams::Pbkdf2(pbkdf2_params_from_node(params_node)?)
        }
        other => {
            return Err(Error::UnsupportedAlgorithm(format!(
                "key derivation: {other}"
            )))
        }
    };

    Ok(KeyDerivationMethod {
        algorithm: kdf_algorithm.to_owned(),
        params,
    })
}

fn concat_params_from_node(node: roxmltree::Node<'_, '_>) -> Result<ConcatKdfParams, Error> {
    let digest_method = find_child(node, ns::DSIG, ns::node::DIGEST_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingElement("DigestMethod in ConcatKDFParams".into()))?;

    let unpad = |name: &str| -> Result<Option<String>, Error> {
        node.attribute(name)
            .map(|v| crate::model::unpad_concat_param(v, name))
            .transpose()
    };

    Ok(ConcatKdfParams {
        digest_method: digest_method.to_owned(),
        algorithm_id: unpad(ns::attr::ALGORITHM_ID)?,
        party_u_info: unpad(ns::attr::PARTY_U_INFO)?,
        party_v_info: unpad(ns::attr::PARTY_V_INFO)?,
        supp_pub_info: unpad(ns::attr::SUPP_PUB_INFO)?,
        supp_priv_info: unpad(ns::attr::SUPP_PRIV_INFO)?,
    })
}

fn pbkdf2_params_from_node(node: roxmltree::Node<'_, '_>) -> Result<Pbkdf2Params, Error> {
    let salt_node = required_child(node, ns::ENC11, ns::node::SALT)?;
    let specified = required_child(salt_node, ns::ENC11, ns::node::SPECIFIED)?;
    let salt = decode_b64(specified.text().unwrap_or(""), "PBKDF2 salt")?;

    let iteration_count: u32 = required_child(node, ns::ENC11, ns::node::ITERATION_COUNT)?
        .text()
        .unwrap_or("")
        .trim()
        .parse()
        .map_err(|_| Error::XmlStructure("invalid IterationCount value".into()))?;

    // The XML KeyLength is in octets; the model tracks bits.
    let key_length_octets: u32 = required_child(node, ns::ENC11, ns::node::KEY_LENGTH)?
        .text()
        .unwrap_or("")
        .trim()
        .parse()
        .map_err(|_| Error::XmlStructure("invalid KeyLength value".into()))?;

    let prf = required_child(node, ns::ENC11, ns::node::PRF)?
        .attribute(ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on PRF".into()))?;

    Ok(Pbkdf2Params {
        salt,
        iteration_count,
        key_length_bits: key_length_octets * 8,
        prf: prf.to_owned(),
    })
}

fn reference_list_from_node(node: roxmltree::Node<'_, '_>) -> Result<ReferenceList, Error> {
    let mut list = ReferenceList::default();
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().namespace().unwrap_or("") != ns::ENC {
            continue;
        }
        let uri = child
            .attribute(ns::attr::URI)
            .ok_or_else(|| Error::MissingAttribute("URI on reference list entry".into()))?;
        match child.tag_name().name() {
            ns::node::DATA_REFERENCE => list.data_references.push(uri.to_owned()),
            ns::node::KEY_REFERENCE => list.key_references.push(uri.to_owned()),
            _ => {}
        }
    }
    Ok(list)
}

// ── Helpers ──────────────────────────────────────────────────────────

fn is_element(node: &roxmltree::Node<'_, '_>, ns_uri: &str, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace().unwrap_or("") == ns_uri
}

fn find_child<'a>(
    parent: roxmltree::Node<'a, 'a>,
    ns_uri: &str,
    local: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    parent.children().find(|n| is_element(n, ns_uri, local))
}

fn required_child<'a>(
    parent: roxmltree::Node<'a, 'a>,
    ns_uri: &str,
    local: &str,
) -> Result<roxmltree::Node<'a, 'a>, Error> {
    find_child(parent, ns_uri, local).ok_or_else(|| Error::MissingElement(local.into()))
}

fn attr_owned(node: roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_owned)
}

/// Base64 text child of `parent` with the given local name, any namespace.
fn child_b64(parent: roxmltree::Node<'_, '_>, local: &str) -> Result<Option<Vec<u8>>, Error> {
    parent
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == local)
        .and_then(|n| n.text())
        .map(|t| decode_b64(t, local))
        .transpose()
}

fn decode_b64(text: &str, what: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.split_whitespace().collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"<xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#"
            xmlns:ds="http://www.w3.org/2000/09/xmldsig#"
            Id="ed" Type="http://www.w3.org/2001/04/xmlenc#Element">
        <xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/>
        <ds:KeyInfo>
            <ds:KeyName>secret</ds:KeyName>
        </ds:KeyInfo>
        <xenc:CipherData>
            <xenc:CipherValue>SGVsbG8g
                V29ybGQ=</xenc:CipherValue>
        </xenc:CipherData>
    </xenc:EncryptedData>"#;

    #[test]
    fn parses_simple_encrypted_data() {
        let data = parse_encrypted_data(SIMPLE).unwrap();
        assert_eq!(data.id.as_deref(), Some("ed"));
        assert_eq!(data.encryption_method.algorithm, algorithm::AES128_CBC);
        assert_eq!(data.key_info.unwrap().key_names, ["secret"]);
        match data.cipher_data {
            CipherData::Value(v) => assert_eq!(v, b"Hello World"),
            CipherData::Reference(_) => panic!("expected inline value"),
        }
    }

    #[test]
    fn cipher_reference_is_modelled_not_dereferenced() {
        let xml = r#"<xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#">
            <xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/>
            <xenc:CipherData>
                <xenc:CipherReference URI="http://evil.example.com/ct"/>
            </xenc:CipherData>
        </xenc:EncryptedData>"#;
        let data = parse_encrypted_data(xml).unwrap();
        match data.cipher_data {
            CipherData::Reference(r) => assert_eq!(r.uri, "http://evil.example.com/ct"),
            CipherData::Value(_) => panic!("expected reference"),
        }
    }

    #[test]
    fn missing_cipher_data_is_an_error() {
        let xml = r#"<xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#">
            <xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/>
        </xenc:EncryptedData>"#;
        assert!(matches!(
            parse_encrypted_data(xml),
            Err(Error::MissingElement(_))
        ));
    }

    #[test]
    fn document_index_collects_keys_by_id() {
        let xml = r##"<root xmlns:xenc="http://www.w3.org/2001/04/xmlenc#"
                xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
            <xenc:EncryptedKey Id="ek1">
                <xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#kw-aes128"/>
                <xenc:CipherData><xenc:CipherValue>AAAA</xenc:CipherValue></xenc:CipherData>
            </xenc:EncryptedKey>
            <xenc:EncryptedData>
                <xenc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/>
                <ds:KeyInfo>
                    <ds:RetrievalMethod URI="#ek1"
                        Type="http://www.w3.org/2001/04/xmlenc#EncryptedKey"/>
                </ds:KeyInfo>
                <xenc:CipherData><xenc:CipherValue>AAAA</xenc:CipherValue></xenc:CipherData>
            </xenc:EncryptedData>
        </root>"##;
        let parsed = parse_document(xml).unwrap();
        assert!(parsed.key_index.get("ek1").is_some());
        assert!(parsed.key_index.get("ek2").is_none());
        let ki = parsed.encrypted_data.key_info.unwrap();
        assert_eq!(ki.retrieval_methods.len(), 1);
        assert_eq!(ki.retrieval_methods[0].uri, "#ek1");
    }

    #[test]
    fn marshal_unmarshal_roundtrip() {
        use crate::marshal::marshal_encrypted_data;
        let original = parse_encrypted_data(SIMPLE).unwrap();
        let xml = marshal_encrypted_data(&original);
        let reparsed = parse_encrypted_data(&xml).unwrap();
        assert_eq!(reparsed.id, original.id);
        assert_eq!(reparsed.type_uri, original.type_uri);
        assert_eq!(
            reparsed.encryption_method.algorithm,
            original.encryption_method.algorithm
        );
    }
}
