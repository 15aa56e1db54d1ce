#![forbid(unsafe_code)]

//! Marshalling of the typed model to XML text.
//!
//! The element set is fixed by the XML Encryption schema, so each structure
//! is emitted directly. The root element declares all namespaces used by
//! descendants; children use the conventional prefixes.

use crate::model::{
    AgreementKeyInfo, AgreementMethod, CipherData, EncryptedData, EncryptedKey, EncryptionMethod,
    KdfParams, KeyDerivationMethod, KeyInfo, ReferenceList, RetrievalMethod,
};
use base64::Engine;
use sigtuna_core::ns;

const NS_DECLS: &str = concat!(
    " xmlns:xenc=\"http://www.w3.org/2001/04/xmlenc#\"",
    " xmlns:xenc11=\"http://www.w3.org/2009/xmlenc11#\"",
    " xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\"",
    " xmlns:ds11=\"http://www.w3.org/2009/xmldsig11#\"",
);

/// Serialize an `EncryptedData` as a standalone element.
pub fn marshal_encrypted_data(data: &EncryptedData) -> String {
    let mut out = String::new();
    out.push_str("<xenc:EncryptedData");
    out.push_str(NS_DECLS);
    push_attr(&mut out, ns::attr::ID, data.id.as_deref());
    push_attr(&mut out, ns::attr::TYPE, data.type_uri.as_deref());
    push_attr(&mut out, ns::attr::MIME_TYPE, data.mime_type.as_deref());
    push_attr(&mut out, ns::attr::ENCODING, data.encoding.as_deref());
    out.push('>');
    write_encryption_method(&mut out, &data.encryption_method);
    if let Some(ki) = &data.key_info {
        write_key_info(&mut out, ki);
    }
    write_cipher_data(&mut out, &data.cipher_data);
    out.push_str("</xenc:EncryptedData>");
    out
}

/// Serialize an `EncryptedKey` as a standalone element.
pub fn marshal_encrypted_key(key: &EncryptedKey) -> String {
    let mut out = String::new();
    out.push_str("<xenc:EncryptedKey");
    out.push_str(NS_DECLS);
    write_encrypted_key_inner(&mut out, key);
    out
}

fn write_encrypted_key(out: &mut String, key: &EncryptedKey) {
    out.push_str("<xenc:EncryptedKey");
    write_encrypted_key_inner(out, key);
}

/// Attributes and children; the caller has opened the start tag.
fn write_encrypted_key_inner(out: &mut String, key: &EncryptedKey) {
    push_attr(out, ns::attr::ID, key.id.as_deref());
    push_attr(out, ns::attr::TYPE, key.type_uri.as_deref());
    push_attr(out, ns::attr::MIME_TYPE, key.mime_type.as_deref());
    push_attr(out, ns::attr::ENCODING, key.encoding.as_deref());
    push_attr(out, ns::attr::RECIPIENT, key.recipient.as_deref());
    out.push('>');
    write_encryption_method(out, &key.encryption_method);
    if let Some(ki) = &key.key_info {
        write_key_info(out, ki);
    }
    write_cipher_data(out, &key.cipher_data);
    if let Some(rl) = &key.reference_list {
        write_reference_list(out, rl);
    }
    if let Some(name) = &key.carried_key_name {
        out.push_str("<xenc:CarriedKeyName>");
        push_text(out, name);
        out.push_str("</xenc:CarriedKeyName>");
    }
    out.push_str("</xenc:EncryptedKey>");
}

fn write_encryption_method(out: &mut String, method: &EncryptionMethod) {
    out.push_str("<xenc:EncryptionMethod Algorithm=\"");
    push_text(out, &method.algorithm);
    out.push('"');
    let empty = method.key_size.is_none()
        && method.oaep_params.is_none()
        && method.digest_method.is_none()
        && method.mgf.is_none();
    if empty {
        out.push_str("/>");
        return;
    }
    out.push('>');
    if let Some(bits) = method.key_size {
        out.push_str("<xenc:KeySize>");
        out.push_str(&bits.to_string());
        out.push_str("</xenc:KeySize>");
    }
    if let Some(params) = &method.oaep_params {
        out.push_str("<xenc:OAEPparams>");
        push_text(out, params);
        out.push_str("</xenc:OAEPparams>");
    }
    if let Some(uri) = &method.digest_method {
        out.push_str("<ds:DigestMethod Algorithm=\"");
        push_text(out, uri);
        out.push_str("\"/>");
    }
    if let Some(uri) = &method.mgf {
        out.push_str("<xenc11:MGF Algorithm=\"");
        push_text(out, uri);
        out.push_str("\"/>");
    }
    out.push_str("</xenc:EncryptionMethod>");
}

fn write_cipher_data(out: &mut String, cipher_data: &CipherData) {
    out.push_str("<xenc:CipherData>");
    match cipher_data {
        CipherData::Value(bytes) => {
            out.push_str("<xenc:CipherValue>");
            out.push_str(&base64::engine::general_purpose::STANDARD.encode(bytes));
            out.push_str("</xenc:CipherValue>");
        }
        CipherData::Reference(reference) => {
            out.push_str("<xenc:CipherReference URI=\"");
            push_text(out, &reference.uri);
            out.push('"');
            if reference.transforms.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                out.push_str("<xenc:Transforms>");
                for transform in &reference.transforms {
                    out.push_str("<ds:Transform Algorithm=\"");
                    push_text(out, transform);
                    out.push_str("\"/>");
                }
                out.push_str("</xenc:Transforms>");
                out.push_str("</xenc:CipherReference>");
            }
        }
    }
    out.push_str("</xenc:CipherData>");
}

fn write_key_info(out: &mut String, key_info: &KeyInfo) {
    out.push_str("<ds:KeyInfo>");
    for name in &key_info.key_names {
        out.push_str("<ds:KeyName>");
        push_text(out, name);
        out.push_str("</ds:KeyName>");
    }
    for rm in &key_info.retrieval_methods {
        write_retrieval_method(out, rm);
    }
    for am in &key_info.agreement_methods {
        write_agreement_method(out, am);
    }
    for ek in &key_info.encrypted_keys {
        write_encrypted_key(out, ek);
    }
    out.push_str("</ds:KeyInfo>");
}

fn write_retrieval_method(out: &mut String, rm: &RetrievalMethod) {
    out.push_str("<ds:RetrievalMethod URI=\"");
    push_text(out, &rm.uri);
    out.push('"');
    push_attr(out, ns::attr::TYPE, rm.type_uri.as_deref());
    if rm.transforms.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push_str("><ds:Transforms>");
    for transform in &rm.transforms {
        out.push_str("<ds:Transform Algorithm=\"");
        push_text(out, transform);
        out.push_str("\"/>");
    }
    out.push_str("</ds:Transforms></ds:RetrievalMethod>");
}

fn write_agreement_method(out: &mut String, am: &AgreementMethod) {
    out.push_str("<xenc:AgreementMethod Algorithm=\"");
    push_text(out, &am.algorithm);
    out.push_str("\">");
    if let Some(nonce) = &am.ka_nonce {
        out.push_str("<xenc:KA-Nonce>");
        out.push_str(&base64::engine::general_purpose::STANDARD.encode(nonce));
        out.push_str("</xenc:KA-Nonce>");
    }
    if let Some(uri) = &am.digest_method {
        out.push_str("<ds:DigestMethod Algorithm=\"");
        push_text(out, uri);
        out.push_str("\"/>");
    }
    if let Some(kdm) = &am.key_derivation_method {
        write_key_derivation_method(out, kdm);
    }
    if let Some(oki) = &am.originator_key_info {
        out.push_str("<xenc:OriginatorKeyInfo>");
        write_agreement_key_info(out, oki);
        out.push_str("</xenc:OriginatorKeyInfo>");
    }
    if let Some(rki) = &am.recipient_key_info {
        out.push_str("<xenc:RecipientKeyInfo>");
        write_agreement_key_info(out, rki);
        out.push_str("</xenc:RecipientKeyInfo>");
    }
    out.push_str("</xenc:AgreementMethod>");
}

fn write_agreement_key_info(out: &mut String, info: &AgreementKeyInfo) {
    let b64 = &base64::engine::general_purpose::STANDARD;
    match info {
        AgreementKeyInfo::KeyName(name) => {
            out.push_str("<ds:KeyName>");
            push_text(out, name);
            out.push_str("</ds:KeyName>");
        }
        AgreementKeyInfo::EcPublicKey { named_curve, public } => {
            out.push_str("<ds:KeyValue><ds11:ECKeyValue><ds11:NamedCurve URI=\"");
            push_text(out, named_curve);
            out.push_str("\"/><ds11:PublicKey>");
            out.push_str(&b64.encode(public));
            out.push_str("</ds11:PublicKey></ds11:ECKeyValue></ds:KeyValue>");
        }
        AgreementKeyInfo::DhPublicKey { p, generator, public } => {
            out.push_str("<ds:KeyValue><xenc:DHKeyValue><xenc:P>");
            out.push_str(&b64.encode(p));
            out.push_str("</xenc:P><xenc:Generator>");
            out.push_str(&b64.encode(generator));
            out.push_str("</xenc:Generator><xenc:Public>");
            out.push_str(&b64.encode(public));
            out.push_str("</xenc:Public></xenc:DHKeyValue></ds:KeyValue>");
        }
    }
}

fn write_key_derivation_method(out: &mut String, kdm: &KeyDerivationMethod) {
    out.push_str("<xenc11:KeyDerivationMethod Algorithm=\"");
    push_text(out, &kdm.algorithm);
    out.push_str("\">");
    match &kdm.params {
        KdfParams::Concat(params) => {
            out.push_str("<xenc11:ConcatKDFParams");
            let padded = |v: &Option<String>| v.as_deref().map(crate::model::pad_concat_param);
            push_attr_owned(out, ns::attr::ALGORITHM_ID, padded(&params.algorithm_id));
            push_attr_owned(out, ns::attr::PARTY_U_INFO, padded(&params.party_u_info));
            push_attr_owned(out, ns::attr::PARTY_V_INFO, padded(&params.party_v_info));
            push_attr_owned(out, ns::attr::SUPP_PUB_INFO, padded(&params.supp_pub_info));
            push_attr_owned(out, ns::attr::SUPP_PRIV_INFO, padded(&params.supp_priv_info));
            out.push_str("><ds:DigestMethod Algorithm=\"");
            push_text(out, &params.digest_method);
            out.push_str("\"/></xenc11:ConcatKDFParams>");
        }
        KdfParams::Pbkdf2(params) => {
            out.push_str("<xenc11:PBKDF2-params><xenc11:Salt><xenc11:Specified>");
            out.push_str(&base64::engine::general_purpose::STANDARD.encode(&params.salt));
            out.push_str("</xenc11:Specified></xenc11:Salt><xenc11:IterationCount>");
            out.push_str(&params.iteration_count.to_string());
            out.push_str("</xenc11:IterationCount><xenc11:KeyLength>");
            // The XML element carries octets; the model tracks bits.
            out.push_str(&(params.key_length_bits / 8).to_string());
            out.push_str("</xenc11:KeyLength><xenc11:PRF Algorithm=\"");
            push_text(out, &params.prf);
            out.push_str("\"/></xenc11:PBKDF2-params>");
        }
    }
    out.push_str("</xenc11:KeyDerivationMethod>");
}

fn write_reference_list(out: &mut String, list: &ReferenceList) {
    if list.is_empty() {
        return;
    }
    out.push_str("<xenc:ReferenceList>");
    for uri in &list.data_references {
        out.push_str("<xenc:DataReference URI=\"");
        push_text(out, uri);
        out.push_str("\"/>");
    }
    for uri in &list.key_references {
        out.push_str("<xenc:KeyReference URI=\"");
        push_text(out, uri);
        out.push_str("\"/>");
    }
    out.push_str("</xenc:ReferenceList>");
}

// ── Escaping ─────────────────────────────────────────────────────────

fn push_attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(v) = value {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        push_text(out, v);
        out.push('"');
    }
}

fn push_attr_owned(out: &mut String, name: &str, value: Option<String>) {
    push_attr(out, name, value.as_deref());
}

/// Escape text for both element content and attribute values.
fn push_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
