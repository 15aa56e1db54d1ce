#![forbid(unsafe_code)]

//! Typed model of the XML Encryption element set.
//!
//! Every value is built once per operation and never mutated afterwards.
//! Structures own their children exclusively; `ReferenceList` entries are
//! URI references, never ownership edges.

use sigtuna_core::{algorithm, Error};

/// `<xenc:EncryptedData>` — the root of one encryption operation.
#[derive(Debug, Clone)]
pub struct EncryptedData {
    pub id: Option<String>,
    /// `Type` attribute: element vs. content encryption (or absent).
    pub type_uri: Option<String>,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    pub encryption_method: EncryptionMethod,
    pub key_info: Option<KeyInfo>,
    pub cipher_data: CipherData,
}

/// `<xenc:EncryptedKey>` — a protected key, possibly shared by several
/// `EncryptedData` instances via its reference list.
#[derive(Debug, Clone)]
pub struct EncryptedKey {
    pub id: Option<String>,
    pub type_uri: Option<String>,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    pub encryption_method: EncryptionMethod,
    pub key_info: Option<KeyInfo>,
    pub cipher_data: CipherData,
    pub recipient: Option<String>,
    pub carried_key_name: Option<String>,
    pub reference_list: Option<ReferenceList>,
}

/// `<xenc:EncryptionMethod>` with the algorithm-specific children used by
/// this element set (`KeySize`, `OAEPparams`, `ds:DigestMethod`,
/// `xenc11:MGF`).
#[derive(Debug, Clone)]
pub struct EncryptionMethod {
    pub algorithm: String,
    /// Key size in bits, when expressed.
    pub key_size: Option<u32>,
    /// Base64 text of the OAEP source parameters, carried verbatim.
    pub oaep_params: Option<String>,
    /// Digest algorithm URI for RSA-OAEP.
    pub digest_method: Option<String>,
    /// Mask generation function URI for RSA-OAEP (XML Encryption 1.1).
    pub mgf: Option<String>,
}

impl EncryptionMethod {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            key_size: None,
            oaep_params: None,
            digest_method: None,
            mgf: None,
        }
    }
}

/// `<xenc:CipherData>` — exactly one of an inline value or a reference.
#[derive(Debug, Clone)]
pub enum CipherData {
    /// Inline ciphertext (`<xenc:CipherValue>`, base64 in the XML form).
    Value(Vec<u8>),
    /// `<xenc:CipherReference>` — never dereferenced by this engine.
    Reference(CipherReference),
}

#[derive(Debug, Clone)]
pub struct CipherReference {
    pub uri: String,
    /// Transform algorithm URIs, in document order.
    pub transforms: Vec<String>,
}

/// The subset of `<ds:KeyInfo>` content that XML Encryption processing
/// consumes.
#[derive(Debug, Clone, Default)]
pub struct KeyInfo {
    pub key_names: Vec<String>,
    pub encrypted_keys: Vec<EncryptedKey>,
    pub retrieval_methods: Vec<RetrievalMethod>,
    pub agreement_methods: Vec<AgreementMethod>,
}

impl KeyInfo {
    pub fn is_empty(&self) -> bool {
        self.key_names.is_empty()
            && self.encrypted_keys.is_empty()
            && self.retrieval_methods.is_empty()
            && self.agreement_methods.is_empty()
    }
}

/// `<ds:RetrievalMethod>` — a same-document pointer to key material.
#[derive(Debug, Clone)]
pub struct RetrievalMethod {
    pub uri: String,
    pub type_uri: Option<String>,
    pub transforms: Vec<String>,
}

/// `<xenc:AgreementMethod>` — key agreement parameters.
#[derive(Debug, Clone)]
pub struct AgreementMethod {
    pub algorithm: String,
    /// `<xenc:KA-Nonce>` value (raw bytes).
    pub ka_nonce: Option<Vec<u8>>,
    /// `<ds:DigestMethod>` child used by the legacy DH derivation.
    pub digest_method: Option<String>,
    pub key_derivation_method: Option<KeyDerivationMethod>,
    pub originator_key_info: Option<AgreementKeyInfo>,
    pub recipient_key_info: Option<AgreementKeyInfo>,
}

/// Key material carried inside `OriginatorKeyInfo` / `RecipientKeyInfo`.
#[derive(Debug, Clone)]
pub enum AgreementKeyInfo {
    KeyName(String),
    /// `<ds11:ECKeyValue>`: named curve plus uncompressed SEC1 point.
    EcPublicKey { named_curve: String, public: Vec<u8> },
    /// `<xenc:DHKeyValue>`: group parameters plus public value, big-endian.
    DhPublicKey {
        p: Vec<u8>,
        generator: Vec<u8>,
        public: Vec<u8>,
    },
}

/// `<xenc11:KeyDerivationMethod>`.
#[derive(Debug, Clone)]
pub struct KeyDerivationMethod {
    pub algorithm: String,
    pub params: KdfParams,
}

#[derive(Debug, Clone)]
pub enum KdfParams {
    Concat(ConcatKdfParams),
    Pbkdf2(Pbkdf2Params),
}

/// `<xenc11:ConcatKDFParams>`.
///
/// The five info fields are held in their *unpadded* hex form. The XML
/// representation prefixes each value with a `00` octet indicating zero
/// padding bits; only whole-byte values are supported, so decoding rejects
/// anything else (see [`unpad_concat_param`]).
#[derive(Debug, Clone)]
pub struct ConcatKdfParams {
    pub digest_method: String,
    pub algorithm_id: Option<String>,
    pub party_u_info: Option<String>,
    pub party_v_info: Option<String>,
    pub supp_pub_info: Option<String>,
    pub supp_priv_info: Option<String>,
}

impl ConcatKdfParams {
    pub fn new(digest_method: impl Into<String>) -> Self {
        Self {
            digest_method: digest_method.into(),
            algorithm_id: None,
            party_u_info: None,
            party_v_info: None,
            supp_pub_info: None,
            supp_priv_info: None,
        }
    }

    /// Concatenate the hex-decoded info fields into the KDF `OtherInfo`
    /// bit string: AlgorithmID ‖ PartyUInfo ‖ PartyVInfo ‖ SuppPubInfo ‖
    /// SuppPrivInfo.
    pub fn other_info(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        for (value, name) in [
            (&self.algorithm_id, "AlgorithmID"),
            (&self.party_u_info, "PartyUInfo"),
            (&self.party_v_info, "PartyVInfo"),
            (&self.supp_pub_info, "SuppPubInfo"),
            (&self.supp_priv_info, "SuppPrivInfo"),
        ] {
            if let Some(v) = value {
                out.extend_from_slice(&decode_concat_param(v, name)?);
            }
        }
        Ok(out)
    }
}

/// Hex-decode one unpadded ConcatKDF parameter value.
pub fn decode_concat_param(value: &str, name: &str) -> Result<Vec<u8>, Error> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(trimmed)
        .map_err(|_| Error::Hex(format!("ConcatKDF parameter {name} is not valid hex")))
}

/// Convert an unpadded ConcatKDF parameter to its XML form by prepending the
/// zero-padding-bits indicator octet.
pub fn pad_concat_param(value: &str) -> String {
    format!("00{value}")
}

/// Strip the padding-bits indicator octet from an XML ConcatKDF parameter.
///
/// Only byte-aligned values are supported, so the leading octet must be
/// `00`; `"00"` alone is a legal empty bit string.
pub fn unpad_concat_param(value: &str, name: &str) -> Result<String, Error> {
    let trimmed = value.trim();
    if trimmed.len() < 2 {
        return Err(Error::XmlStructure(format!(
            "ConcatKDF parameter {name} is too short for a padded hexBinary value"
        )));
    }
    if trimmed.len() % 2 != 0 {
        return Err(Error::XmlStructure(format!(
            "ConcatKDF parameter {name} has an odd number of hex digits"
        )));
    }
    if !trimmed.starts_with("00") {
        return Err(Error::XmlStructure(format!(
            "ConcatKDF parameter {name} is not byte-aligned"
        )));
    }
    // Reject malformed hex here rather than at derivation time.
    let unpadded = &trimmed[2..];
    if !unpadded.is_empty() {
        hex::decode(unpadded)
            .map_err(|_| Error::Hex(format!("ConcatKDF parameter {name} is not valid hex")))?;
    }
    Ok(unpadded.to_owned())
}

/// `<xenc11:PBKDF2-params>`.
#[derive(Debug, Clone)]
pub struct Pbkdf2Params {
    /// Salt bytes (`Salt/Specified`, base64 in the XML form).
    pub salt: Vec<u8>,
    pub iteration_count: u32,
    /// Derived key length in bits. The XML `KeyLength` element carries
    /// octets; conversion happens at the marshalling boundary.
    pub key_length_bits: u32,
    /// Pseudo-random function algorithm URI.
    pub prf: String,
}

/// `<xenc:ReferenceList>` — URI references associating one `EncryptedKey`
/// with the `EncryptedData`/`EncryptedKey` instances it protects.
#[derive(Debug, Clone, Default)]
pub struct ReferenceList {
    pub data_references: Vec<String>,
    pub key_references: Vec<String>,
}

impl ReferenceList {
    pub fn is_empty(&self) -> bool {
        self.data_references.is_empty() && self.key_references.is_empty()
    }
}

/// Default digest for ConcatKDF parameters constructed locally.
pub const DEFAULT_CONCAT_KDF_DIGEST: &str = algorithm::SHA256;

/// Default digest for the legacy DH derivation.
pub const DEFAULT_DH_DIGEST: &str = algorithm::SHA256;

/// Default PRF for PBKDF2 parameters constructed locally.
pub const DEFAULT_PBKDF2_PRF: &str = algorithm::HMAC_SHA256;

/// Default PBKDF2 iteration count.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 2000;

/// Default generated PBKDF2 salt length in bytes.
pub const DEFAULT_PBKDF2_SALT_LENGTH: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_param_pad_roundtrip() {
        assert_eq!(pad_concat_param("a1b2"), "00a1b2");
        assert_eq!(unpad_concat_param("00a1b2", "AlgorithmID").unwrap(), "a1b2");
        // "00" is a legal empty bit string.
        assert_eq!(unpad_concat_param("00", "AlgorithmID").unwrap(), "");
    }

    #[test]
    fn concat_param_rejects_non_byte_aligned() {
        assert!(unpad_concat_param("04a1b2", "PartyUInfo").is_err());
        assert!(unpad_concat_param("0", "PartyUInfo").is_err());
        assert!(unpad_concat_param("00a1b", "PartyUInfo").is_err());
        assert!(unpad_concat_param("00zzzz", "PartyUInfo").is_err());
    }

    #[test]
    fn other_info_concatenates_in_field_order() {
        let mut params = ConcatKdfParams::new(algorithm::SHA256);
        params.algorithm_id = Some("aa".into());
        params.party_u_info = Some("bb".into());
        params.party_v_info = Some("cc".into());
        params.supp_pub_info = Some("dd".into());
        params.supp_priv_info = Some("ee".into());
        assert_eq!(params.other_info().unwrap(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee]);
    }

    #[test]
    fn other_info_skips_absent_fields() {
        let mut params = ConcatKdfParams::new(algorithm::SHA256);
        params.party_v_info = Some("0102".into());
        assert_eq!(params.other_info().unwrap(), [0x01, 0x02]);
    }

    #[test]
    fn other_info_rejects_malformed_hex() {
        let mut params = ConcatKdfParams::new(algorithm::SHA256);
        params.algorithm_id = Some("not-hex".into());
        assert!(params.other_info().is_err());
    }
}
