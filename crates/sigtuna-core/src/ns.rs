#![forbid(unsafe_code)]

//! XML namespace, element, and attribute name constants.

/// XML Encryption namespace
pub const ENC: &str = "http://www.w3.org/2001/04/xmlenc#";

/// XML Encryption 1.1 namespace
pub const ENC11: &str = "http://www.w3.org/2009/xmlenc11#";

/// XML Digital Signature namespace (KeyInfo and friends live here)
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Digital Signature 1.1 namespace (ECKeyValue)
pub const DSIG11: &str = "http://www.w3.org/2009/xmldsig11#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // Core encryption elements (xenc)
    pub const ENCRYPTED_DATA: &str = "EncryptedData";
    pub const ENCRYPTED_KEY: &str = "EncryptedKey";
    pub const ENCRYPTION_METHOD: &str = "EncryptionMethod";
    pub const CIPHER_DATA: &str = "CipherData";
    pub const CIPHER_VALUE: &str = "CipherValue";
    pub const CIPHER_REFERENCE: &str = "CipherReference";
    pub const KEY_SIZE: &str = "KeySize";
    pub const OAEP_PARAMS: &str = "OAEPparams";
    pub const CARRIED_KEY_NAME: &str = "CarriedKeyName";
    pub const REFERENCE_LIST: &str = "ReferenceList";
    pub const DATA_REFERENCE: &str = "DataReference";
    pub const KEY_REFERENCE: &str = "KeyReference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";

    // Key agreement elements (xenc)
    pub const AGREEMENT_METHOD: &str = "AgreementMethod";
    pub const KA_NONCE: &str = "KA-Nonce";
    pub const ORIGINATOR_KEY_INFO: &str = "OriginatorKeyInfo";
    pub const RECIPIENT_KEY_INFO: &str = "RecipientKeyInfo";

    // Key derivation elements (xenc11)
    pub const KEY_DERIVATION_METHOD: &str = "KeyDerivationMethod";
    pub const CONCAT_KDF_PARAMS: &str = "ConcatKDFParams";
    pub const PBKDF2_PARAMS: &str = "PBKDF2-params";
    pub const SALT: &str = "Salt";
    pub const SPECIFIED: &str = "Specified";
    pub const ITERATION_COUNT: &str = "IterationCount";
    pub const KEY_LENGTH: &str = "KeyLength";
    pub const PRF: &str = "PRF";
    pub const MGF: &str = "MGF";

    // KeyInfo elements (ds)
    pub const KEY_INFO: &str = "KeyInfo";
    pub const KEY_NAME: &str = "KeyName";
    pub const KEY_VALUE: &str = "KeyValue";
    pub const RETRIEVAL_METHOD: &str = "RetrievalMethod";
    pub const DIGEST_METHOD: &str = "DigestMethod";

    // Key value elements
    pub const EC_KEY_VALUE: &str = "ECKeyValue";
    pub const NAMED_CURVE: &str = "NamedCurve";
    pub const PUBLIC_KEY: &str = "PublicKey";
    pub const DH_KEY_VALUE: &str = "DHKeyValue";
    pub const DH_P: &str = "P";
    pub const DH_GENERATOR: &str = "Generator";
    pub const DH_PUBLIC: &str = "Public";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const MIME_TYPE: &str = "MimeType";
    pub const ENCODING: &str = "Encoding";
    pub const ALGORITHM: &str = "Algorithm";
    pub const RECIPIENT: &str = "Recipient";
    pub const ALGORITHM_ID: &str = "AlgorithmID";
    pub const PARTY_U_INFO: &str = "PartyUInfo";
    pub const PARTY_V_INFO: &str = "PartyVInfo";
    pub const SUPP_PUB_INFO: &str = "SuppPubInfo";
    pub const SUPP_PRIV_INFO: &str = "SuppPrivInfo";
}

// ── Type URIs ────────────────────────────────────────────────────────

/// Type attribute value for element encryption.
pub const TYPE_ELEMENT: &str = "http://www.w3.org/2001/04/xmlenc#Element";

/// Type attribute value for content encryption.
pub const TYPE_CONTENT: &str = "http://www.w3.org/2001/04/xmlenc#Content";

/// RetrievalMethod Type value pointing at an EncryptedKey.
pub const TYPE_ENCRYPTED_KEY: &str = "http://www.w3.org/2001/04/xmlenc#EncryptedKey";

// ── EC named curve URNs ──────────────────────────────────────────────

pub const CURVE_P256: &str = "urn:oid:1.2.840.10045.3.1.7";
pub const CURVE_P384: &str = "urn:oid:1.3.132.0.34";
pub const CURVE_P521: &str = "urn:oid:1.3.132.0.35";
