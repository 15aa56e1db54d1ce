#![forbid(unsafe_code)]

//! Credential and key material types.

/// The key algorithm family a credential belongs to. Key-agreement
/// configuration is selected per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    Symmetric,
    Rsa,
    Ec,
    Dh,
}

/// The underlying key material of a credential.
pub enum KeyMaterial {
    /// Raw symmetric key bytes (AES or 3DES).
    Symmetric(Vec<u8>),
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    EcP256 {
        private: Option<p256::SecretKey>,
        public: p256::PublicKey,
    },
    EcP384 {
        private: Option<p384::SecretKey>,
        public: p384::PublicKey,
    },
    EcP521 {
        private: Option<p521::SecretKey>,
        public: p521::PublicKey,
    },
    /// Finite-field Diffie-Hellman key in an explicit group. All values are
    /// big-endian byte strings.
    Dh {
        p: Vec<u8>,
        generator: Vec<u8>,
        public: Vec<u8>,
        private: Option<Vec<u8>>,
    },
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Symmetric(k) => write!(f, "symmetric key ({} bytes)", k.len()),
            Self::Rsa { private, .. } => {
                write!(f, "RSA {} key", if private.is_some() { "private" } else { "public" })
            }
            Self::EcP256 { private, .. } => {
                write!(f, "EC P-256 {} key", if private.is_some() { "private" } else { "public" })
            }
            Self::EcP384 { private, .. } => {
                write!(f, "EC P-384 {} key", if private.is_some() { "private" } else { "public" })
            }
            Self::EcP521 { private, .. } => {
                write!(f, "EC P-521 {} key", if private.is_some() { "private" } else { "public" })
            }
            Self::Dh { private, .. } => {
                write!(f, "DH {} key", if private.is_some() { "private" } else { "public" })
            }
        }
    }
}

/// A named, immutable credential.
#[derive(Debug)]
pub struct Credential {
    /// Optional name used for lookup and for `KeyName` emission.
    pub name: Option<String>,
    pub material: KeyMaterial,
}

impl Credential {
    pub fn new(material: KeyMaterial) -> Self {
        Self { name: None, material }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn family(&self) -> KeyFamily {
        match &self.material {
            KeyMaterial::Symmetric(_) => KeyFamily::Symmetric,
            KeyMaterial::Rsa { .. } => KeyFamily::Rsa,
            KeyMaterial::EcP256 { .. } | KeyMaterial::EcP384 { .. } | KeyMaterial::EcP521 { .. } => {
                KeyFamily::Ec
            }
            KeyMaterial::Dh { .. } => KeyFamily::Dh,
        }
    }

    /// Raw symmetric key bytes, if this is a symmetric credential.
    pub fn symmetric_bytes(&self) -> Option<&[u8]> {
        match &self.material {
            KeyMaterial::Symmetric(k) => Some(k),
            _ => None,
        }
    }

    pub fn rsa_public(&self) -> Option<&rsa::RsaPublicKey> {
        match &self.material {
            KeyMaterial::Rsa { public, .. } => Some(public),
            _ => None,
        }
    }

    pub fn rsa_private(&self) -> Option<&rsa::RsaPrivateKey> {
        match &self.material {
            KeyMaterial::Rsa { private: Some(k), .. } => Some(k),
            _ => None,
        }
    }

    /// Whether this credential carries private key material.
    pub fn has_private(&self) -> bool {
        match &self.material {
            KeyMaterial::Symmetric(_) => true,
            KeyMaterial::Rsa { private, .. } => private.is_some(),
            KeyMaterial::EcP256 { private, .. } => private.is_some(),
            KeyMaterial::EcP384 { private, .. } => private.is_some(),
            KeyMaterial::EcP521 { private, .. } => private.is_some(),
            KeyMaterial::Dh { private, .. } => private.is_some(),
        }
    }
}

/// An ordered credential store consulted during decryption.
///
/// Credentials are held behind `Arc` and shared by reference for the
/// duration of a call. Lookup by name first, then by position; iteration
/// order is insertion order, matching the "try candidates in configured
/// order" contract.
#[derive(Debug, Default)]
pub struct CredentialResolver {
    credentials: Vec<std::sync::Arc<Credential>>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, credential: impl Into<std::sync::Arc<Credential>>) {
        self.credentials.push(credential.into());
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|c| c.name.as_deref() == Some(name))
            .map(|c| c.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter().map(|c| c.as_ref())
    }

    /// Credentials of the given family that carry private material.
    pub fn private_of_family(&self, family: KeyFamily) -> impl Iterator<Item = &Credential> {
        self.iter()
            .filter(move |c| c.family() == family && c.has_private())
    }
}
