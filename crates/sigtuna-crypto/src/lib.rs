#![forbid(unsafe_code)]

//! Cryptographic algorithm implementations for the Sigtuna XML Encryption
//! library.
//!
//! Covers everything XML-Enc needs below the element-tree level: block
//! ciphers, key wrapping, key transport, key derivation functions, and the
//! raw key-agreement computations. All primitives come from the RustCrypto
//! crates; this crate only sequences and parameterizes them.

pub mod cipher;
pub mod kdf;
pub mod keyagreement;
pub mod keytransport;
pub mod keywrap;
pub mod registry;

pub use cipher::BlockCipher;
pub use keytransport::KeyTransport;
pub use keywrap::KeyWrap;
pub use registry::{AlgorithmKind, AlgorithmRegistry};
