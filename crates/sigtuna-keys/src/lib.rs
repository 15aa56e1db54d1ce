#![forbid(unsafe_code)]

//! Credential types for the Sigtuna XML Encryption library.
//!
//! A [`Credential`] pairs optional naming metadata with key material. All
//! credentials are immutable once constructed and are shared by reference
//! for the duration of one encryption or decryption call; their lifecycle
//! and zeroization are the caller's concern.

pub mod credential;

pub use credential::{Credential, CredentialResolver, KeyFamily, KeyMaterial};
