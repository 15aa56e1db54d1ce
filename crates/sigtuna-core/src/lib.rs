#![forbid(unsafe_code)]

//! Core types for the Sigtuna XML Encryption library.
//!
//! Holds the shared error taxonomy, the XML namespace and element name
//! constants, and the algorithm URI constants used across the workspace.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
