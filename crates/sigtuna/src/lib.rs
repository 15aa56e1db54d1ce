#![forbid(unsafe_code)]

pub use sigtuna_core as core;
pub use sigtuna_crypto as crypto;
pub use sigtuna_enc as enc;
pub use sigtuna_keys as keys;
