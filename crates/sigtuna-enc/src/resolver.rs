#![forbid(unsafe_code)]

//! Encrypted-key resolution strategies.
//!
//! Given an `EncryptedData` and a set of acceptable recipients, a resolver
//! enumerates candidate `EncryptedKey` elements in document order. An empty
//! result is not an error; callers decide whether an unmatched key is fatal.

use crate::model::{EncryptedData, EncryptedKey};
use crate::unmarshal::DocumentKeyIndex;
use sigtuna_core::{ns, Error};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Everything a resolution strategy may consult.
pub struct ResolutionContext<'a> {
    pub encrypted_data: &'a EncryptedData,
    /// Index of the containing document's `EncryptedKey`s, when the
    /// `EncryptedData` was unmarshalled from a document.
    pub document_keys: Option<&'a DocumentKeyIndex>,
}

/// One resolution strategy.
pub trait EncryptedKeyResolver: Send + Sync {
    fn resolve<'a>(
        &self,
        ctx: &ResolutionContext<'a>,
        recipients: &HashSet<String>,
    ) -> Vec<&'a EncryptedKey>;
}

/// Whether an `EncryptedKey` recipient attribute matches the caller's
/// acceptable-recipient set. An empty set matches everything, as does an
/// absent or empty attribute.
pub fn match_recipient(recipient: Option<&str>, valid: &HashSet<String>) -> bool {
    if valid.is_empty() {
        return true;
    }
    match recipient.map(str::trim) {
        None | Some("") => true,
        Some(r) => valid.contains(r),
    }
}

/// Resolves `EncryptedKey`s embedded directly in the `EncryptedData`'s
/// key-info.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineEncryptedKeyResolver;

impl EncryptedKeyResolver for InlineEncryptedKeyResolver {
    fn resolve<'a>(
        &self,
        ctx: &ResolutionContext<'a>,
        recipients: &HashSet<String>,
    ) -> Vec<&'a EncryptedKey> {
        let Some(key_info) = &ctx.encrypted_data.key_info else {
            return Vec::new();
        };
        key_info
            .encrypted_keys
            .iter()
            .filter(|ek| match_recipient(ek.recipient.as_deref(), recipients))
            .collect()
    }
}

/// Resolves `RetrievalMethod` pointers to `EncryptedKey` elements elsewhere
/// in the same document.
///
/// Only same-document fragment URIs with `Type` = `...#EncryptedKey` are
/// followed. A retrieval method carrying transforms is unsupported and
/// yields no match; evaluating transforms over untrusted references is not
/// worth the attack surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalMethodEncryptedKeyResolver;

impl EncryptedKeyResolver for RetrievalMethodEncryptedKeyResolver {
    fn resolve<'a>(
        &self,
        ctx: &ResolutionContext<'a>,
        recipients: &HashSet<String>,
    ) -> Vec<&'a EncryptedKey> {
        let Some(key_info) = &ctx.encrypted_data.key_info else {
            return Vec::new();
        };
        let Some(index) = ctx.document_keys else {
            if !key_info.retrieval_methods.is_empty() {
                debug!("no document key index available, skipping RetrievalMethod resolution");
            }
            return Vec::new();
        };

        let mut found = Vec::new();
        for rm in &key_info.retrieval_methods {
            if rm.type_uri.as_deref() != Some(ns::TYPE_ENCRYPTED_KEY) {
                continue;
            }
            if !rm.transforms.is_empty() {
                warn!(uri = %rm.uri, "RetrievalMethod with transforms is unsupported, skipping");
                continue;
            }
            let Some(id) = rm.uri.strip_prefix('#') else {
                warn!(uri = %rm.uri, "RetrievalMethod URI is not a same-document reference, skipping");
                continue;
            };
            match index.get(id) {
                Some(ek) if match_recipient(ek.recipient.as_deref(), recipients) => {
                    found.push(ek);
                }
                Some(_) => {}
                None => {
                    warn!(id, "RetrievalMethod target not found in document");
                }
            }
        }
        found
    }
}

/// Composes an ordered list of strategies, concatenating their results.
pub struct ChainingEncryptedKeyResolver {
    chain: Vec<Box<dyn EncryptedKeyResolver>>,
}

impl ChainingEncryptedKeyResolver {
    /// Build a chain. An empty chain is a configuration error: resolution
    /// with it could only ever return nothing, silently.
    pub fn new(chain: Vec<Box<dyn EncryptedKeyResolver>>) -> Result<Self, Error> {
        if chain.is_empty() {
            return Err(Error::Config(
                "encrypted key resolver chain must not be empty".into(),
            ));
        }
        Ok(Self { chain })
    }

    /// The default chain: inline keys, then retrieval-method references.
    pub fn default_chain() -> Self {
        Self {
            chain: vec![
                Box::new(InlineEncryptedKeyResolver),
                Box::new(RetrievalMethodEncryptedKeyResolver),
            ],
        }
    }
}

impl EncryptedKeyResolver for ChainingEncryptedKeyResolver {
    fn resolve<'a>(
        &self,
        ctx: &ResolutionContext<'a>,
        recipients: &HashSet<String>,
    ) -> Vec<&'a EncryptedKey> {
        let mut out = Vec::new();
        for resolver in &self.chain {
            out.extend(resolver.resolve(ctx, recipients));
        }
        out
    }
}
