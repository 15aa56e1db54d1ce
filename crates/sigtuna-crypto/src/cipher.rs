#![forbid(unsafe_code)]

//! Block cipher algorithms (AES-CBC, AES-GCM, 3DES-CBC).
//!
//! Ciphertext layout follows XML Encryption: the IV (16 bytes for AES-CBC,
//! 8 for 3DES, 12 for GCM) is prepended to the cipher output, and for GCM
//! the authentication tag trails the ciphertext.

use sigtuna_core::{algorithm, Error};

/// A block encryption algorithm selected by URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
    TripleDesCbc,
}

impl BlockCipher {
    /// Select a block cipher by its algorithm URI.
    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        match uri {
            algorithm::AES128_CBC => Ok(Self::Aes128Cbc),
            algorithm::AES192_CBC => Ok(Self::Aes192Cbc),
            algorithm::AES256_CBC => Ok(Self::Aes256Cbc),
            algorithm::AES128_GCM => Ok(Self::Aes128Gcm),
            algorithm::AES192_GCM => Ok(Self::Aes192Gcm),
            algorithm::AES256_GCM => Ok(Self::Aes256Gcm),
            algorithm::TRIPLEDES_CBC => Ok(Self::TripleDesCbc),
            _ => Err(Error::UnsupportedAlgorithm(format!("block cipher: {uri}"))),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::Aes128Cbc => algorithm::AES128_CBC,
            Self::Aes192Cbc => algorithm::AES192_CBC,
            Self::Aes256Cbc => algorithm::AES256_CBC,
            Self::Aes128Gcm => algorithm::AES128_GCM,
            Self::Aes192Gcm => algorithm::AES192_GCM,
            Self::Aes256Gcm => algorithm::AES256_GCM,
            Self::TripleDesCbc => algorithm::TRIPLEDES_CBC,
        }
    }

    /// Required key size in bytes.
    pub fn key_size(&self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::Aes192Cbc | Self::Aes192Gcm => 24,
            Self::Aes256Cbc | Self::Aes256Gcm => 32,
            Self::TripleDesCbc => 24,
        }
    }

    /// Encrypt `plaintext`, returning IV-prefixed ciphertext.
    pub fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_key(key)?;
        match self {
            Self::Aes128Cbc => cbc_encrypt::<aes::Aes128>(key, plaintext, 16),
            Self::Aes192Cbc => cbc_encrypt::<aes::Aes192>(key, plaintext, 16),
            Self::Aes256Cbc => cbc_encrypt::<aes::Aes256>(key, plaintext, 16),
            Self::Aes128Gcm | Self::Aes192Gcm | Self::Aes256Gcm => {
                gcm_encrypt(self.key_size(), key, plaintext)
            }
            Self::TripleDesCbc => cbc_encrypt::<des::TdesEde3>(key, plaintext, 8),
        }
    }

    /// Decrypt IV-prefixed ciphertext.
    pub fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_key(key)?;
        match self {
            Self::Aes128Cbc => cbc_decrypt::<aes::Aes128>(key, data, 16),
            Self::Aes192Cbc => cbc_decrypt::<aes::Aes192>(key, data, 16),
            Self::Aes256Cbc => cbc_decrypt::<aes::Aes256>(key, data, 16),
            Self::Aes128Gcm | Self::Aes192Gcm | Self::Aes256Gcm => {
                gcm_decrypt(self.key_size(), key, data)
            }
            Self::TripleDesCbc => cbc_decrypt::<des::TdesEde3>(key, data, 8),
        }
    }

    fn check_key(&self, key: &[u8]) -> Result<(), Error> {
        if key.len() != self.key_size() {
            return Err(Error::Crypto(format!(
                "{} expects a {} byte key, got {}",
                self.uri(),
                self.key_size(),
                key.len()
            )));
        }
        Ok(())
    }
}

// ── CBC mode ─────────────────────────────────────────────────────────

fn cbc_encrypt<C>(key: &[u8], plaintext: &[u8], block_size: usize) -> Result<Vec<u8>, Error>
where
    C: cbc::cipher::BlockCipher + cbc::cipher::BlockEncryptMut + cbc::cipher::KeyInit,
{
    use cbc::cipher::{BlockEncryptMut, KeyIvInit};
    use rand::RngCore;

    let mut iv = vec![0u8; block_size];
    rand::thread_rng().fill_bytes(&mut iv);

    // Pad up front, then run the cipher with NoPadding.
    let mut buf = pad_block(plaintext, block_size);
    let buf_len = buf.len();

    let enc = cbc::Encryptor::<C>::new_from_slices(key, &iv)
        .map_err(|e| Error::Crypto(format!("CBC init: {e}")))?;
    enc.encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, buf_len)
        .map_err(|e| Error::Crypto(format!("CBC encrypt: {e}")))?;

    let mut out = Vec::with_capacity(block_size + buf.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    Ok(out)
}

fn cbc_decrypt<C>(key: &[u8], data: &[u8], block_size: usize) -> Result<Vec<u8>, Error>
where
    C: cbc::cipher::BlockCipher + cbc::cipher::BlockDecryptMut + cbc::cipher::KeyInit,
{
    use cbc::cipher::{BlockDecryptMut, KeyIvInit};

    if data.len() < 2 * block_size || data.len() % block_size != 0 {
        return Err(Error::Crypto("CBC ciphertext has invalid length".into()));
    }

    let (iv, ciphertext) = data.split_at(block_size);
    let mut buf = ciphertext.to_vec();

    let dec = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| Error::Crypto(format!("CBC init: {e}")))?;
    dec.decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf)
        .map_err(|e| Error::Crypto(format!("CBC decrypt: {e}")))?;

    unpad_block(&buf, block_size)
}

// ── GCM mode ─────────────────────────────────────────────────────────

const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

fn gcm_encrypt(key_size: usize, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    use aes_gcm::{aead::Aead, KeyInit, Nonce};
    use rand::RngCore;

    let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ct = match key_size {
        16 => aes_gcm::Aes128Gcm::new_from_slice(key)
            .map_err(|e| Error::Crypto(format!("GCM init: {e}")))?
            .encrypt(nonce, plaintext),
        24 => {
            use aes_gcm::aead::consts::U12;
            aes_gcm::AesGcm::<aes::Aes192, U12>::new_from_slice(key)
                .map_err(|e| Error::Crypto(format!("GCM init: {e}")))?
                .encrypt(nonce, plaintext)
        }
        32 => aes_gcm::Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::Crypto(format!("GCM init: {e}")))?
            .encrypt(nonce, plaintext),
        _ => return Err(Error::Crypto("unsupported AES-GCM key size".into())),
    }
    .map_err(|e| Error::Crypto(format!("GCM encrypt: {e}")))?;

    let mut out = Vec::with_capacity(GCM_NONCE_LEN + ct.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ct);
    Ok(out)
}

fn gcm_decrypt(key_size: usize, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    use aes_gcm::{aead::Aead, KeyInit, Nonce};

    if data.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
        return Err(Error::Crypto("GCM ciphertext too short".into()));
    }
    let nonce = Nonce::from_slice(&data[..GCM_NONCE_LEN]);
    let ct_and_tag = &data[GCM_NONCE_LEN..];

    match key_size {
        16 => aes_gcm::Aes128Gcm::new_from_slice(key)
            .map_err(|e| Error::Crypto(format!("GCM init: {e}")))?
            .decrypt(nonce, ct_and_tag),
        24 => {
            use aes_gcm::aead::consts::U12;
            aes_gcm::AesGcm::<aes::Aes192, U12>::new_from_slice(key)
                .map_err(|e| Error::Crypto(format!("GCM init: {e}")))?
                .decrypt(nonce, ct_and_tag)
        }
        32 => aes_gcm::Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::Crypto(format!("GCM init: {e}")))?
            .decrypt(nonce, ct_and_tag),
        _ => return Err(Error::Crypto("unsupported AES-GCM key size".into())),
    }
    .map_err(|e| Error::Crypto(format!("GCM decrypt: {e}")))
}

// ── XML Encryption block padding ─────────────────────────────────────

fn pad_block(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad_len = block_size - (data.len() % block_size);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad_len, pad_len as u8);
    padded
}

/// Remove XML Encryption block padding.
///
/// Both padding schemes XML Encryption permits (PKCS#7-style and ISO 10126 random
/// filler) store the padding length in the final octet, so only that octet
/// is checked.
fn unpad_block(data: &[u8], block_size: usize) -> Result<Vec<u8>, Error> {
    let pad_len = match data.last() {
        Some(&b) => b as usize,
        None => return Ok(Vec::new()),
    };
    if pad_len == 0 || pad_len > block_size || pad_len > data.len() {
        return Err(Error::Crypto("invalid block padding".into()));
    }
    Ok(data[..data.len() - pad_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_roundtrip() {
        let padded = pad_block(b"hello", 16);
        assert_eq!(padded.len(), 16);
        assert_eq!(unpad_block(&padded, 16).unwrap(), b"hello");
    }

    #[test]
    fn iso10126_padding_accepted() {
        // Random filler bytes, length in the last octet only.
        let mut data = b"hello world!".to_vec();
        data.extend_from_slice(&[0x5a, 0x11, 0xfe, 0x04]);
        assert_eq!(unpad_block(&data, 16).unwrap(), b"hello world!");
    }

    #[test]
    fn cbc_roundtrip_all_key_sizes() {
        let uris = [
            algorithm::AES128_CBC,
            algorithm::AES192_CBC,
            algorithm::AES256_CBC,
        ];
        let plaintexts: &[&[u8]] = &[
            b"A",
            b"Hello, World!",
            b"Exactly16bytes!!",
            b"A longer message spanning several AES blocks for good measure.",
        ];
        for uri in uris {
            let cipher = BlockCipher::from_uri(uri).unwrap();
            let key: Vec<u8> = (0..cipher.key_size()).map(|i| i as u8).collect();
            for &pt in plaintexts {
                let ct = cipher.encrypt(&key, pt).unwrap();
                assert_ne!(&ct[16..], pt);
                assert_eq!(cipher.decrypt(&key, &ct).unwrap(), pt, "{uri}");
            }
        }
    }

    #[test]
    fn gcm_roundtrip_all_key_sizes() {
        let uris = [
            algorithm::AES128_GCM,
            algorithm::AES192_GCM,
            algorithm::AES256_GCM,
        ];
        let pt = b"Authenticated encryption test message";
        for uri in uris {
            let cipher = BlockCipher::from_uri(uri).unwrap();
            let key: Vec<u8> = (0..cipher.key_size()).map(|i| (i * 7) as u8).collect();
            let ct = cipher.encrypt(&key, pt).unwrap();
            assert_eq!(cipher.decrypt(&key, &ct).unwrap(), pt, "{uri}");
        }
    }

    #[test]
    fn gcm_tamper_detected() {
        let cipher = BlockCipher::Aes128Gcm;
        let key = [0x42u8; 16];
        let mut ct = cipher.encrypt(&key, b"integrity protected").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xff;
        assert!(cipher.decrypt(&key, &ct).is_err());
    }

    #[test]
    fn gcm_wrong_key_fails() {
        let cipher = BlockCipher::Aes256Gcm;
        let ct = cipher.encrypt(&[0x01u8; 32], b"secret").unwrap();
        assert!(cipher.decrypt(&[0x02u8; 32], &ct).is_err());
    }

    #[test]
    fn tripledes_roundtrip() {
        let cipher = BlockCipher::TripleDesCbc;
        let key = [0x42u8; 24];
        let ct = cipher.encrypt(&key, b"legacy data").unwrap();
        assert_eq!(cipher.decrypt(&key, &ct).unwrap(), b"legacy data");
    }

    #[test]
    fn wrong_key_size_rejected() {
        let cipher = BlockCipher::Aes128Cbc;
        assert!(cipher.encrypt(&[0u8; 15], b"x").is_err());
    }

    #[test]
    fn unknown_uri_rejected() {
        assert!(BlockCipher::from_uri("http://example.com/not-a-cipher").is_err());
    }
}
