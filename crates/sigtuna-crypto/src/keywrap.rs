#![forbid(unsafe_code)]

//! Symmetric key wrap algorithms (AES-KW per RFC 3394, 3DES-KW per RFC 3217).

use aes_kw::Kek;
use sigtuna_core::{algorithm, Error};

/// A key wrap algorithm selected by URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWrap {
    Aes128,
    Aes192,
    Aes256,
    TripleDes,
}

impl KeyWrap {
    /// Select a key wrap algorithm by its algorithm URI.
    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        match uri {
            algorithm::KW_AES128 => Ok(Self::Aes128),
            algorithm::KW_AES192 => Ok(Self::Aes192),
            algorithm::KW_AES256 => Ok(Self::Aes256),
            algorithm::KW_TRIPLEDES => Ok(Self::TripleDes),
            _ => Err(Error::UnsupportedAlgorithm(format!("key wrap: {uri}"))),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Self::Aes128 => algorithm::KW_AES128,
            Self::Aes192 => algorithm::KW_AES192,
            Self::Aes256 => algorithm::KW_AES256,
            Self::TripleDes => algorithm::KW_TRIPLEDES,
        }
    }

    /// Required key-encryption-key size in bytes.
    pub fn kek_size(&self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 | Self::TripleDes => 24,
            Self::Aes256 => 32,
        }
    }

    /// Wrap `key_data` under `kek`.
    pub fn wrap(&self, kek: &[u8], key_data: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_kek(kek)?;
        match self {
            Self::Aes128 => aes_wrap::<aes::Aes128>(kek, key_data),
            Self::Aes192 => aes_wrap::<aes::Aes192>(kek, key_data),
            Self::Aes256 => aes_wrap::<aes::Aes256>(kek, key_data),
            Self::TripleDes => tdes_wrap(kek, key_data),
        }
    }

    /// Unwrap `wrapped` under `kek`, verifying the integrity check value.
    pub fn unwrap(&self, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_kek(kek)?;
        match self {
            Self::Aes128 => aes_unwrap::<aes::Aes128>(kek, wrapped),
            Self::Aes192 => aes_unwrap::<aes::Aes192>(kek, wrapped),
            Self::Aes256 => aes_unwrap::<aes::Aes256>(kek, wrapped),
            Self::TripleDes => tdes_unwrap(kek, wrapped),
        }
    }

    fn check_kek(&self, kek: &[u8]) -> Result<(), Error> {
        if kek.len() != self.kek_size() {
            return Err(Error::Crypto(format!(
                "{} expects a {} byte KEK, got {}",
                self.uri(),
                self.kek_size(),
                kek.len()
            )));
        }
        Ok(())
    }
}

// ── AES-KW (RFC 3394) ────────────────────────────────────────────────

fn aes_wrap<C>(kek: &[u8], key_data: &[u8]) -> Result<Vec<u8>, Error>
where
    C: aes::cipher::BlockCipher<BlockSize = aes::cipher::consts::U16>
        + aes::cipher::BlockEncrypt
        + aes::cipher::BlockDecrypt
        + aes::cipher::KeyInit,
{
    if key_data.len() < 16 || key_data.len() % 8 != 0 {
        return Err(Error::Crypto(
            "AES-KW input must be a multiple of 8 bytes, at least 16".into(),
        ));
    }
    let kek = Kek::<C>::new(kek.into());
    let mut out = vec![0u8; key_data.len() + 8];
    kek.wrap(key_data, &mut out)
        .map_err(|e| Error::Crypto(format!("AES-KW wrap: {e}")))?;
    Ok(out)
}

fn aes_unwrap<C>(kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>, Error>
where
    C: aes::cipher::BlockCipher<BlockSize = aes::cipher::consts::U16>
        + aes::cipher::BlockEncrypt
        + aes::cipher::BlockDecrypt
        + aes::cipher::KeyInit,
{
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(Error::Crypto("AES-KW wrapped data has invalid length".into()));
    }
    let kek = Kek::<C>::new(kek.into());
    let mut out = vec![0u8; wrapped.len() - 8];
    kek.unwrap(wrapped, &mut out)
        .map_err(|e| Error::Crypto(format!("AES-KW unwrap: {e}")))?;
    Ok(out)
}

// ── 3DES-KW (RFC 3217) ───────────────────────────────────────────────

/// Fixed IV for the outer 3DES-CBC pass (RFC 3217 section 3.2).
const TDES_KW_IV: [u8; 8] = [0x4a, 0xdd, 0xa2, 0x2c, 0x79, 0xe8, 0x21, 0x05];

fn tdes_wrap(kek: &[u8], key_data: &[u8]) -> Result<Vec<u8>, Error> {
    use rand::RngCore;
    use sha1::Digest;

    // WKCKS = key data followed by the first 8 bytes of its SHA-1 hash.
    let checksum = sha1::Sha1::digest(key_data);
    let mut wkcks = Vec::with_capacity(key_data.len() + 8);
    wkcks.extend_from_slice(key_data);
    wkcks.extend_from_slice(&checksum[..8]);

    let mut iv = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut iv);

    let inner = tdes_cbc_raw(kek, &iv, &wkcks, true)?;
    let mut temp = Vec::with_capacity(8 + inner.len());
    temp.extend_from_slice(&iv);
    temp.extend_from_slice(&inner);
    temp.reverse();

    tdes_cbc_raw(kek, &TDES_KW_IV, &temp, true)
}

fn tdes_unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>, Error> {
    use sha1::Digest;

    if wrapped.len() < 16 || wrapped.len() % 8 != 0 {
        return Err(Error::Crypto("3DES-KW wrapped data has invalid length".into()));
    }

    let mut temp = tdes_cbc_raw(kek, &TDES_KW_IV, wrapped, false)?;
    temp.reverse();

    let iv: [u8; 8] = temp[..8]
        .try_into()
        .map_err(|_| Error::Crypto("3DES-KW inner IV missing".into()))?;
    let wkcks = tdes_cbc_raw(kek, &iv, &temp[8..], false)?;

    if wkcks.len() < 8 {
        return Err(Error::Crypto("3DES-KW decrypted data too short".into()));
    }
    let (key_data, checksum) = wkcks.split_at(wkcks.len() - 8);
    let expected = sha1::Sha1::digest(key_data);
    if checksum != &expected[..8] {
        return Err(Error::Crypto("3DES-KW key checksum mismatch".into()));
    }
    Ok(key_data.to_vec())
}

/// 3DES-CBC without padding; input must be block-aligned.
fn tdes_cbc_raw(key: &[u8], iv: &[u8; 8], data: &[u8], encrypt: bool) -> Result<Vec<u8>, Error> {
    use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

    if data.len() % 8 != 0 {
        return Err(Error::Crypto("3DES-KW data not block-aligned".into()));
    }
    let mut buf = data.to_vec();
    if encrypt {
        let enc = cbc::Encryptor::<des::TdesEde3>::new_from_slices(key, iv)
            .map_err(|e| Error::Crypto(format!("3DES-CBC init: {e}")))?;
        let len = buf.len();
        enc.encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, len)
            .map_err(|e| Error::Crypto(format!("3DES-CBC encrypt: {e}")))?;
    } else {
        let dec = cbc::Decryptor::<des::TdesEde3>::new_from_slices(key, iv)
            .map_err(|e| Error::Crypto(format!("3DES-CBC init: {e}")))?;
        dec.decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf)
            .map_err(|e| Error::Crypto(format!("3DES-CBC decrypt: {e}")))?;
    }
    Ok(buf)
}
