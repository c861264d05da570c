//! The "chamber": a small persisted encrypted-record store.
//!
//! Out of scope as a core subsystem, but specified as an external
//! collaborator: a sequence of encrypted TLV records keyed by a local
//! 32-byte label, exposing only `store`/`retrieve`/`delete`. This
//! implementation keeps each record's on-disk layout private to this
//! module — callers never see anything but the label/value interface.
//!
//! Each record is encrypted with a key derived from a local passphrase via
//! Argon2id (OWASP-recommended defaults), then `XChaCha20Poly1305`, the
//! same two-stage approach used elsewhere in this crate for protecting
//! key material at rest.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use argon2::{Algorithm, Argon2, Params, ParamsBuilder, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::random::fill_random;

/// A 32-byte label identifying a chamber record.
pub type Label = [u8; 32];

const SALT_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;

/// Argon2id parameters used to derive the chamber's master key.
///
/// Defaults follow OWASP's password-hashing recommendations for
/// high-security applications: 64 MiB memory, 4 iterations, parallelism 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChamberParams {
    /// Memory cost in KiB.
    pub memory_cost_kib: u32,
    /// Number of iterations.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for ChamberParams {
    fn default() -> Self {
        Self {
            memory_cost_kib: 65536,
            iterations: 4,
            parallelism: 4,
        }
    }
}

impl ChamberParams {
    fn build(&self) -> Result<Params> {
        ParamsBuilder::new()
            .m_cost(self.memory_cost_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .build()
            .map_err(|e| CryptoError::PrimitiveFailure(format!("argon2 params: {e}")))
    }
}

struct Record {
    salt: [u8; SALT_SIZE],
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
}

impl Record {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + SALT_SIZE + NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&(self.ciphertext.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 4 + SALT_SIZE + NONCE_SIZE {
            return Err(CryptoError::InvalidMetadata);
        }
        let len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let mut pos = 4;
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[pos..pos + SALT_SIZE]);
        pos += SALT_SIZE;
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[pos..pos + NONCE_SIZE]);
        pos += NONCE_SIZE;
        let ciphertext = bytes
            .get(pos..pos + len)
            .ok_or(CryptoError::InvalidMetadata)?
            .to_vec();
        pos += len;
        Ok((Record { salt, nonce, ciphertext }, pos))
    }
}

fn derive_record_key(passphrase: &[u8], salt: &[u8; SALT_SIZE], params: &ChamberParams) -> Result<[u8; 32]> {
    let argon2_params = params.build()?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
    let mut out = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut out)
        .map_err(|e| CryptoError::PrimitiveFailure(format!("argon2: {e}")))?;
    Ok(out)
}

/// A chamber: a local append-only file of encrypted label/value records.
///
/// Labels are matched by scanning the whole file; this is appropriate for
/// the small number of records a single node needs (its shared seed, a
/// handful of peer-specific settings), not for large-scale storage.
pub struct Chamber {
    path: PathBuf,
    passphrase: Vec<u8>,
    params: ChamberParams,
}

impl Drop for Chamber {
    fn drop(&mut self) {
        self.passphrase.zeroize();
    }
}

impl Chamber {
    /// Open (or prepare to create) a chamber file at `path`, protected by
    /// `passphrase`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>, passphrase: &[u8]) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            passphrase: passphrase.to_vec(),
            params: ChamberParams::default(),
        }
    }

    fn load_all(&self) -> Result<HashMap<Label, Record>> {
        let mut out = HashMap::new();
        let Ok(bytes) = fs::read(&self.path) else {
            return Ok(out);
        };
        let mut pos = 0;
        while pos < bytes.len() {
            if bytes.len() - pos < 32 {
                break;
            }
            let mut label = [0u8; 32];
            label.copy_from_slice(&bytes[pos..pos + 32]);
            pos += 32;
            let (record, consumed) = Record::from_bytes(&bytes[pos..])?;
            pos += consumed;
            out.insert(label, record);
        }
        Ok(out)
    }

    fn save_all(&self, records: &HashMap<Label, Record>) -> Result<()> {
        let mut out = Vec::new();
        for (label, record) in records {
            out.extend_from_slice(label);
            out.extend_from_slice(&record.to_bytes());
        }
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        fs::write(&self.path, out).map_err(|e| CryptoError::PrimitiveFailure(e.to_string()))
    }

    /// Encrypt and persist `value` under `label`, replacing any existing
    /// record for that label.
    pub fn store(&self, label: Label, value: &[u8]) -> Result<()> {
        let mut salt = [0u8; SALT_SIZE];
        fill_random(&mut salt).map_err(|_| CryptoError::RandomFailed)?;
        let mut nonce = [0u8; NONCE_SIZE];
        fill_random(&mut nonce).map_err(|_| CryptoError::RandomFailed)?;

        let mut key = derive_record_key(&self.passphrase, &salt, &self.params)?;
        let cipher = XChaCha20Poly1305::new((&key).into());
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), value)
            .map_err(|_| CryptoError::PrimitiveFailure("chamber encrypt".into()))?;
        key.zeroize();

        let mut records = self.load_all()?;
        records.insert(label, Record { salt, nonce, ciphertext });
        self.save_all(&records)
    }

    /// Decrypt and return the value stored under `label`, if present.
    pub fn retrieve(&self, label: Label) -> Result<Option<Vec<u8>>> {
        let records = self.load_all()?;
        let Some(record) = records.get(&label) else {
            return Ok(None);
        };
        let mut key = derive_record_key(&self.passphrase, &record.salt, &self.params)?;
        let cipher = XChaCha20Poly1305::new((&key).into());
        let plaintext = cipher
            .decrypt(XNonce::from_slice(&record.nonce), record.ciphertext.as_slice())
            .map_err(|_| CryptoError::DecryptFailed)?;
        key.zeroize();
        Ok(Some(plaintext))
    }

    /// Remove the record stored under `label`, if present.
    pub fn delete(&self, label: Label) -> Result<()> {
        let mut records = self.load_all()?;
        records.remove(&label);
        self.save_all(&records)
    }
}
