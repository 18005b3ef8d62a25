//! The password encryption keys (PEK) of the directory.
//!
//! The `pekList` attribute holds the keys protecting every hash of the database,
//! encrypted with the boot key of the domain controller.

use tracing::debug;

use crate::{
    blob::{BlobLayout, EncryptedBlob},
    crypto::{aes_decrypt, md5_salted_key, rc4_decrypt, Hash, HASH_LENGTH},
    error::{DitError, DitResult},
};

/// The number of times the key material is appended to the boot key
/// to build the RC4 key of a legacy PEK list.
const PEK_LIST_SALT_ROUNDS: usize = 1000;

/// The length of the decrypted PEK list header, which carries no key.
const PEK_LIST_HEADER_LENGTH: usize = 32;

/// The length of a PEK entry: a 4-byte identifier followed by the key.
const PEK_ENTRY_LENGTH: usize = 4 + HASH_LENGTH;

/// The working password encryption keys, in on-disk order.
///
/// Hash blobs select their key with the index stored in their header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PekTable {
    keys: Vec<Hash>,
}

impl PekTable {
    /// Decrypts the PEK list with the boot key.
    pub fn derive(boot_key: &[u8], encrypted_pek_list: &[u8]) -> DitResult<PekTable> {
        let boot_key: &Hash = boot_key
            .try_into()
            .map_err(|_| DitError::InvalidBootKey(boot_key.len()))?;

        let table = Self::decrypt(boot_key, encrypted_pek_list).map_err(|e| match e {
            e @ DitError::PekDerivationFailed(_) => e,
            e => DitError::PekDerivationFailed(e.to_string()),
        })?;

        debug!("{} PEK(s) recovered", table.len());

        Ok(table)
    }

    fn decrypt(boot_key: &Hash, encrypted_pek_list: &[u8]) -> DitResult<PekTable> {
        let blob = EncryptedBlob::parse_pek_list(encrypted_pek_list)?;

        let plaintext = match blob.layout {
            BlobLayout::Legacy => {
                let rc4_key =
                    md5_salted_key(boot_key, &blob.key_material, PEK_LIST_SALT_ROUNDS);
                rc4_decrypt(&rc4_key, &blob.ciphertext)
            }
            BlobLayout::Aes => aes_decrypt(boot_key, &blob.key_material, &blob.ciphertext)?,
        };

        let Some(entries) = plaintext.get(PEK_LIST_HEADER_LENGTH..) else {
            return Err(DitError::PekDerivationFailed(format!(
                "the decrypted PEK list is {} bytes long, shorter than its header",
                plaintext.len()
            )));
        };

        let key_bytes = match blob.layout {
            BlobLayout::Legacy => legacy_key_bytes(entries)?,
            BlobLayout::Aes => indexed_key_bytes(entries),
        };

        Self::from_key_bytes(&key_bytes)
    }

    /// Splits a flat buffer of keys into a table.
    pub fn from_key_bytes(key_bytes: &[u8]) -> DitResult<PekTable> {
        if key_bytes.is_empty() {
            return Err(DitError::PekDerivationFailed(
                "the PEK list holds no key".to_owned(),
            ));
        }

        if key_bytes.len() % HASH_LENGTH != 0 {
            return Err(DitError::PekDerivationFailed(format!(
                "{} bytes of keys is not a whole number of keys",
                key_bytes.len()
            )));
        }

        let keys = key_bytes
            .chunks_exact(HASH_LENGTH)
            .map(|chunk| {
                let mut key = [0; HASH_LENGTH];
                key.copy_from_slice(chunk);
                key
            })
            .collect();

        Ok(PekTable { keys })
    }

    /// Returns the key at the given index.
    pub fn get(&self, index: usize) -> DitResult<&Hash> {
        self.keys.get(index).ok_or(DitError::PekIndexOutOfRange {
            index,
            len: self.keys.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Extracts the keys of a legacy PEK list.
/// Each entry is a 1-byte identifier, 3 bytes of padding and the key.
fn legacy_key_bytes(entries: &[u8]) -> DitResult<Vec<u8>> {
    if entries.len() % PEK_ENTRY_LENGTH != 0 {
        return Err(DitError::PekDerivationFailed(format!(
            "{} bytes of entries is not a whole number of PEK entries",
            entries.len()
        )));
    }

    Ok(entries
        .chunks_exact(PEK_ENTRY_LENGTH)
        .flat_map(|entry| &entry[4..])
        .copied()
        .collect())
}

/// Extracts the keys of an AES PEK list.
/// Each entry is a little-endian index followed by the key. The list ends at the first
/// entry whose index is out of sequence, since the plaintext is padded.
fn indexed_key_bytes(entries: &[u8]) -> Vec<u8> {
    let mut key_bytes = Vec::new();

    for (expected, entry) in entries.chunks_exact(PEK_ENTRY_LENGTH).enumerate() {
        let index = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
        if index as usize != expected {
            break;
        }

        key_bytes.extend_from_slice(&entry[4..]);
    }

    key_bytes
}
