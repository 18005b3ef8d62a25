//! Parsing of the encrypted attributes of the directory.
//!
//! Hash attributes (`unicodePwd`, `dBCSPwd` and their histories) and the PEK list share
//! the same shape: an 8-byte header whose first 4 bytes identify the cipher, 16 bytes
//! of key material, then the ciphertext.
//!
//! ```text
//! legacy hash:  | header (8) | salt (16) | ciphertext                  |
//! AES hash:     | header (8) | IV (16)   | length (4) | ciphertext     |
//! PEK list:     | header (8) | salt/IV (16) | ciphertext               |
//! ```

use crate::error::{DitError, DitResult};

/// The length of a blob header.
pub const HEADER_LENGTH: usize = 8;

/// The length of the key material (RC4 salt or AES IV).
pub const KEY_MATERIAL_LENGTH: usize = 16;

/// The offset of the PEK index in the header of a hash blob.
pub const PEK_INDEX_OFFSET: usize = 4;

/// The length of the plaintext length field of AES hash blobs.
const PLAINTEXT_LENGTH_LENGTH: usize = 4;

/// The smallest ciphertext a hash blob can carry.
const MIN_CIPHERTEXT_LENGTH: usize = 16;

/// The marker of AES-encrypted hash blobs.
pub const AES_HASH_MARKER: [u8; 4] = [0x13, 0x00, 0x00, 0x00];

/// The marker of RC4-encrypted PEK lists (Windows 2000 to 2012 R2).
pub const RC4_PEK_LIST_MARKER: [u8; 4] = [0x02, 0x00, 0x00, 0x00];

/// The marker of AES-encrypted PEK lists (Windows 2016 and later).
pub const AES_PEK_LIST_MARKER: [u8; 4] = [0x03, 0x00, 0x00, 0x00];

/// The cipher protecting a blob.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlobLayout {
    /// RC4 keyed with an MD5 of the key and the salt.
    Legacy,
    /// AES-128-CBC.
    Aes,
}

impl BlobLayout {
    /// Detects the layout of a hash blob from its first 4 bytes.
    pub fn detect(raw: &[u8]) -> BlobLayout {
        if raw.starts_with(&AES_HASH_MARKER) {
            BlobLayout::Aes
        } else {
            BlobLayout::Legacy
        }
    }

    /// Detects the layout of a PEK list from its first 4 bytes.
    /// Unlike hash blobs, both layouts of the PEK list have their own marker.
    pub fn detect_pek_list(raw: &[u8]) -> DitResult<BlobLayout> {
        match raw.get(..4) {
            Some(marker) if marker == RC4_PEK_LIST_MARKER => Ok(BlobLayout::Legacy),
            Some(marker) if marker == AES_PEK_LIST_MARKER => Ok(BlobLayout::Aes),
            Some(marker) => Err(DitError::PekDerivationFailed(format!(
                "unknown PEK list marker {marker:02x?}"
            ))),
            None => Err(DitError::TruncatedBlob {
                expected: HEADER_LENGTH + KEY_MATERIAL_LENGTH,
                found: raw.len(),
            }),
        }
    }
}

/// An encrypted attribute, split into its fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub header: [u8; HEADER_LENGTH],
    pub layout: BlobLayout,
    pub key_material: [u8; KEY_MATERIAL_LENGTH],
    /// The length of the plaintext, only stored in AES hash blobs.
    pub plaintext_length: Option<usize>,
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Parses an encrypted hash attribute.
    pub fn parse(raw: &[u8]) -> DitResult<EncryptedBlob> {
        let layout = BlobLayout::detect(raw);

        let ciphertext_start = match layout {
            BlobLayout::Legacy => HEADER_LENGTH + KEY_MATERIAL_LENGTH,
            BlobLayout::Aes => HEADER_LENGTH + KEY_MATERIAL_LENGTH + PLAINTEXT_LENGTH_LENGTH,
        };

        let expected = ciphertext_start + MIN_CIPHERTEXT_LENGTH;
        if raw.len() < expected {
            return Err(DitError::TruncatedBlob {
                expected,
                found: raw.len(),
            });
        }

        let mut blob = Self::split(raw, layout, ciphertext_start);
        if layout == BlobLayout::Aes {
            let length_field = &raw[ciphertext_start - PLAINTEXT_LENGTH_LENGTH..ciphertext_start];
            let length = u32::from_le_bytes([
                length_field[0],
                length_field[1],
                length_field[2],
                length_field[3],
            ]);
            blob.plaintext_length = Some(length as usize);
        }

        Ok(blob)
    }

    /// Parses an encrypted PEK list attribute.
    pub fn parse_pek_list(raw: &[u8]) -> DitResult<EncryptedBlob> {
        let layout = BlobLayout::detect_pek_list(raw)?;
        let ciphertext_start = HEADER_LENGTH + KEY_MATERIAL_LENGTH;

        if raw.len() <= ciphertext_start {
            return Err(DitError::TruncatedBlob {
                expected: ciphertext_start + 1,
                found: raw.len(),
            });
        }

        Ok(Self::split(raw, layout, ciphertext_start))
    }

    /// Splits a blob whose length has been checked.
    fn split(raw: &[u8], layout: BlobLayout, ciphertext_start: usize) -> EncryptedBlob {
        let mut header = [0; HEADER_LENGTH];
        header.copy_from_slice(&raw[..HEADER_LENGTH]);

        let mut key_material = [0; KEY_MATERIAL_LENGTH];
        key_material.copy_from_slice(&raw[HEADER_LENGTH..HEADER_LENGTH + KEY_MATERIAL_LENGTH]);

        EncryptedBlob {
            header,
            layout,
            key_material,
            plaintext_length: None,
            ciphertext: raw[ciphertext_start..].to_vec(),
        }
    }

    /// Returns the index of the PEK protecting this blob.
    pub fn pek_index(&self) -> usize {
        self.header[PEK_INDEX_OFFSET] as usize
    }
}
