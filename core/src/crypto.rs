//! The ciphers used to protect secrets in the directory.
//!
//! Every hash goes through two layers: an outer layer keyed by a password encryption key
//! (RC4 on older databases, AES-128-CBC since Windows Server 2016), and an inner
//! DES layer keyed by the RID of the account.

use aes::{
    cipher::{consts::U16, generic_array::GenericArray, BlockDecryptMut, KeyIvInit},
    Aes128,
};
use cbc::Decryptor;
use des::{
    cipher::{BlockDecrypt, BlockEncrypt, KeyInit},
    Des,
};
use md5::{Digest, Md5};
use rc4::{Rc4, StreamCipher};

use crate::error::{DitError, DitResult};

/// The length of a hash, a key or an AES block.
pub const HASH_LENGTH: usize = 0x10;

/// An LM or NT hash.
pub type Hash = [u8; HASH_LENGTH];

/// The AES-128-CBC decryptor.
type Aes128CbcDec = Decryptor<Aes128>;

/// The permutation used to reorder the RID into the first DES key seed.
const DES_SEED_1_PERMUTATION: [u8; 7] = [0, 1, 2, 3, 0, 1, 2];

/// The permutation used to reorder the RID into the second DES key seed.
const DES_SEED_2_PERMUTATION: [u8; 7] = [3, 0, 1, 2, 3, 0, 1];

/// Odd parity array for the DES key derivation algorithm.
const ODD_PARITY: [u8; 256] = [
    1, 1, 2, 2, 4, 4, 7, 7, 8, 8, 11, 11, 13, 13, 14, 14, 16, 16, 19, 19, 21, 21, 22, 22, 25, 25,
    26, 26, 28, 28, 31, 31, 32, 32, 35, 35, 37, 37, 38, 38, 41, 41, 42, 42, 44, 44, 47, 47, 49, 49,
    50, 50, 52, 52, 55, 55, 56, 56, 59, 59, 61, 61, 62, 62, 64, 64, 67, 67, 69, 69, 70, 70, 73, 73,
    74, 74, 76, 76, 79, 79, 81, 81, 82, 82, 84, 84, 87, 87, 88, 88, 91, 91, 93, 93, 94, 94, 97, 97,
    98, 98, 100, 100, 103, 103, 104, 104, 107, 107, 109, 109, 110, 110, 112, 112, 115, 115, 117,
    117, 118, 118, 121, 121, 122, 122, 124, 124, 127, 127, 128, 128, 131, 131, 133, 133, 134, 134,
    137, 137, 138, 138, 140, 140, 143, 143, 145, 145, 146, 146, 148, 148, 151, 151, 152, 152, 155,
    155, 157, 157, 158, 158, 161, 161, 162, 162, 164, 164, 167, 167, 168, 168, 171, 171, 173, 173,
    174, 174, 176, 176, 179, 179, 181, 181, 182, 182, 185, 185, 186, 186, 188, 188, 191, 191, 193,
    193, 194, 194, 196, 196, 199, 199, 200, 200, 203, 203, 205, 205, 206, 206, 208, 208, 211, 211,
    213, 213, 214, 214, 217, 217, 218, 218, 220, 220, 223, 223, 224, 224, 227, 227, 229, 229, 230,
    230, 233, 233, 234, 234, 236, 236, 239, 239, 241, 241, 242, 242, 244, 244, 247, 247, 248, 248,
    251, 251, 253, 253, 254, 254,
];

/// Does a permutation.
fn permute<const N: usize>(array: &[u8], permutations: [u8; N]) -> [u8; N] {
    let mut res = [0; N];
    for (i, permutation) in permutations.iter().enumerate() {
        res[i] = array[*permutation as usize];
    }

    res
}

/// Derives a valid 8-byte DES key from a 7-byte seed,
/// by spreading the seed over 8 bytes and setting the low bit of each byte to odd parity.
fn expand_des_key(seed: &[u8; 7]) -> [u8; 8] {
    let mut key = [
        seed[0] >> 1,
        ((seed[0] & 0x01) << 6) | seed[1] >> 2,
        ((seed[1] & 0x03) << 5) | seed[2] >> 3,
        ((seed[2] & 0x07) << 4) | seed[3] >> 4,
        ((seed[3] & 0x0F) << 3) | seed[4] >> 5,
        ((seed[4] & 0x1F) << 2) | seed[5] >> 6,
        ((seed[5] & 0x3F) << 1) | seed[6] >> 7,
        seed[6] & 0x7F,
    ];

    for b in &mut key {
        *b = ODD_PARITY[(*b as usize) << 1];
    }

    key
}

/// Derives the two DES keys protecting the hashes of the account with the given RID.
pub fn derive_rid_des_keys(rid: u32) -> ([u8; 8], [u8; 8]) {
    let rid = rid.to_le_bytes();

    (
        expand_des_key(&permute(&rid, DES_SEED_1_PERMUTATION)),
        expand_des_key(&permute(&rid, DES_SEED_2_PERMUTATION)),
    )
}

/// Removes the RID-keyed DES layer of a hash.
pub fn remove_des_obfuscation(obfuscated: &Hash, rid: u32) -> Hash {
    let (key_1, key_2) = derive_rid_des_keys(rid);
    let mut hash = *obfuscated;
    let (first, second) = hash.split_at_mut(HASH_LENGTH / 2);

    Des::new(GenericArray::from_slice(&key_1)).decrypt_block(GenericArray::from_mut_slice(first));
    Des::new(GenericArray::from_slice(&key_2)).decrypt_block(GenericArray::from_mut_slice(second));

    hash
}

/// Applies the RID-keyed DES layer to a hash, the way the directory does before storing it.
pub fn apply_des_obfuscation(hash: &Hash, rid: u32) -> Hash {
    let (key_1, key_2) = derive_rid_des_keys(rid);
    let mut obfuscated = *hash;
    let (first, second) = obfuscated.split_at_mut(HASH_LENGTH / 2);

    Des::new(GenericArray::from_slice(&key_1)).encrypt_block(GenericArray::from_mut_slice(first));
    Des::new(GenericArray::from_slice(&key_2)).encrypt_block(GenericArray::from_mut_slice(second));

    obfuscated
}

/// Computes the MD5 digest of a key followed by a salt repeated `rounds` times.
pub fn md5_salted_key(key: &[u8], salt: &[u8], rounds: usize) -> [u8; HASH_LENGTH] {
    let mut md5 = Md5::new();
    md5.update(key);
    for _ in 0..rounds {
        md5.update(salt);
    }

    let mut digest = [0; HASH_LENGTH];
    digest.copy_from_slice(&md5.finalize());

    digest
}

/// Decrypts RC4-encrypted data.
/// RC4 is symmetric, so this also encrypts.
pub fn rc4_decrypt(key: &[u8; HASH_LENGTH], ciphertext: &[u8]) -> Vec<u8> {
    let mut rc4: Rc4<U16> = Rc4::new(GenericArray::from_slice(key));
    let mut plaintext = ciphertext.to_vec();
    rc4.apply_keystream(&mut plaintext);

    plaintext
}

/// Decrypts AES-128-CBC-encrypted data, without removing any padding.
/// A trailing partial block is zero-padded before decryption.
pub fn aes_decrypt(
    key: &[u8; HASH_LENGTH],
    iv: &[u8; HASH_LENGTH],
    ciphertext: &[u8],
) -> DitResult<Vec<u8>> {
    if ciphertext.is_empty() {
        return Err(DitError::UnsupportedBlobLength(0));
    }

    let mut plaintext = ciphertext.to_vec();
    let padded_len = plaintext.len().div_ceil(HASH_LENGTH) * HASH_LENGTH;
    plaintext.resize(padded_len, 0);

    let mut aes = Aes128CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    for block in plaintext.chunks_exact_mut(HASH_LENGTH) {
        aes.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }

    Ok(plaintext)
}
