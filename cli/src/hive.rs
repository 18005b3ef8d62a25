//! Reads the secrets of the SYSTEM hive needed to decrypt the directory.
//!
//! The boot key is scattered in the class names of four keys under `Control\Lsa`,
//! see https://www.insecurity.be/blog/2018/01/21/retrieving-ntlm-hashes-and-what-changed-technical-writeup/

use std::{fs, path::Path};

use anyhow::{Context, Result};
use ditdump_core::HASH_LENGTH;
use nt_hive::{Hive, NtHiveError};
use tracing::{debug, warn};

/// The permutation applied to the class names to get the boot key.
const BOOT_KEY_PERMUTATION: [u8; HASH_LENGTH] =
    [8, 5, 4, 2, 11, 9, 13, 3, 0, 6, 1, 12, 14, 10, 15, 7];

/// The keys whose class names make up the scrambled boot key, in order.
const BOOT_KEY_PARTS: [&str; 4] = ["JD", "Skew1", "GBG", "Data"];

/// The control set used when `Select\Current` can't be read.
const DEFAULT_CONTROL_SET: u32 = 1;

/// What the directory decryption needs from the SYSTEM hive.
#[derive(Debug, PartialEq, Eq)]
pub struct SystemSecrets {
    pub boot_key: [u8; HASH_LENGTH],
    /// Whether the domain controller doesn't store LM hashes.
    pub no_lm_hash: bool,
}

/// Reads the SYSTEM hive at the given path.
pub fn read_system_hive(path: &Path) -> Result<SystemSecrets> {
    let system = fs::read(path).context("Unable to read the SYSTEM file")?;

    parse_system_hive(&system).context("Unable to extract the boot key from the SYSTEM file")
}

/// Extracts the boot key and the NoLMHash policy from a SYSTEM hive.
pub fn parse_system_hive(system: &[u8]) -> Result<SystemSecrets> {
    // If the Windows partition is in fast-startup mode, the hive will be considered "dirty".
    // We can still extract the secrets, but we need to ignore the header verifications.
    let hive = match Hive::new(system) {
        Ok(hive) => hive,

        Err(NtHiveError::SequenceNumberMismatch { primary, secondary })
            if primary == secondary + 1 =>
        {
            warn!("The Windows partition is using fast-startup, disabling header verification");
            Hive::without_validation(system)?
        }

        Err(e) => return Err(e.into()),
    };

    let root = hive.root_key_node()?;

    let current = match root.subpath("Select") {
        Some(select) => match select?.value("Current") {
            Some(current) => current?.dword_data()?,
            None => DEFAULT_CONTROL_SET,
        },
        None => DEFAULT_CONTROL_SET,
    };
    let lsa_path = format!("ControlSet{current:03}\\Control\\Lsa");
    debug!("reading the LSA secrets from {lsa_path}");

    let lsa = root
        .subpath(&lsa_path)
        .with_context(|| format!("The {lsa_path} key is missing"))??;

    let mut class_names = String::new();
    for part in BOOT_KEY_PARTS {
        let key = lsa
            .subkey(part)
            .with_context(|| format!("The {lsa_path}\\{part} key is missing"))??;
        let class_name = key
            .class_name()
            .with_context(|| format!("The {lsa_path}\\{part} key has no class name"))??;

        class_names.push_str(&class_name.to_string());
    }

    let no_lm_hash = match lsa.value("NoLMHash") {
        Some(value) => value?.dword_data()? == 1,
        None => false,
    };

    Ok(SystemSecrets {
        boot_key: derive_boot_key(&class_names)?,
        no_lm_hash,
    })
}

/// Unscrambles the boot key from the concatenated class names.
fn derive_boot_key(class_names: &str) -> Result<[u8; HASH_LENGTH]> {
    let scrambled =
        hex::decode(class_names).context("The boot key class names are not hexadecimal")?;
    anyhow::ensure!(
        scrambled.len() == HASH_LENGTH,
        "The boot key class names hold {} bytes instead of {HASH_LENGTH}",
        scrambled.len()
    );

    let mut boot_key = [0; HASH_LENGTH];
    for (byte, index) in boot_key.iter_mut().zip(BOOT_KEY_PERMUTATION) {
        *byte = scrambled[index as usize];
    }

    Ok(boot_key)
}
