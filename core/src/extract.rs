use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    attributes::{self, account_type, ACCOUNT_DISABLE},
    blob::{BlobLayout, EncryptedBlob},
    column::TypedValue,
    crypto::{aes_decrypt, md5_salted_key, rc4_decrypt, remove_des_obfuscation, Hash, HASH_LENGTH},
    error::{DitError, DitResult},
    pek::PekTable,
    record::Record,
    sid::Sid,
};

/// The LM hash of an empty password, used when an account has no LM hash.
pub const EMPTY_LM_HASH: Hash = [
    0xaa, 0xd3, 0xb4, 0x35, 0xb5, 0x14, 0x04, 0xee, 0xaa, 0xd3, 0xb4, 0x35, 0xb5, 0x14, 0x04, 0xee,
];

/// The NT hash of an empty password, used when an account has no NT hash.
pub const EMPTY_NT_HASH: Hash = [
    0x31, 0xd6, 0xcf, 0xe0, 0xd1, 0x6a, 0xe9, 0x31, 0xb7, 0x3c, 0x59, 0xd7, 0xe0, 0xc0, 0x89, 0xc0,
];

/// The two hashes stored for every account.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HashKind {
    Lm,
    Nt,
}

impl HashKind {
    /// The column holding the current hash.
    pub fn column(self) -> &'static str {
        match self {
            Self::Lm => attributes::DBCS_PWD,
            Self::Nt => attributes::UNICODE_PWD,
        }
    }

    /// The column holding the previous hashes.
    pub fn history_column(self) -> &'static str {
        match self {
            Self::Lm => attributes::LM_PWD_HISTORY,
            Self::Nt => attributes::NT_PWD_HISTORY,
        }
    }

    /// The hash of an empty password.
    pub fn empty(self) -> Hash {
        match self {
            Self::Lm => EMPTY_LM_HASH,
            Self::Nt => EMPTY_NT_HASH,
        }
    }

    fn attribute_name(self, history: bool) -> &'static str {
        match (self, history) {
            (Self::Lm, false) => "dBCSPwd",
            (Self::Nt, false) => "unicodePwd",
            (Self::Lm, true) => "lmPwdHistory",
            (Self::Nt, true) => "ntPwdHistory",
        }
    }
}

/// What to extract from every record.
#[derive(Clone, Debug, Default)]
pub struct ExtractOptions {
    history: bool,
    no_lm_hash: bool,
    enabled_only: bool,
}

impl ExtractOptions {
    /// Creates the default options: current hashes of every account.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also decrypts the password history of the accounts.
    pub fn history(mut self, history: bool) -> Self {
        self.history = history;

        self
    }

    /// Sets whether the domain controller has the NoLMHash policy.
    /// When set, the LM password history is reported as empty hashes.
    pub fn no_lm_hash(mut self, no_lm_hash: bool) -> Self {
        self.no_lm_hash = no_lm_hash;

        self
    }

    /// Ignores the disabled accounts.
    pub fn enabled_only(mut self, enabled_only: bool) -> Self {
        self.enabled_only = enabled_only;

        self
    }
}

/// The credentials of an account.
#[derive(Debug)]
pub struct DumpedHash {
    pub rid: u32,
    pub sid: Sid,
    pub username: String,
    pub user_principal_name: Option<String>,
    pub lm_hash: Hash,
    pub nt_hash: Hash,
    /// Empty unless the history was requested.
    pub lm_history: Vec<Hash>,
    /// Empty unless the history was requested.
    pub nt_history: Vec<Hash>,
    pub account_type: u32,
    pub user_account_control: Option<u32>,
    /// Every decodable column of the record, keyed by column name.
    pub attributes: BTreeMap<String, TypedValue>,
    /// The attributes that could not be decrypted, as [`DitError::Attribute`] errors.
    /// Their hash is reported as the empty hash and their history as empty.
    pub attribute_errors: Vec<DitError>,
}

impl DumpedHash {
    /// Returns true if the account is not disabled.
    pub fn enabled(&self) -> bool {
        self.user_account_control
            .map_or(true, |uac| uac & ACCOUNT_DISABLE == 0)
    }
}

/// Decrypts the hashes of the records of the directory.
#[derive(Clone, Debug)]
pub struct HashExtractor {
    pek: PekTable,
    options: ExtractOptions,
}

impl HashExtractor {
    pub fn new(pek: PekTable, options: ExtractOptions) -> Self {
        Self { pek, options }
    }

    /// Extracts the credentials of a record.
    ///
    /// Returns `None` if the record is not an account, or was filtered out.
    /// Fails if the SID or the NT hash can't be read. The other attributes that can't be
    /// decrypted are reported in [`DumpedHash::attribute_errors`].
    pub fn extract(&self, record: &Record) -> DitResult<Option<DumpedHash>> {
        let Some(account_type) = record
            .get_integer(attributes::SAM_ACCOUNT_TYPE)?
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| account_type::ALL.contains(v))
        else {
            return Ok(None);
        };

        let username = record
            .get_text(attributes::SAM_ACCOUNT_NAME)?
            .unwrap_or_default();
        if username.chars().any(char::is_control) {
            debug!("ignoring account with a non-printable name {username:?}");
            return Ok(None);
        }

        let user_account_control = optional(
            attributes::USER_ACCOUNT_CONTROL,
            record.get_integer(attributes::USER_ACCOUNT_CONTROL),
        )
        .and_then(|v| u32::try_from(v).ok());

        let raw_sid = record
            .get_bytes(attributes::OBJECT_SID)?
            .ok_or(DitError::MissingColumn("objectSid"))?;
        let sid = Sid::parse(&raw_sid)?;
        let rid = sid
            .rid()
            .ok_or(DitError::MalformedSid("no sub-authority"))?;

        let mut attribute_errors = Vec::new();

        let nt_hash = self.current_hash(record, HashKind::Nt, rid)?;
        let lm_hash = self
            .current_hash(record, HashKind::Lm, rid)
            .unwrap_or_else(|e| {
                attribute_errors.push(e);
                HashKind::Lm.empty()
            });

        let mut dumped = DumpedHash {
            rid,
            sid,
            username,
            user_principal_name: optional(
                attributes::USER_PRINCIPAL_NAME,
                record.get_text(attributes::USER_PRINCIPAL_NAME),
            ),
            lm_hash,
            nt_hash,
            lm_history: Vec::new(),
            nt_history: Vec::new(),
            account_type,
            user_account_control,
            attributes: record.decode_all(),
            attribute_errors,
        };

        if self.options.enabled_only && !dumped.enabled() {
            debug!("ignoring disabled account {}", dumped.username);
            return Ok(None);
        }

        if self.options.history {
            for kind in [HashKind::Lm, HashKind::Nt] {
                let history = self.history(record, kind, rid).unwrap_or_else(|e| {
                    dumped.attribute_errors.push(e);
                    Vec::new()
                });

                match kind {
                    HashKind::Lm => dumped.lm_history = history,
                    HashKind::Nt => dumped.nt_history = history,
                }
            }
        }

        Ok(Some(dumped))
    }

    /// Decrypts the current hash of the given kind,
    /// or returns the empty hash if the account has none.
    pub fn current_hash(&self, record: &Record, kind: HashKind, rid: u32) -> DitResult<Hash> {
        let attribute_error = |source| DitError::Attribute {
            attribute: kind.attribute_name(false),
            source: Box::new(source),
        };

        let raw = match record.get_bytes(kind.column()).map_err(attribute_error)? {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(kind.empty()),
        };

        self.decrypt_hash(&raw, rid).map_err(attribute_error)
    }

    fn decrypt_hash(&self, raw: &[u8], rid: u32) -> DitResult<Hash> {
        let blob = EncryptedBlob::parse(raw)?;

        let expected_length = match blob.layout {
            BlobLayout::Legacy => blob.ciphertext.len() == HASH_LENGTH,
            BlobLayout::Aes => blob.ciphertext.len() % HASH_LENGTH == 0,
        };
        if !expected_length {
            return Err(DitError::UnsupportedBlobLength(blob.ciphertext.len()));
        }

        let plaintext = self.decrypt_blob(&blob)?;
        let obfuscated: &Hash = plaintext
            .get(..HASH_LENGTH)
            .and_then(|head| head.try_into().ok())
            .ok_or(DitError::UnsupportedBlobLength(blob.ciphertext.len()))?;

        Ok(remove_des_obfuscation(obfuscated, rid))
    }

    /// Decrypts the password history of the given kind.
    pub fn history(&self, record: &Record, kind: HashKind, rid: u32) -> DitResult<Vec<Hash>> {
        let attribute_error = |source| DitError::Attribute {
            attribute: kind.attribute_name(true),
            source: Box::new(source),
        };

        let raw = match record
            .get_bytes(kind.history_column())
            .map_err(attribute_error)?
        {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(Vec::new()),
        };

        let history = self.decrypt_history(&raw, rid).map_err(attribute_error)?;

        if kind == HashKind::Lm && self.options.no_lm_hash {
            return Ok(vec![EMPTY_LM_HASH; history.len()]);
        }

        Ok(history)
    }

    fn decrypt_history(&self, raw: &[u8], rid: u32) -> DitResult<Vec<Hash>> {
        let blob = EncryptedBlob::parse(raw)?;
        let plaintext = self.decrypt_blob(&blob)?;

        if plaintext.len() % HASH_LENGTH != 0 {
            return Err(DitError::UnsupportedBlobLength(blob.ciphertext.len()));
        }

        Ok(plaintext
            .chunks_exact(HASH_LENGTH)
            .map(|chunk| {
                let mut obfuscated = [0; HASH_LENGTH];
                obfuscated.copy_from_slice(chunk);
                remove_des_obfuscation(&obfuscated, rid)
            })
            .collect())
    }

    /// Removes the PEK layer of a blob.
    fn decrypt_blob(&self, blob: &EncryptedBlob) -> DitResult<Vec<u8>> {
        let pek = self.pek.get(blob.pek_index())?;

        match blob.layout {
            BlobLayout::Legacy => {
                let rc4_key = md5_salted_key(pek, &blob.key_material, 1);
                Ok(rc4_decrypt(&rc4_key, &blob.ciphertext))
            }
            BlobLayout::Aes => {
                if blob.ciphertext.len() % HASH_LENGTH != 0 {
                    return Err(DitError::UnsupportedBlobLength(blob.ciphertext.len()));
                }

                let mut plaintext = aes_decrypt(pek, &blob.key_material, &blob.ciphertext)?;
                if let Some(length) = blob.plaintext_length {
                    // the padding block is only dropped if the stored length is sensible
                    if length > 0 && length <= plaintext.len() {
                        plaintext.truncate(length);
                    }
                }

                Ok(plaintext)
            }
        }
    }
}

/// Reads a column the extraction can do without, ignoring it if it can't be decoded.
fn optional<T>(column: &str, value: DitResult<Option<T>>) -> Option<T> {
    value.unwrap_or_else(|e| {
        debug!("ignoring column {column}: {e}");
        None
    })
}

#[cfg(test)]
mod tests {
    use aes::{
        cipher::{generic_array::GenericArray, BlockEncryptMut, KeyIvInit},
        Aes128,
    };

    use super::{ExtractOptions, HashExtractor, HashKind, EMPTY_LM_HASH, EMPTY_NT_HASH};
    use crate::{
        attributes,
        column::ColumnType,
        crypto::{apply_des_obfuscation, md5_salted_key, rc4_decrypt, Hash},
        error::DitError,
        pek::PekTable,
        record::Record,
        sid::Sid,
    };

    const PEK: [u8; 16] = [0x11; 16];
    const NT_HASH: &str = "32ed87bdb5fdc5e9cba88547376818d4";

    fn hash(hex: &str) -> Hash {
        hex::decode(hex).unwrap().try_into().unwrap()
    }

    fn extractor(options: ExtractOptions) -> HashExtractor {
        let mut key_bytes = PEK.to_vec();
        key_bytes.extend_from_slice(&[0x22; 16]);

        HashExtractor::new(PekTable::from_key_bytes(&key_bytes).unwrap(), options)
    }

    fn sid(rid: u32) -> Vec<u8> {
        Sid {
            revision: 1,
            identifier_authority: [0, 0, 0, 0, 0, 5],
            sub_authorities: vec![21, 1004336348, 1177238915, 682003330, rid],
        }
        .to_bytes()
    }

    fn legacy_blob(hashes: &[Hash], rid: u32) -> Vec<u8> {
        let key_material = [0x33; 16];
        let plaintext: Vec<u8> = hashes
            .iter()
            .flat_map(|hash| apply_des_obfuscation(hash, rid))
            .collect();

        let mut raw = vec![0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        raw.extend_from_slice(&key_material);
        raw.extend_from_slice(&rc4_decrypt(
            &md5_salted_key(&PEK, &key_material, 1),
            &plaintext,
        ));
        raw
    }

    fn aes_blob(hashes: &[Hash], rid: u32, pek_index: u8, pek: &[u8; 16]) -> Vec<u8> {
        let iv = [0x44; 16];
        let mut plaintext: Vec<u8> = hashes
            .iter()
            .flat_map(|hash| apply_des_obfuscation(hash, rid))
            .collect();
        let length = plaintext.len() as u32;
        plaintext.extend_from_slice(&[0x10; 16]);

        let mut aes =
            cbc::Encryptor::<Aes128>::new(GenericArray::from_slice(pek), GenericArray::from_slice(&iv));
        for block in plaintext.chunks_exact_mut(16) {
            aes.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        let mut raw = vec![0x13, 0x00, 0x00, 0x00, pek_index, 0x00, 0x00, 0x00];
        raw.extend_from_slice(&iv);
        raw.extend_from_slice(&length.to_le_bytes());
        raw.extend_from_slice(&plaintext);
        raw
    }

    fn account(rid: u32) -> Record {
        Record::new()
            .with_column(attributes::OBJECT_SID, ColumnType::Binary, sid(rid))
            .with_column(
                attributes::SAM_ACCOUNT_TYPE,
                ColumnType::Long,
                0x3000_0000i32.to_le_bytes(),
            )
            .with_column(
                attributes::SAM_ACCOUNT_NAME,
                ColumnType::LongText,
                "alice".encode_utf16().flat_map(u16::to_le_bytes).collect::<Vec<_>>(),
            )
    }

    #[test]
    fn test_legacy_nt_hash() {
        let record = account(1000).with_column(
            attributes::UNICODE_PWD,
            ColumnType::LongBinary,
            legacy_blob(&[hash(NT_HASH)], 1000),
        );

        let dumped = extractor(ExtractOptions::new())
            .extract(&record)
            .unwrap()
            .unwrap();

        assert_eq!(1000, dumped.rid);
        assert_eq!("alice", dumped.username);
        assert_eq!(hash(NT_HASH), dumped.nt_hash);
        assert_eq!(EMPTY_LM_HASH, dumped.lm_hash);
    }

    #[test]
    fn test_aes_nt_hash_uses_header_index() {
        let record = account(1105).with_column(
            attributes::UNICODE_PWD,
            ColumnType::LongBinary,
            aes_blob(&[hash(NT_HASH)], 1105, 1, &[0x22; 16]),
        );

        let dumped = extractor(ExtractOptions::new())
            .extract(&record)
            .unwrap()
            .unwrap();

        assert_eq!(hash(NT_HASH), dumped.nt_hash);
    }

    #[test]
    fn test_absent_hashes_are_empty_constants() {
        let record = account(1000).with_column(
            attributes::DBCS_PWD,
            ColumnType::LongBinary,
            Vec::new(),
        );

        let dumped = extractor(ExtractOptions::new())
            .extract(&record)
            .unwrap()
            .unwrap();

        assert_eq!(
            "aad3b435b51404eeaad3b435b51404ee",
            hex::encode(dumped.lm_hash)
        );
        assert_eq!(
            "31d6cfe0d16ae931b73c59d7e0c089c0",
            hex::encode(dumped.nt_hash)
        );
        assert_eq!(EMPTY_NT_HASH, dumped.nt_hash);
    }

    #[test]
    fn test_pek_index_out_of_range() {
        let record = account(1000).with_column(
            attributes::UNICODE_PWD,
            ColumnType::LongBinary,
            aes_blob(&[hash(NT_HASH)], 1000, 7, &PEK),
        );

        let error = extractor(ExtractOptions::new())
            .extract(&record)
            .unwrap_err();

        match error {
            DitError::Attribute { attribute, source } => {
                assert_eq!("unicodePwd", attribute);
                assert!(matches!(
                    *source,
                    DitError::PekIndexOutOfRange { index: 7, len: 2 }
                ));
            }
            e => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn test_unsupported_legacy_length() {
        let mut blob = legacy_blob(&[hash(NT_HASH)], 1000);
        blob.extend_from_slice(&[0; 4]);
        let record = account(1000).with_column(attributes::UNICODE_PWD, ColumnType::LongBinary, blob);

        let error = extractor(ExtractOptions::new())
            .extract(&record)
            .unwrap_err();

        assert!(matches!(
            error,
            DitError::Attribute { source, .. } if matches!(*source, DitError::UnsupportedBlobLength(20))
        ));
    }

    #[test]
    fn test_truncated_sid() {
        let mut raw_sid = sid(1000);
        raw_sid.truncate(raw_sid.len() - 1);
        let record = account(1000).with_column(attributes::OBJECT_SID, ColumnType::Binary, raw_sid);

        assert!(matches!(
            extractor(ExtractOptions::new()).extract(&record),
            Err(DitError::MalformedSid(_))
        ));
    }

    #[test]
    fn test_missing_sid() {
        let record = Record::new().with_column(
            attributes::SAM_ACCOUNT_TYPE,
            ColumnType::Long,
            0x3000_0001i32.to_le_bytes(),
        );

        assert!(matches!(
            extractor(ExtractOptions::new()).extract(&record),
            Err(DitError::MissingColumn("objectSid"))
        ));
    }

    #[test]
    fn test_non_account_rows_are_ignored() {
        let extractor = extractor(ExtractOptions::new());

        let group = account(512).with_column(
            attributes::SAM_ACCOUNT_TYPE,
            ColumnType::Long,
            0x1000_0000i32.to_le_bytes(),
        );
        assert!(extractor.extract(&group).unwrap().is_none());

        let container = Record::new().with_column(attributes::NAME, ColumnType::LongText, "Users");
        assert!(extractor.extract(&container).unwrap().is_none());

        let wrapped = account(1000).with_column(
            attributes::SAM_ACCOUNT_TYPE,
            ColumnType::LongLong,
            0x1_3000_0000i64.to_le_bytes(),
        );
        assert!(extractor.extract(&wrapped).unwrap().is_none());
    }

    #[test]
    fn test_non_printable_username_is_ignored() {
        let record = account(1000).with_column(
            attributes::SAM_ACCOUNT_NAME,
            ColumnType::LongText,
            "al\u{1}ce".encode_utf16().flat_map(u16::to_le_bytes).collect::<Vec<_>>(),
        );

        assert!(extractor(ExtractOptions::new())
            .extract(&record)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_enabled_only() {
        let record = account(1000).with_column(
            attributes::USER_ACCOUNT_CONTROL,
            ColumnType::Long,
            0x0202i32.to_le_bytes(),
        );

        let dumped = extractor(ExtractOptions::new())
            .extract(&record)
            .unwrap()
            .unwrap();
        assert!(!dumped.enabled());

        assert!(extractor(ExtractOptions::new().enabled_only(true))
            .extract(&record)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_history() {
        let old = hash("8846f7eaee8fb117ad06bdd830b7586c");
        let record = account(1000)
            .with_column(
                attributes::NT_PWD_HISTORY,
                ColumnType::LongBinary,
                aes_blob(&[hash(NT_HASH), old], 1000, 0, &PEK),
            )
            .with_column(
                attributes::LM_PWD_HISTORY,
                ColumnType::LongBinary,
                legacy_blob(&[[0x55; 16]], 1000),
            );

        let dumped = extractor(ExtractOptions::new().history(true))
            .extract(&record)
            .unwrap()
            .unwrap();
        assert_eq!(vec![hash(NT_HASH), old], dumped.nt_history);
        assert_eq!(vec![[0x55; 16]], dumped.lm_history);

        let dumped = extractor(ExtractOptions::new().history(true).no_lm_hash(true))
            .extract(&record)
            .unwrap()
            .unwrap();
        assert_eq!(vec![EMPTY_LM_HASH], dumped.lm_history);

        let dumped = extractor(ExtractOptions::new())
            .extract(&record)
            .unwrap()
            .unwrap();
        assert!(dumped.nt_history.is_empty());
    }

    #[test]
    fn test_lm_failure_keeps_nt_hash() {
        let record = account(1000)
            .with_column(
                attributes::UNICODE_PWD,
                ColumnType::LongBinary,
                legacy_blob(&[hash(NT_HASH)], 1000),
            )
            .with_column(
                attributes::DBCS_PWD,
                ColumnType::LongBinary,
                aes_blob(&[[0x66; 16]], 1000, 7, &PEK),
            );

        let dumped = extractor(ExtractOptions::new())
            .extract(&record)
            .unwrap()
            .unwrap();

        assert_eq!(hash(NT_HASH), dumped.nt_hash);
        assert_eq!(EMPTY_LM_HASH, dumped.lm_hash);
        assert_eq!(1, dumped.attribute_errors.len());
        match &dumped.attribute_errors[0] {
            DitError::Attribute { attribute, source } => {
                assert_eq!("dBCSPwd", *attribute);
                assert!(matches!(
                    **source,
                    DitError::PekIndexOutOfRange { index: 7, len: 2 }
                ));
            }
            e => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn test_history_failure_keeps_current_hashes() {
        let record = account(1000)
            .with_column(
                attributes::UNICODE_PWD,
                ColumnType::LongBinary,
                legacy_blob(&[hash(NT_HASH)], 1000),
            )
            .with_column(
                attributes::NT_PWD_HISTORY,
                ColumnType::LongBinary,
                aes_blob(&[hash(NT_HASH)], 1000, 9, &PEK),
            )
            .with_column(
                attributes::LM_PWD_HISTORY,
                ColumnType::LongBinary,
                legacy_blob(&[[0x55; 16]], 1000),
            );

        let dumped = extractor(ExtractOptions::new().history(true))
            .extract(&record)
            .unwrap()
            .unwrap();

        assert_eq!(hash(NT_HASH), dumped.nt_hash);
        assert!(dumped.nt_history.is_empty());
        assert_eq!(vec![[0x55; 16]], dumped.lm_history);
        assert!(matches!(
            dumped.attribute_errors.as_slice(),
            [DitError::Attribute {
                attribute: "ntPwdHistory",
                ..
            }]
        ));
    }

    #[test]
    fn test_undecodable_optional_columns_are_ignored() {
        let mut record = account(1000)
            .with_column(
                attributes::UNICODE_PWD,
                ColumnType::LongBinary,
                legacy_blob(&[hash(NT_HASH)], 1000),
            )
            .with_column(attributes::USER_ACCOUNT_CONTROL, ColumnType::LongBinary, [0x02]);
        record.insert(attributes::USER_PRINCIPAL_NAME, 42, [0x61, 0x00]);

        let dumped = extractor(ExtractOptions::new())
            .extract(&record)
            .unwrap()
            .unwrap();

        assert_eq!(hash(NT_HASH), dumped.nt_hash);
        assert_eq!(None, dumped.user_principal_name);
        assert_eq!(None, dumped.user_account_control);
        assert!(dumped.enabled());
        assert!(dumped.attribute_errors.is_empty());
        assert!(!dumped.attributes.contains_key(attributes::USER_PRINCIPAL_NAME));
    }

    #[test]
    fn test_kind_columns() {
        assert_eq!(attributes::UNICODE_PWD, HashKind::Nt.column());
        assert_eq!(attributes::LM_PWD_HISTORY, HashKind::Lm.history_column());
        assert_eq!(EMPTY_LM_HASH, HashKind::Lm.empty());
    }
}
