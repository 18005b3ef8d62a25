//! Recovery of the LM and NT hashes stored in an offline Active Directory database.
//!
//! The hashes of `ntds.dit` are protected by two layers: an RC4 or AES layer keyed by
//! one of the password encryption keys (PEK) of the domain controller, and a DES layer
//! keyed by the RID of the account. The PEKs are themselves encrypted with the boot key
//! found in the SYSTEM hive.
//!
//! ```no_run
//! use ditdump_core::{Dumper, Event, VecSource};
//!
//! # fn records() -> Vec<ditdump_core::Record> { Vec::new() }
//! let boot_key = [0u8; 16];
//! let handle = Dumper::new(&boot_key)?.spawn(VecSource::new(records()));
//!
//! while let Some(event) = handle.recv() {
//!     if let Event::Hash(hash) = event {
//!         println!("{}:{}", hash.username, hash.rid);
//!     }
//! }
//!
//! let summary = handle.join()?;
//! # Ok::<(), ditdump_core::DitError>(())
//! ```

pub mod attributes;
pub mod blob;
pub mod column;
pub mod crypto;
pub mod dump;
pub mod error;
pub mod event;
pub mod extract;
pub mod pek;
pub mod record;
pub mod sid;
pub mod source;

pub use column::{ColumnType, TypedValue};
pub use crypto::{Hash, HASH_LENGTH};
pub use dump::{Dumper, RunSummary};
pub use error::{DitError, DitResult};
pub use event::{DumpHandle, Event};
pub use extract::{DumpedHash, ExtractOptions, HashExtractor, HashKind, EMPTY_LM_HASH, EMPTY_NT_HASH};
pub use pek::PekTable;
pub use record::{RawColumn, Record};
pub use sid::Sid;
pub use source::{RecordSource, VecSource};
