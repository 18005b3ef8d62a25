use std::{fmt, ops::ControlFlow, thread};

use tracing::{debug, info, warn};

use crate::{
    attributes,
    crypto::Hash,
    error::{DitError, DitResult},
    event::{DumpHandle, Event},
    extract::{ExtractOptions, HashExtractor},
    pek::PekTable,
    source::RecordSource,
};

/// The number of events buffered between the dumping thread and the consumer.
const CHANNEL_CAPACITY: usize = 256;

/// The record counts of a run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Every row read from the source.
    pub records_seen: u64,
    /// The rows that yielded credentials.
    pub hashes_dumped: u64,
    /// The rows that could not be processed.
    pub records_skipped: u64,
    /// The attributes of the dumped accounts that could not be decrypted.
    pub attribute_errors: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} record(s) read, {} hash(es) dumped, {} record(s) skipped, {} attribute(s) unreadable",
            self.records_seen, self.hashes_dumped, self.records_skipped, self.attribute_errors
        )
    }
}

/// Dumps the hashes of a directory.
#[derive(Clone, Debug)]
pub struct Dumper {
    boot_key: Hash,
    options: ExtractOptions,
}

impl Dumper {
    /// Creates a dumper for the directory of the domain controller with the given boot key.
    pub fn new(boot_key: &[u8]) -> DitResult<Self> {
        let boot_key = boot_key
            .try_into()
            .map_err(|_| DitError::InvalidBootKey(boot_key.len()))?;

        Ok(Self {
            boot_key,
            options: ExtractOptions::default(),
        })
    }

    /// Sets the extraction options.
    pub fn options(mut self, options: ExtractOptions) -> Self {
        self.options = options;

        self
    }

    /// Finds the PEK list in the source and decrypts it.
    /// The source is rewound afterwards.
    pub fn load_pek<S: RecordSource + ?Sized>(&self, source: &mut S) -> DitResult<PekTable> {
        let mut pek = None;

        while let Some(record) = source.next_record()? {
            let encrypted_pek_list = record
                .get_bytes(attributes::PEK_LIST)
                .map_err(|e| DitError::PekDerivationFailed(e.to_string()))?;

            if let Some(encrypted_pek_list) = encrypted_pek_list.filter(|raw| !raw.is_empty()) {
                pek = Some(PekTable::derive(&self.boot_key, &encrypted_pek_list)?);
                break;
            }
        }

        source.rewind()?;

        pek.ok_or(DitError::NoPekList)
    }

    /// Dumps the hashes of every record of the source, handing them to `sink`.
    ///
    /// Records that can't be processed are reported and skipped. The run stops early
    /// if `sink` breaks, and fails only if the PEK list can't be decrypted or the
    /// source can't be read.
    pub fn run<S, F>(&self, source: &mut S, mut sink: F) -> DitResult<RunSummary>
    where
        S: RecordSource + ?Sized,
        F: FnMut(Event) -> ControlFlow<()>,
    {
        let pek = self.load_pek(source)?;
        info!("PEK list decrypted, {} key(s) found", pek.len());

        let extractor = HashExtractor::new(pek, self.options.clone());
        let mut summary = RunSummary::default();

        while let Some(record) = source.next_record()? {
            let position = summary.records_seen;
            summary.records_seen += 1;

            let event = match extractor.extract(&record) {
                Ok(Some(dumped)) => {
                    debug!("dumped {} (RID {})", dumped.username, dumped.rid);
                    for error in &dumped.attribute_errors {
                        warn!("record {position} ({}): {error}", dumped.username);
                    }
                    summary.hashes_dumped += 1;
                    summary.attribute_errors += dumped.attribute_errors.len() as u64;
                    Event::Hash(Box::new(dumped))
                }
                Ok(None) => continue,
                Err(reason) => {
                    warn!("skipping record {position}: {reason}");
                    summary.records_skipped += 1;
                    Event::Skipped {
                        record: position,
                        reason,
                    }
                }
            };

            if sink(event).is_break() {
                info!("run stopped by the consumer");
                break;
            }
        }

        info!("{summary}");

        Ok(summary)
    }

    /// Dumps the hashes on another thread.
    /// The events are received through the returned handle.
    pub fn spawn<S>(self, mut source: S) -> DumpHandle
    where
        S: RecordSource + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(CHANNEL_CAPACITY);

        let thread_handle = thread::spawn(move || {
            self.run(&mut source, |event| match sender.send(event) {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            })
        });

        DumpHandle {
            thread_handle,
            receiver,
        }
    }
}
