use std::{panic, thread::JoinHandle};

use crossbeam_channel::Receiver;

use crate::{
    dump::RunSummary,
    error::{DitError, DitResult},
    extract::DumpedHash,
};

/// An event emitted while dumping the directory.
#[derive(Debug)]
pub enum Event {
    /// The credentials of an account were recovered.
    Hash(Box<DumpedHash>),
    /// A record could not be processed and was skipped.
    Skipped {
        /// The position of the record in the source.
        record: u64,
        reason: DitError,
    },
}

pub struct DumpHandle {
    pub(crate) thread_handle: JoinHandle<DitResult<RunSummary>>,
    pub(crate) receiver: Receiver<Event>,
}

impl DumpHandle {
    /// Returns the summary of the run.
    /// Blocks until the run is finished. Events that were not received yet are discarded
    /// and the run stops at the next record.
    pub fn join(self) -> DitResult<RunSummary> {
        let DumpHandle {
            thread_handle,
            receiver,
        } = self;
        drop(receiver);

        thread_handle
            .join()
            .unwrap_or_else(|payload| panic::resume_unwind(payload))
    }

    /// Blocks until an event is received.
    /// Returns `None` if the run is finished.
    pub fn recv(&self) -> Option<Event> {
        self.receiver.recv().ok()
    }
}

impl Iterator for DumpHandle {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.recv()
    }
}
