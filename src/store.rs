//! Append-only batch stores used by the buffered evaluator.
//!
//! A [`BatchStore`] holds its batches either in memory or in a temporary file. If a directory is
//! configured, a temporary file is created in it and every pushed batch is serialized into the
//! file; popping reads one batch at a time back from the start. Batches are popped in exactly the
//! order in which they were pushed, and a store can no longer be appended to once popping started.

use std::{
    collections::VecDeque,
    fs::File,
    io::{BufReader, BufWriter, Seek, Write},
    path::Path,
    sync::Arc,
};

use bincode::Options;
use serde::{Serialize, de::DeserializeOwned};
use tempfile::tempfile_in;
use tracing::debug;

use crate::{
    codec::{GateBatch, MaskBatch},
    data_types::Label,
    protocol::{Error, ProtocolViolation},
};

/// Errors raised by reading or writing a batch store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The temporary file could not be created, written or read.
    #[error("temporary store file: {0}")]
    Io(#[from] std::io::Error),
    /// A batch could not be (de-)serialized.
    #[error("could not (de-)serialize batch: {0}")]
    Serde(#[from] bincode::Error),
    /// A batch was pushed after batches were already popped.
    #[error("the store is sealed after the first pop")]
    Sealed,
}

/// Wraps a `BufWriter<Arc<File>>` to track the number of bytes written.
///
/// Logs the number of bytes written as a `debug` tracing event when dropped.
struct TrackWrite {
    written: usize,
    writer: BufWriter<Arc<File>>,
}

impl TrackWrite {
    fn new(file: File) -> Self {
        Self {
            written: 0,
            writer: BufWriter::new(Arc::new(file)),
        }
    }

    fn clone_file(&self) -> Arc<File> {
        Arc::clone(self.writer.get_ref())
    }
}

impl Write for TrackWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.written += written;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for TrackWrite {
    fn drop(&mut self) {
        debug!(bytes = self.written, "batch store file written");
    }
}

enum Backing<T> {
    TmpFile {
        write: TrackWrite,
        read: Option<BufReader<Arc<File>>>,
    },
    Memory {
        data: VecDeque<T>,
    },
}

/// An ordered, append-only store of batches.
pub(crate) struct BatchStore<T> {
    backing: Backing<T>,
    pushed: u64,
    popped: u64,
}

impl<T: Serialize + DeserializeOwned> BatchStore<T> {
    /// Creates a store backed by a temporary file in `dir`, or by memory if `dir` is `None`.
    pub(crate) fn new(dir: Option<&Path>) -> Result<Self, StoreError> {
        let backing = match dir {
            Some(dir) => Backing::TmpFile {
                write: TrackWrite::new(tempfile_in(dir)?),
                read: None,
            },
            None => Backing::Memory {
                data: VecDeque::new(),
            },
        };
        Ok(Self {
            backing,
            pushed: 0,
            popped: 0,
        })
    }

    fn bincode() -> impl bincode::Options {
        bincode::options().allow_trailing_bytes()
    }

    /// Appends a batch.
    pub(crate) fn push(&mut self, batch: T) -> Result<(), StoreError> {
        match &mut self.backing {
            Backing::TmpFile { read: Some(_), .. } => return Err(StoreError::Sealed),
            Backing::TmpFile { write, read: None } => {
                Self::bincode().serialize_into(write, &batch)?;
            }
            Backing::Memory { .. } if self.popped > 0 => return Err(StoreError::Sealed),
            Backing::Memory { data } => data.push_back(batch),
        }
        self.pushed += 1;
        Ok(())
    }

    /// Removes the oldest batch, or returns `None` if all batches were popped.
    pub(crate) fn pop(&mut self) -> Result<Option<T>, StoreError> {
        if self.popped == self.pushed {
            return Ok(None);
        }
        let batch = match &mut self.backing {
            Backing::TmpFile { write, read } => {
                let reader = match read.take() {
                    Some(reader) => reader,
                    None => {
                        write.flush()?;
                        let mut file = write.clone_file();
                        file.rewind()?;
                        BufReader::new(file)
                    }
                };
                Self::bincode().deserialize_from(read.insert(reader))?
            }
            Backing::Memory { data } => match data.pop_front() {
                Some(batch) => batch,
                None => return Ok(None),
            },
        };
        self.popped += 1;
        Ok(Some(batch))
    }

    /// The number of batches not yet popped.
    pub(crate) fn remaining(&self) -> u64 {
        self.pushed - self.popped
    }
}

/// The gate store, mask store and OT-transferred input labels of a buffered run.
pub(crate) struct ReplayStores {
    gates: BatchStore<GateBatch>,
    masks: BatchStore<MaskBatch>,
    input_counts: Vec<u64>,
    input_labels: VecDeque<Vec<Label>>,
}

impl ReplayStores {
    pub(crate) fn new(dir: Option<&Path>) -> Result<Self, StoreError> {
        Ok(Self {
            gates: BatchStore::new(dir)?,
            masks: BatchStore::new(dir)?,
            input_counts: vec![],
            input_labels: VecDeque::new(),
        })
    }

    pub(crate) fn push(&mut self, gates: GateBatch, masks: MaskBatch) -> Result<(), StoreError> {
        if gates.evaluator_inputs > 0 {
            self.input_counts.push(gates.evaluator_inputs);
        }
        self.gates.push(gates)?;
        self.masks.push(masks)
    }

    /// Stores the evaluator input labels received for the next batch that carries inputs.
    pub(crate) fn push_input_labels(&mut self, labels: Vec<Label>) {
        self.input_labels.push_back(labels);
    }

    /// Pops the next batch pair and its input labels, checking that it is batch `seq`.
    pub(crate) fn pop(&mut self, seq: u64) -> Result<(GateBatch, MaskBatch, Vec<Label>), Error> {
        let (Some(gates), Some(masks)) = (self.gates.pop()?, self.masks.pop()?) else {
            return Err(ProtocolViolation::BatchExhausted.into());
        };
        for actual in [gates.seq, masks.seq] {
            if actual != seq {
                return Err(ProtocolViolation::OutOfOrderBatch {
                    expected: seq,
                    actual,
                }
                .into());
            }
        }
        let labels = if gates.evaluator_inputs > 0 {
            self.input_labels
                .pop_front()
                .ok_or(ProtocolViolation::MissingInputLabels {
                    expected: gates.evaluator_inputs,
                    actual: 0,
                })?
        } else {
            vec![]
        };
        Ok((gates, masks, labels))
    }

    /// The number of batch pairs not yet replayed.
    pub(crate) fn remaining(&self) -> u64 {
        self.gates.remaining()
    }

    /// The evaluator input counts of all stored batches that carry inputs, in order.
    pub(crate) fn take_input_counts(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.input_counts)
    }
}
