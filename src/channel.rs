//! The point-to-point channel between garbler and evaluator.
//!
//! [`Channel`] moves raw bytes to a numbered peer, [`MsgChannel`] adds bincode (de-)serialization
//! and the fixed-size control tags of the gate stream, and [`SimpleChannel`] is an in-memory
//! implementation for running both roles in one process.

use std::{fmt, future::Future, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::mpsc::{Receiver, Sender, channel, error::SendError},
    time::timeout,
};
use tracing::trace;

use crate::protocol::{EVALUATOR, GARBLER};

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug, thiserror::Error)]
#[error("{reason} (during {phase})")]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

impl Error {
    fn new(phase: impl Into<String>, reason: ErrorKind) -> Self {
        Self {
            phase: phase.into(),
            reason,
        }
    }
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    #[error("could not receive message: {0}")]
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    #[error("could not send message: {0}")]
    SendError(String),
    /// The message could not be (de-)serialized.
    #[error("could not (de-)serialize message: {0}")]
    SerdeError(String),
    /// A vector or a control tag does not have the expected length.
    #[error("message has an unexpected length")]
    InvalidLength,
}

/// A byte channel to the other party of a run.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index.
    fn send_bytes_to(
        &mut self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a message from the party with the given index.
    fn recv_bytes_from(
        &mut self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// A wrapper around [`Channel`] that takes care of (de-)serializing messages.
#[derive(Debug)]
pub struct MsgChannel<C: Channel>(pub C);

impl<C: Channel> MsgChannel<C> {
    async fn send_raw(&mut self, party: usize, phase: &str, msg: Vec<u8>) -> Result<(), Error> {
        trace!(party, phase, bytes = msg.len(), "sending message");
        self.0
            .send_bytes_to(party, msg)
            .await
            .map_err(|e| Error::new(phase, ErrorKind::SendError(format!("{e:?}"))))
    }

    async fn recv_raw(&mut self, party: usize, phase: &str) -> Result<Vec<u8>, Error> {
        let msg = self
            .0
            .recv_bytes_from(party)
            .await
            .map_err(|e| Error::new(phase, ErrorKind::RecvError(format!("{e:?}"))))?;
        trace!(party, phase, bytes = msg.len(), "received message");
        Ok(msg)
    }

    /// Serializes and sends a message to the other party.
    pub(crate) async fn send_to(
        &mut self,
        party: usize,
        phase: &str,
        msg: &(impl Serialize + Sync),
    ) -> Result<(), Error> {
        let msg = bincode::serialize(msg).map_err(|e| {
            Error::new(format!("sending {phase}"), ErrorKind::SerdeError(e.to_string()))
        })?;
        self.send_raw(party, phase, msg).await
    }

    /// Receives and deserializes a message from the other party.
    pub(crate) async fn recv_from<T: DeserializeOwned>(
        &mut self,
        party: usize,
        phase: &str,
    ) -> Result<T, Error> {
        let msg = self.recv_raw(party, phase).await?;
        bincode::deserialize(&msg).map_err(|e| {
            Error::new(format!("receiving {phase}"), ErrorKind::SerdeError(e.to_string()))
        })
    }

    /// Receives a vector from the other party and checks that it has `len` elements.
    pub(crate) async fn recv_vec_from<T: DeserializeOwned>(
        &mut self,
        party: usize,
        phase: &str,
        len: usize,
    ) -> Result<Vec<T>, Error> {
        let v: Vec<T> = self.recv_from(party, phase).await?;
        if v.len() != len {
            return Err(Error::new(phase, ErrorKind::InvalidLength));
        }
        Ok(v)
    }

    /// Sends a 64-bit control tag as exactly 8 little-endian bytes.
    pub(crate) async fn send_tag(&mut self, party: usize, tag: u64) -> Result<(), Error> {
        self.send_raw(party, "control tag", tag.to_le_bytes().to_vec())
            .await
    }

    /// Receives a 64-bit control tag.
    pub(crate) async fn recv_tag(&mut self, party: usize) -> Result<u64, Error> {
        let msg = self.recv_raw(party, "control tag").await?;
        let bytes: [u8; 8] = msg
            .try_into()
            .map_err(|_| Error::new("control tag", ErrorKind::InvalidLength))?;
        Ok(u64::from_le_bytes(bytes))
    }
}

const BUFFER_CAPACITY: usize = 1024;
const CHUNK_SIZE: usize = 100 * 1024 * 1024;
const RECV_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// One end of an in-memory connection between the garbler and the evaluator, using tokio's
/// [`Sender`] and [`Receiver`].
///
/// Messages larger than 100 MiB are split into chunks, each prefixed by its index and the total
/// number of chunks.
#[derive(Debug)]
pub struct SimpleChannel {
    peer: usize,
    s: Sender<Vec<u8>>,
    r: Receiver<Vec<u8>>,
}

impl SimpleChannel {
    /// Creates a connected pair of channels for a garbler (party 0) and an evaluator (party 1).
    pub fn pair() -> (Self, Self) {
        let (to_evaluator, from_garbler) = channel(BUFFER_CAPACITY);
        let (to_garbler, from_evaluator) = channel(BUFFER_CAPACITY);
        let garbler = SimpleChannel {
            peer: EVALUATOR,
            s: to_evaluator,
            r: from_evaluator,
        };
        let evaluator = SimpleChannel {
            peer: GARBLER,
            s: to_garbler,
            r: from_garbler,
        };
        (garbler, evaluator)
    }
}

/// The error raised by `send` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncSendError {
    /// The party is not the other end of this channel.
    UnknownParty(usize),
    /// The receiving side has been dropped.
    Closed(SendError<Vec<u8>>),
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncRecvError {
    /// The party is not the other end of this channel.
    UnknownParty(usize),
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
    /// A chunk did not carry a valid chunk header.
    MalformedChunk,
}

fn chunk_header(chunk: &[u8]) -> Option<(u32, u32, &[u8])> {
    let (index, rest) = chunk.split_first_chunk::<4>()?;
    let (count, payload) = rest.split_first_chunk::<4>()?;
    Some((u32::from_le_bytes(*index), u32::from_le_bytes(*count), payload))
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(&mut self, p: usize, msg: Vec<u8>) -> Result<(), AsyncSendError> {
        if p != self.peer {
            return Err(AsyncSendError::UnknownParty(p));
        }
        let count = msg.len().div_ceil(CHUNK_SIZE).max(1);
        for index in 0..count {
            let payload = msg
                .get(index * CHUNK_SIZE..msg.len().min((index + 1) * CHUNK_SIZE))
                .unwrap_or_default();
            if count > 1 {
                trace!(party = p, chunk = index + 1, count, "sending chunk");
            }
            let mut chunk = Vec::with_capacity(8 + payload.len());
            chunk.extend((index as u32).to_le_bytes());
            chunk.extend((count as u32).to_le_bytes());
            chunk.extend(payload);
            self.s.send(chunk).await.map_err(AsyncSendError::Closed)?;
        }
        Ok(())
    }

    async fn recv_bytes_from(&mut self, p: usize) -> Result<Vec<u8>, AsyncRecvError> {
        if p != self.peer {
            return Err(AsyncRecvError::UnknownParty(p));
        }
        let mut msg: Vec<u8> = vec![];
        loop {
            let chunk = match timeout(RECV_TIMEOUT, self.r.recv()).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return Err(AsyncRecvError::Closed),
                Err(_) => return Err(AsyncRecvError::TimeoutElapsed),
            };
            let (index, count, payload) =
                chunk_header(&chunk).ok_or(AsyncRecvError::MalformedChunk)?;
            msg.extend_from_slice(payload);
            if index + 1 >= count {
                return Ok(msg);
            }
        }
    }
}
