use std::time::Duration;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use crate::error::{Error, Result};
use super::comm::Communicator;

/// A communicator for a group of threads in one process, joined by
/// unbounded channels. Useful for testing multi-rank runs without sockets.
///
pub struct LocalCommunicator {
    rank: usize,
    peers: Vec<Sender<Vec<u8>>>,
    inbox: Receiver<Vec<u8>>,
    timeout: Option<Duration>,
}

impl LocalCommunicator {
    /// Create the communicators of a group of `size` ranks. Each one is meant
    /// to be moved into its own thread.
    pub fn group(size: usize) -> Vec<Self> {
        let (peers, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self { rank, peers: peers.clone(), inbox, timeout: None })
            .collect()
    }

    /// Fail a receive which has waited longer than `timeout`, rather than
    /// blocking forever.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout: Some(timeout), ..self }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        let peer = self.peers.get(rank).ok_or_else(|| Error::communication(format!("no rank {}", rank), false))?;
        peer.send(message).map_err(|_| Error::communication(format!("rank {} has hung up", rank), false))
    }

    fn recv(&self) -> Result<Vec<u8>> {
        match self.timeout {
            None => self.inbox.recv().map_err(|_| Error::communication("all peers have hung up", false)),
            Some(timeout) => self.inbox.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => Error::communication(format!("no message within {:?}", timeout), false),
                RecvTimeoutError::Disconnected => Error::communication("all peers have hung up", false),
            }),
        }
    }
}
