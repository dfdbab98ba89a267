use std::cell::RefCell;
use std::collections::VecDeque;
use crate::error::{Error, Result};

/// Interface for a group of processes that can exchange messages. The
/// underlying transport can in principle be TCP, UDP, or a higher level
/// abstraction like MPI.
///
pub trait Communicator {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peer processes in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer (possibly this
    /// process). This method must return immediately, in other words it is
    /// not allowed to block until a matching receive is posted. Failures
    /// worth retrying are reported as transient communication errors.
    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()>;

    /// Must be implemented to receive a message from any of the peers. This
    /// method is allowed to block until a message is ready to be received.
    fn recv(&self) -> Result<Vec<u8>>;
}

/// The communicator of a run with a single process. Messages sent to
/// rank 0 are queued and handed back by `recv`.
///
#[derive(Default)]
pub struct SerialCommunicator {
    queue: RefCell<VecDeque<Vec<u8>>>,
}

impl SerialCommunicator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        if rank != 0 {
            return Err(Error::communication(format!("no rank {} in a serial run", rank), false))
        }
        self.queue.borrow_mut().push_back(message);
        Ok(())
    }

    fn recv(&self) -> Result<Vec<u8>> {
        self.queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| Error::communication("receive would block forever in a serial run", false))
    }
}
