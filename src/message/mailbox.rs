use std::thread;
use std::time::Duration;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use crate::decomposition::Side;
use crate::error::{Error, Result};
use super::backoff::{ExponentialBackoff, Retry};
use super::comm::Communicator;
use super::util;

const SEND_ATTEMPTS: usize = 8;
const SEND_WAIT: Duration = Duration::from_millis(10);
const SEND_MAX_WAIT: Duration = Duration::from_millis(1000);




/**
 * Everything that travels between ranks. Halo and collective messages carry
 * the sequence number of the exchange they belong to, so that a message
 * arriving early (from a peer that is ahead) can be held until it is wanted.
 */
#[derive(Debug, Serialize, Deserialize)]
enum Envelope {
    Halo { seq: u64, from: usize, side: Side, data: Vec<f32> },
    Collective { seq: u64, from: usize, data: Vec<u8> },
    Abort { from: usize, reason: String },
}




/**
 * Tagged point-to-point messages and collectives over a communicator. Every
 * rank must open exchanges (`next_seq`, and the collectives) in the same
 * order, so that sequence numbers agree across ranks.
 */
pub struct Mailbox<'a, C: Communicator> {
    comm: &'a C,
    seq: u64,
    stash: Vec<Envelope>,
}




// ============================================================================
impl<'a, C: Communicator> Mailbox<'a, C> {

    pub fn new(comm: &'a C) -> Self {
        Self { comm, seq: 0, stash: Vec::new() }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /**
     * Open a new exchange, returning its sequence number.
     */
    pub fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn post(&self, rank: usize, envelope: &Envelope) -> Result<()> {
        let bytes = rmp_serde::to_vec(envelope)?;
        let outcome = ExponentialBackoff::new(SEND_WAIT, SEND_MAX_WAIT, 2)
            .take(SEND_ATTEMPTS)
            .retry(
                || match self.comm.send(rank, bytes.clone()) {
                    Err(e) if e.is_transient() => Err(e),
                    other => Ok(other),
                },
                |e, delay| {
                    warn!("send to rank {} failed ({}); retrying in {:?}", rank, e, delay);
                    thread::sleep(delay)
                });

        match outcome {
            Some(Ok(result)) => result,
            Some(Err(e)) => Err(Error::communication(
                format!("giving up on rank {} after {} attempts: {}", rank, SEND_ATTEMPTS, e), false)),
            None => Err(Error::communication(format!("no attempt made to send to rank {}", rank), false)),
        }
    }

    /**
     * Wait for the first message satisfying `wanted`, holding on to any others
     * that arrive first. An abort from any peer, whether already held or newly
     * received, ends the wait with `Error::Aborted`.
     */
    fn wait_for<F>(&mut self, wanted: F) -> Result<Envelope>
    where
        F: Fn(&Envelope) -> bool
    {
        if let Some(Envelope::Abort { from, reason }) = self.stash.iter().find(|e| matches!(e, Envelope::Abort { .. })) {
            return Err(Error::Aborted { rank: *from, reason: reason.clone() })
        }
        if let Some(n) = self.stash.iter().position(|e| wanted(e)) {
            return Ok(self.stash.swap_remove(n))
        }
        loop {
            let envelope: Envelope = rmp_serde::from_slice(&self.comm.recv()?)?;

            match envelope {
                Envelope::Abort { from, reason } => {
                    error!("rank {} aborted the run: {}", from, reason);
                    return Err(Error::Aborted { rank: from, reason })
                }
                e if wanted(&e) => return Ok(e),
                e => {
                    debug!("holding early message {:?}", Self::describe(&e));
                    self.stash.push(e)
                }
            }
        }
    }

    fn describe(envelope: &Envelope) -> (u64, usize) {
        match envelope {
            Envelope::Halo { seq, from, .. } | Envelope::Collective { seq, from, .. } => (*seq, *from),
            Envelope::Abort { from, .. } => (0, *from),
        }
    }

    /**
     * Send halo data to a neighbour. `side` is the side of the receiving
     * slab the data is for.
     */
    pub fn send_halo(&self, rank: usize, seq: u64, side: Side, data: Vec<f32>) -> Result<()> {
        self.post(rank, &Envelope::Halo { seq, from: self.rank(), side, data })
    }

    /**
     * Block until the halo data for the given exchange and side arrives from
     * the given rank.
     */
    pub fn recv_halo(&mut self, seq: u64, from: usize, side: Side) -> Result<Vec<f32>> {
        let wanted = |e: &Envelope| matches!(e, Envelope::Halo { seq: s, from: f, side: d, .. } if *s == seq && *f == from && *d == side);

        match self.wait_for(wanted)? {
            Envelope::Halo { data, .. } => Ok(data),
            _ => Err(Error::communication("mismatched halo message", false)),
        }
    }

    fn recv_collective(&mut self, seq: u64, from: usize) -> Result<Vec<u8>> {
        let wanted = |e: &Envelope| matches!(e, Envelope::Collective { seq: s, from: f, .. } if *s == seq && *f == from);

        match self.wait_for(wanted)? {
            Envelope::Collective { data, .. } => Ok(data),
            _ => Err(Error::communication("mismatched collective message", false)),
        }
    }

    fn send_collective(&self, rank: usize, seq: u64, data: Vec<u8>) -> Result<()> {
        self.post(rank, &Envelope::Collective { seq, from: self.rank(), data })
    }

    /**
     * Binomial tree broadcast from rank 0. The value must be `Some` on rank 0
     * and is ignored elsewhere.
     */
    pub fn broadcast(&mut self, value: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let seq = self.next_seq();
        let r = self.rank();
        let p = self.size();

        let value = if r == 0 {
            value.ok_or_else(|| Error::communication("broadcast root has no value", false))?
        } else {
            self.recv_collective(seq, r - (1 << r.trailing_zeros()))?
        };
        for level in (0..util::ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 && r + one < p {
                self.send_collective(r + one, seq, value.clone())?
            }
        }
        Ok(value)
    }

    /**
     * Binomial tree reduce onto rank 0, which alone returns `Some`. The
     * operator is applied as `f(mine, theirs)` with `theirs` from the higher
     * rank, so it need not be commutative.
     */
    pub fn reduce<F>(&mut self, f: F, mut value: Vec<u8>) -> Result<Option<Vec<u8>>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Result<Vec<u8>>,
    {
        let seq = self.next_seq();
        let r = self.rank();
        let p = self.size();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 {
                if r + one < p {
                    value = f(value, self.recv_collective(seq, r + one)?)?
                }
            } else {
                self.send_collective(r - one, seq, value)?;
                return Ok(None)
            }
        }
        Ok(Some(value))
    }

    /**
     * Reduce onto rank 0, then broadcast the result to every rank.
     */
    pub fn all_reduce<F>(&mut self, f: F, value: Vec<u8>) -> Result<Vec<u8>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Result<Vec<u8>>,
    {
        let reduced = self.reduce(f, value)?;
        self.broadcast(reduced)
    }

    /**
     * Tell every peer that this rank is giving up. Best effort: failures are
     * logged and otherwise ignored.
     */
    pub fn abort(&self, reason: &str) {
        let envelope = Envelope::Abort { from: self.rank(), reason: reason.to_string() };

        let bytes = match rmp_serde::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("could not encode abort message: {}", e);
                return
            }
        };
        for rank in (0..self.size()).filter(|&r| r != self.rank()) {
            if let Err(e) = self.comm.send(rank, bytes.clone()) {
                warn!("could not notify rank {} of abort: {}", rank, e);
            }
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::cell::Cell;
    use std::thread;
    use super::{Mailbox, SEND_ATTEMPTS};
    use crate::decomposition::Side;
    use crate::error::{Error, Result};
    use crate::message::{Communicator, LocalCommunicator, SerialCommunicator};

    /**
     * A loopback communicator whose first `failures` sends fail, with a
     * transient or fatal error.
     */
    struct Flaky {
        inner: SerialCommunicator,
        failures: Cell<usize>,
        transient: bool,
        attempts: Cell<usize>,
    }

    impl Flaky {
        fn new(failures: usize, transient: bool) -> Self {
            Self { inner: SerialCommunicator::new(), failures: Cell::new(failures), transient, attempts: Cell::new(0) }
        }
    }

    impl Communicator for Flaky {
        fn rank(&self) -> usize {
            0
        }

        fn size(&self) -> usize {
            1
        }

        fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
            self.attempts.set(self.attempts.get() + 1);

            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(Error::communication("connection reset", self.transient))
            }
            self.inner.send(rank, message)
        }

        fn recv(&self) -> Result<Vec<u8>> {
            self.inner.recv()
        }
    }

    fn concat(a: Vec<u8>, b: Vec<u8>) -> crate::error::Result<Vec<u8>> {
        Ok(a.into_iter().chain(b).collect())
    }

    #[test]
    fn collectives_on_one_rank_are_local() {
        let comm = SerialCommunicator::new();
        let mut mailbox = Mailbox::new(&comm);
        assert_eq!(mailbox.all_reduce(concat, vec![7]).unwrap(), vec![7]);
    }

    #[test]
    fn all_reduce_is_ordered_by_rank() {
        for size in 1..7 {
            let handles: Vec<_> = LocalCommunicator::group(size).into_iter().map(|comm| {
                thread::spawn(move || {
                    let mut mailbox = Mailbox::new(&comm);
                    mailbox.all_reduce(concat, vec![comm.rank() as u8]).unwrap()
                })
            }).collect();

            for handle in handles {
                assert_eq!(handle.join().unwrap(), (0..size as u8).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn early_halo_messages_are_held() {
        let handles: Vec<_> = LocalCommunicator::group(2).into_iter().map(|comm| {
            thread::spawn(move || {
                let mut mailbox = Mailbox::new(&comm);
                let other = 1 - comm.rank();
                let (s1, s2) = (mailbox.next_seq(), mailbox.next_seq());

                mailbox.send_halo(other, s2, Side::XLow, vec![2.0]).unwrap();
                mailbox.send_halo(other, s1, Side::XHigh, vec![1.0]).unwrap();
                let first = mailbox.recv_halo(s1, other, Side::XHigh).unwrap();
                let second = mailbox.recv_halo(s2, other, Side::XLow).unwrap();
                (first, second)
            })
        }).collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), (vec![1.0], vec![2.0]));
        }
    }

    #[test]
    fn abort_releases_a_waiting_peer() {
        let mut comms = LocalCommunicator::group(2);
        let b = comms.pop().unwrap();
        let a = comms.pop().unwrap();

        let waiter = thread::spawn(move || {
            let mut mailbox = Mailbox::new(&b);
            let seq = mailbox.next_seq();
            mailbox.recv_halo(seq, 0, Side::XLow)
        });
        Mailbox::new(&a).abort("diverged");

        match waiter.join().unwrap() {
            Err(Error::Aborted { rank, reason }) => assert_eq!((rank, reason.as_str()), (0, "diverged")),
            other => panic!("expected an abort, got {:?}", other),
        }
    }

    #[test]
    fn transient_send_failures_are_retried() {
        let comm = Flaky::new(3, true);
        let mut mailbox = Mailbox::new(&comm);
        let seq = mailbox.next_seq();

        mailbox.send_halo(0, seq, Side::XLow, vec![4.0]).unwrap();
        assert_eq!(mailbox.recv_halo(seq, 0, Side::XLow).unwrap(), vec![4.0]);
        assert_eq!(comm.attempts.get(), 4);
    }

    #[test]
    fn persistent_transient_failures_become_fatal() {
        let comm = Flaky::new(usize::MAX, true);
        let mailbox = Mailbox::new(&comm);

        match mailbox.send_halo(0, 1, Side::XLow, vec![4.0]) {
            Err(e @ Error::Communication { .. }) => assert!(!e.is_transient(), "{:?}", e),
            other => panic!("expected a communication error, got {:?}", other),
        }
        assert_eq!(comm.attempts.get(), SEND_ATTEMPTS);
    }

    #[test]
    fn fatal_send_failures_are_not_retried() {
        let comm = Flaky::new(1, false);
        let mailbox = Mailbox::new(&comm);

        assert!(mailbox.send_halo(0, 1, Side::XLow, vec![4.0]).is_err());
        assert_eq!(comm.attempts.get(), 1);
    }
}
