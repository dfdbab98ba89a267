use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};

use crate::error::{Error, Result};
use super::backoff::{ExponentialBackoff, Retry};
use super::{comm::Communicator, util};

const CONNECT_WAIT: Duration = Duration::from_millis(250);
const CONNECT_MAX_WAIT: Duration = Duration::from_millis(5000);
const CONNECT_ATTEMPTS: usize = 20;
const WRITE_TIMEOUT: Duration = Duration::from_millis(5000);

/// A communicator whose ranks are processes connected by TCP. Every rank
/// listens on its own entry in the peer list; outgoing connections are made
/// lazily, on the first message to each peer, and kept open. Messages are
/// framed by a u64 length prefix.
///
pub struct TcpCommunicator {
    rank: usize,
    peers: Vec<SocketAddr>,
    streams: RefCell<HashMap<usize, TcpStream>>,
    loopback: Sender<Vec<u8>>,
    inbox: Receiver<Vec<u8>>,
}

impl TcpCommunicator {
    /// Bind the listening socket for this rank, and start accepting peer
    /// connections in the background. The socket is bound before this
    /// returns, so peers can connect as soon as every rank is constructed.
    pub fn new(rank: usize, peers: Vec<SocketAddr>) -> Result<Self> {
        let addr = *peers.get(rank).ok_or_else(|| Error::communication(
            format!("rank {} is not in a peer list of {}", rank, peers.len()), false))?;
        let listener = TcpListener::bind(addr)?;
        let (sink, inbox) = crossbeam_channel::unbounded();

        info!("rank {} listening on {}", rank, addr);
        Self::start_listener(listener, sink.clone());

        Ok(Self {
            rank,
            peers,
            streams: RefCell::new(HashMap::new()),
            loopback: sink,
            inbox,
        })
    }

    fn start_listener(listener: TcpListener, sink: Sender<Vec<u8>>) {
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => Self::handle_connection(stream, sink.clone()),
                    Err(e) => warn!("failed to accept a connection: {}", e),
                }
            }
        });
    }

    fn handle_connection(mut stream: TcpStream, sink: Sender<Vec<u8>>) {
        let remote = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".into());
        debug!("receiving connection from {}", remote);

        thread::spawn(move || loop {
            let frame = util::read_usize(&mut stream).and_then(|size| util::read_bytes_vec(&mut stream, size));

            match frame {
                Ok(bytes) => {
                    if sink.send(bytes).is_err() {
                        break
                    }
                }
                Err(e) => {
                    debug!("connection from {} closed: {}", remote, e);
                    break
                }
            }
        });
    }

    fn connect_with_retry(addr: SocketAddr) -> Result<TcpStream> {
        let stream = ExponentialBackoff::new(CONNECT_WAIT, CONNECT_MAX_WAIT, 2)
            .take(CONNECT_ATTEMPTS)
            .retry(
                || TcpStream::connect(addr),
                |e, delay| {
                    warn!("connect to {} failed: {}; retrying in {:?}", addr, e, delay);
                    thread::sleep(delay)
                });

        match stream {
            Some(Ok(stream)) => {
                stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Some(Err(e)) => Err(Error::communication(format!("could not connect to {}: {}", addr, e), false)),
            None => Err(Error::communication(format!("no attempt made to connect to {}", addr), false)),
        }
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        if rank == self.rank {
            return self.loopback.send(message).map_err(|_| Error::communication("inbox closed", false))
        }
        let addr = *self.peers.get(rank).ok_or_else(|| Error::communication(format!("no rank {}", rank), false))?;
        let mut streams = self.streams.borrow_mut();

        if !streams.contains_key(&rank) {
            streams.insert(rank, Self::connect_with_retry(addr)?);
        }
        let result = match streams.get_mut(&rank) {
            Some(stream) => util::write_frame(stream, &message),
            None => return Err(Error::communication(format!("no stream to rank {}", rank), false)),
        };

        result.map_err(|e| {
            streams.remove(&rank);
            Error::communication(format!("write to rank {} at {} failed: {}", rank, addr, e), true)
        })
    }

    fn recv(&self) -> Result<Vec<u8>> {
        self.inbox.recv().map_err(|_| Error::communication("listener has shut down", false))
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::net::{SocketAddr, TcpListener};
    use super::TcpCommunicator;
    use crate::message::Communicator;

    fn free_address() -> SocketAddr {
        TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
    }

    #[test]
    fn two_ranks_exchange_messages() {
        let peers = vec![free_address(), free_address()];
        let a = TcpCommunicator::new(0, peers.clone()).unwrap();
        let b = TcpCommunicator::new(1, peers).unwrap();

        a.send(1, b"hello".to_vec()).unwrap();
        b.send(0, b"world".to_vec()).unwrap();
        b.send(1, b"self".to_vec()).unwrap();
        let mut received = vec![b.recv().unwrap(), b.recv().unwrap()];
        received.sort();
        assert_eq!(received, vec![b"hello".to_vec(), b"self".to_vec()]);
        assert_eq!(a.recv().unwrap(), b"world");
    }
}
