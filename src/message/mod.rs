//! A minimal message-passing layer. Transports implement the `Communicator`
//! trait, which only has to move opaque byte buffers between ranks: a
//! single-process loopback, threads joined by channels, and plain TCP are
//! included. The `Mailbox` sits on top of a communicator and provides what
//! the driver needs: tagged halo messages, binomial tree collectives, and a
//! best-effort abort that releases peers blocked in a receive.

mod backoff;
pub mod comm;
pub mod local;
pub mod mailbox;
pub mod tcp;
pub mod util;

pub use comm::{Communicator, SerialCommunicator};
pub use local::LocalCommunicator;
pub use mailbox::Mailbox;
pub use tcp::TcpCommunicator;
