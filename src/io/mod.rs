//! Socket abstraction and bounded line-oriented reading.

pub mod socket;

pub use socket::{LineRead, LineReader, SocketWrapper, TcpSocketWrapper};
