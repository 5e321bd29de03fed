//! Connection records and their registry.
//!
//! Each connection owns its stream, its receive and send buffers and its
//! handshake state. Records live in a slab arena and are addressed by an
//! opaque [`ConnId`], which also yields the mio token for the stream.

use crate::protocol::{Framer, Reply};
use crate::session::AuthState;
use bytes::{Buf, BytesMut};
use mio::Token;
use slab::Slab;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

const INITIAL_BUFFER_CAPACITY: usize = 4096;

/// Stable handle of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(usize);

impl ConnId {
    pub fn token(self) -> Token {
        Token(self.0)
    }

    pub fn from_token(token: Token) -> Self {
        ConnId(token.0)
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Bytes appended to the receive buffer.
    Data(usize),
    /// Nothing more to read until the next readiness edge.
    WouldBlock,
    /// The peer closed its side.
    Closed,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S> {
    pub stream: S,
    pub peer: SocketAddr,
    pub auth: AuthState,
    recv_buf: BytesMut,
    send_buf: BytesMut,
    /// Whether the stream is currently registered for write readiness.
    pub write_interest: bool,
}

impl<S> Connection<S> {
    /// Create a new, unauthenticated connection.
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            auth: AuthState::default(),
            recv_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            send_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            write_interest: false,
        }
    }

    /// Buffered input not yet cut into frames.
    pub fn recv_buf_mut(&mut self) -> &mut BytesMut {
        &mut self.recv_buf
    }

    /// Encode `reply` onto the end of the send buffer.
    pub fn queue_reply(&mut self, framer: &Framer, reply: &Reply) -> io::Result<()> {
        framer
            .encode(reply, &mut self.send_buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn has_pending_output(&self) -> bool {
        !self.send_buf.is_empty()
    }

    /// Bytes queued but not yet written.
    pub fn pending_output(&self) -> usize {
        self.send_buf.len()
    }
}

impl<S: Read> Connection<S> {
    /// Perform a single read of at most `scratch.len()` bytes.
    pub fn read_chunk(&mut self, scratch: &mut [u8]) -> io::Result<ReadStatus> {
        loop {
            match self.stream.read(scratch) {
                Ok(0) => return Ok(ReadStatus::Closed),
                Ok(n) => {
                    self.recv_buf.extend_from_slice(&scratch[..n]);
                    return Ok(ReadStatus::Data(n));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadStatus::WouldBlock)
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: Write> Connection<S> {
    /// Write queued output until the buffer is empty or the stream would
    /// block. Only bytes the stream accepted are removed.
    pub fn flush_pending(&mut self) -> io::Result<usize> {
        let mut written = 0;

        while !self.send_buf.is_empty() {
            match self.stream.write(&self.send_buf) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => {
                    self.send_buf.advance(n);
                    written += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(written)
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
pub struct ConnectionRegistry<S> {
    connections: Slab<Connection<S>>,
    max_connections: usize,
}

impl<S> ConnectionRegistry<S> {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns the connection back if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection<S>) -> Result<ConnId, Connection<S>> {
        if self.connections.len() >= self.max_connections {
            return Err(conn);
        }
        Ok(ConnId(self.connections.insert(conn)))
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection<S>> {
        self.connections.get(id.0)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection<S>> {
        self.connections.get_mut(id.0)
    }

    /// Remove a connection from the registry.
    pub fn remove(&mut self, id: ConnId) -> Option<Connection<S>> {
        self.connections.try_remove(id.0)
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.connections.contains(id.0)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Maximum number of connections allowed.
    pub fn capacity(&self) -> usize {
        self.max_connections
    }
}
