//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! The whole server runs on one thread. The listener is always
//! read-interested; a client is write-interested only while it has queued
//! output. mio readiness is edge-triggered, so writable sockets are
//! written until they would block. Reads are capped at
//! `READS_PER_EVENT` chunks per turn; a socket that still has data after
//! that goes on the read backlog and is revisited on the next turn without
//! waiting for a new edge.

use crate::config::Config;
use crate::protocol::{FrameError, Framer, Reply};
use crate::runtime::connection::{ConnId, Connection, ConnectionRegistry, ReadStatus};
use crate::session::{self, Outcome};
use crate::users::UserDirectory;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::io::{self, Read};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const WAKER_TOKEN: Token = Token(usize::MAX - 1);

const EVENT_CAPACITY: usize = 1024;
const LISTEN_BACKLOG: i32 = 1024;
const READS_PER_EVENT: usize = 16;

/// Reasons a connection is torn down.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("protocol violation before login")]
    ProtocolViolation,
    #[error("send backlog of {pending} bytes exceeds {limit}")]
    OutputOverflow { pending: usize, limit: usize },
    #[error("socket reported an error condition")]
    Exceptional,
    #[error("peer closed the connection")]
    PeerClosed,
}

/// Tunables the loop needs at runtime.
#[derive(Debug, Clone, Copy)]
struct Limits {
    read_chunk_size: usize,
    reads_per_event: usize,
    max_pending_output: usize,
    poll_timeout: Option<Duration>,
}

/// What one readable turn did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadOutcome {
    bytes: usize,
    closed: bool,
    /// The read budget ran out before the socket would block.
    more: bool,
}

/// Stops a running [`Server`] from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Ask the loop to exit. It returns after the current iteration.
    pub fn shutdown(&self) -> io::Result<()> {
        self.flag.store(true, Ordering::Release);
        self.waker.wake()
    }
}

/// Single-threaded authcalc server.
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: ConnectionRegistry<TcpStream>,
    users: UserDirectory,
    framer: Framer,
    limits: Limits,
    scratch: Vec<u8>,
    /// Connections left readable when their read budget ran out.
    backlog: Vec<ConnId>,
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl Server {
    /// Bind the listener and prepare the loop.
    pub fn bind(config: &Config, users: UserDirectory) -> io::Result<Self> {
        let addr = resolve(&config.host, config.port)?;

        let poll = Poll::new()?;
        let mut listener = TcpListener::from_std(create_listener(addr)?);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        Ok(Self {
            poll,
            listener,
            connections: ConnectionRegistry::new(config.max_connections),
            users,
            framer: Framer::new(config.max_frame_size),
            limits: Limits {
                read_chunk_size: config.read_chunk_size,
                reads_per_event: READS_PER_EVENT,
                max_pending_output: config.max_pending_output,
                poll_timeout: config.poll_timeout,
            },
            scratch: vec![0u8; config.read_chunk_size.max(1)],
            backlog: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            waker,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run until shut down. Only poll failures are fatal.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENT_CAPACITY);

        info!(
            addr = %self.local_addr()?,
            users = self.users.len(),
            max_connections = self.connections.capacity(),
            max_frame_size = self.framer.max_frame_size(),
            read_chunk_size = self.limits.read_chunk_size,
            "Server listening"
        );

        loop {
            // Backlogged sockets must not wait for the poll timeout.
            let timeout = if self.backlog.is_empty() {
                self.limits.poll_timeout
            } else {
                Some(Duration::ZERO)
            };

            match self.poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            if self.shutdown.load(Ordering::Acquire) {
                info!(connections = self.connections.len(), "Shutting down");
                return Ok(());
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_connections(),
                    WAKER_TOKEN => {}
                    token => {
                        let id = ConnId::from_token(token);
                        if let Err(e) = self.handle_connection_event(id, event) {
                            self.close_connection(id, &e);
                        }
                    }
                }
            }

            self.service_backlog();
        }
    }

    /// Give every backlogged connection another read turn.
    fn service_backlog(&mut self) {
        for id in std::mem::take(&mut self.backlog) {
            if let Err(e) = self.drive_connection(id, true, false) {
                self.close_connection(id, &e);
            }
        }
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = self.register_connection(stream, peer) {
                        warn!(peer = %peer, error = %e, "Failed to register connection");
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Accept error: {}", e);
                    break;
                }
            }
        }
    }

    fn register_connection(&mut self, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
        let mut conn = Connection::new(stream, peer);
        conn.queue_reply(&self.framer, &Reply::greeting())?;

        let id = match self.connections.insert(conn) {
            Ok(id) => id,
            Err(_) => {
                warn!(peer = %peer, "Connection limit reached");
                return Ok(());
            }
        };

        let Some(conn) = self.connections.get_mut(id) else {
            return Ok(());
        };
        let registered = self.poll.registry().register(
            &mut conn.stream,
            id.token(),
            Interest::READABLE | Interest::WRITABLE,
        );
        if let Err(e) = registered {
            self.connections.remove(id);
            return Err(e);
        }
        conn.write_interest = true;

        debug!(conn_id = %id, peer = %peer, "Accepted connection");
        Ok(())
    }

    fn handle_connection_event(
        &mut self,
        id: ConnId,
        event: &mio::event::Event,
    ) -> Result<(), ConnectionError> {
        if !self.connections.contains(id) {
            return Ok(());
        }

        if event.is_error() {
            return Err(ConnectionError::Exceptional);
        }

        self.drive_connection(id, event.is_readable(), event.is_writable())
    }

    fn drive_connection(
        &mut self,
        id: ConnId,
        readable: bool,
        writable: bool,
    ) -> Result<(), ConnectionError> {
        let mut peer_closed = false;
        if readable {
            peer_closed = self.handle_readable(id)?;
        }

        // Replies produced by this read are written right away; anything
        // the socket refuses waits for the next writable event.
        if writable || self.has_pending_output(id) {
            self.handle_writable(id)?;
        }

        if peer_closed {
            return Err(ConnectionError::PeerClosed);
        }

        self.update_interest(id)?;
        Ok(())
    }

    /// Read up to the budget and service every complete frame.
    ///
    /// Returns whether the peer closed its side.
    fn handle_readable(&mut self, id: ConnId) -> Result<bool, ConnectionError> {
        let Some(conn) = self.connections.get_mut(id) else {
            return Ok(false);
        };

        let outcome = read_frames(
            conn,
            &mut self.scratch,
            &self.framer,
            &self.users,
            &self.limits,
        )?;
        trace!(
            conn_id = %id,
            bytes = outcome.bytes,
            closed = outcome.closed,
            more = outcome.more,
            "Read"
        );

        if outcome.more && !self.backlog.contains(&id) {
            self.backlog.push(id);
        }
        Ok(outcome.closed)
    }

    fn handle_writable(&mut self, id: ConnId) -> Result<(), ConnectionError> {
        let Some(conn) = self.connections.get_mut(id) else {
            return Ok(());
        };

        let written = conn.flush_pending()?;
        if written > 0 {
            trace!(conn_id = %id, bytes = written, remaining = conn.pending_output(), "Wrote");
        }
        Ok(())
    }

    fn has_pending_output(&self, id: ConnId) -> bool {
        self.connections
            .get(id)
            .is_some_and(Connection::has_pending_output)
    }

    /// Keep write interest in step with the send buffer.
    fn update_interest(&mut self, id: ConnId) -> io::Result<()> {
        let Some(conn) = self.connections.get_mut(id) else {
            return Ok(());
        };

        let wants_write = conn.has_pending_output();
        if wants_write == conn.write_interest {
            return Ok(());
        }

        let interest = if wants_write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        self.poll
            .registry()
            .reregister(&mut conn.stream, id.token(), interest)?;
        conn.write_interest = wants_write;
        Ok(())
    }

    fn close_connection(&mut self, id: ConnId, reason: &ConnectionError) {
        self.backlog.retain(|&queued| queued != id);
        if let Some(mut conn) = self.connections.remove(id) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!(
                conn_id = %id,
                peer = %conn.peer,
                authenticated = conn.auth.is_authenticated(),
                user = conn.auth.username().unwrap_or("-"),
                reason = %reason,
                "Connection closed"
            );
        }
    }
}

/// Feed every complete buffered frame through the handshake/dispatcher
/// and queue the replies, in arrival order.
pub fn service_frames<S>(
    conn: &mut Connection<S>,
    framer: &Framer,
    users: &UserDirectory,
) -> Result<(), ConnectionError> {
    while let Some(frame) = framer.next_frame(conn.recv_buf_mut())? {
        match session::handle_frame(&mut conn.auth, &frame, users) {
            Outcome::Reply(reply) => conn.queue_reply(framer, &reply)?,
            Outcome::Disconnect => return Err(ConnectionError::ProtocolViolation),
        }
    }
    Ok(())
}

/// Read at most `limits.reads_per_event` chunks, servicing frames after
/// each one so the frame and send-backlog caps hold chunk by chunk.
fn read_frames<S: Read>(
    conn: &mut Connection<S>,
    scratch: &mut [u8],
    framer: &Framer,
    users: &UserDirectory,
    limits: &Limits,
) -> Result<ReadOutcome, ConnectionError> {
    let mut outcome = ReadOutcome {
        bytes: 0,
        closed: false,
        more: true,
    };

    for _ in 0..limits.reads_per_event.max(1) {
        match conn.read_chunk(scratch)? {
            ReadStatus::Data(n) => outcome.bytes += n,
            ReadStatus::WouldBlock => {
                outcome.more = false;
                break;
            }
            ReadStatus::Closed => {
                outcome.closed = true;
                outcome.more = false;
                break;
            }
        }

        service_frames(conn, framer, users)?;

        let pending = conn.pending_output();
        if pending > limits.max_pending_output {
            return Err(ConnectionError::OutputOverflow {
                pending,
                limit: limits.max_pending_output,
            });
        }
    }

    Ok(outcome)
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no address for {host}:{port}"),
        )
    })
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}
