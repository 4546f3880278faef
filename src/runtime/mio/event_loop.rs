//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//!
//! One iteration accepts pending clients, services every ready connection
//! and finally tears down the connections queued for close during the pass.
//! Teardown is deferred so that frames queued before a close signal are
//! written before the socket goes away.

use crate::config::{ServerSettings, Transport};
use crate::runtime::buffer::Flush;
use crate::runtime::connection::{Connection, ConnectionRegistry};
use crate::runtime::handler::MessageHandler;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

const EVENTS_CAPACITY: usize = 1024;

/// Server startup and polling errors
#[derive(Debug)]
pub enum ServerError {
    /// Port outside 0-65535
    PortRange(i64),
    /// Only stream sockets can be multiplexed
    UnsupportedTransport(Transport),
    /// Host did not resolve to an address
    Resolve(String, io::Error),
    AddressInUse(SocketAddr),
    Bind(SocketAddr, io::Error),
    /// `listen` was not called before polling
    NotListening,
    Io(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::PortRange(port) => {
                write!(f, "Port {} is outside the range 0-65535", port)
            }
            ServerError::UnsupportedTransport(transport) => {
                write!(f, "Transport {:?} is not supported by the multiplexer", transport)
            }
            ServerError::Resolve(host, e) => write!(f, "Failed to resolve '{}': {}", host, e),
            ServerError::AddressInUse(addr) => write!(f, "Address {} is already in use", addr),
            ServerError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
            ServerError::NotListening => write!(f, "Server is not listening"),
            ServerError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Resolve(_, e) | ServerError::Bind(_, e) | ServerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Io(e)
    }
}

/// Single-threaded connection multiplexer.
pub struct Server<H> {
    poll: Poll,
    events: Events,
    /// Bound socket waiting for `listen`
    bound: Option<socket2::Socket>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    backlog: i32,
    connections: ConnectionRegistry<TcpStream>,
    /// Connections to tear down at the end of the current iteration
    close_queue: Vec<usize>,
    /// Scratch space for one bounded read
    read_buf: Vec<u8>,
    handler: H,
}

impl<H: MessageHandler> Server<H> {
    /// Bind a listening socket for `settings`.
    pub fn bind(settings: &ServerSettings, handler: H) -> Result<Self, ServerError> {
        let port = u16::try_from(settings.port).map_err(|_| ServerError::PortRange(settings.port))?;

        if settings.transport != Transport::Stream {
            return Err(ServerError::UnsupportedTransport(settings.transport));
        }

        let addr = resolve(&settings.host, port)?;
        let socket = create_listener(addr)?;
        let local_addr = socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "not an inet socket"))?;

        info!(addr = %local_addr, "Bound listener");

        Ok(Server {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            bound: Some(socket),
            listener: None,
            local_addr,
            backlog: settings.backlog,
            connections: ConnectionRegistry::new(settings.max_connections),
            close_queue: Vec::new(),
            read_buf: vec![0u8; settings.buffer_size.max(1)],
            handler,
        })
    }

    /// Start listening and arm the listener for readiness.
    ///
    /// Runs the handler's `on_init` once. Calling it again is a no-op.
    pub fn listen(&mut self) -> Result<(), ServerError> {
        let socket = match self.bound.take() {
            Some(socket) => socket,
            None => return Ok(()),
        };

        socket.listen(self.backlog)?;
        socket.set_nonblocking(true)?;

        let mut listener = TcpListener::from_std(socket.into());
        self.poll
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        self.listener = Some(listener);

        self.handler.on_init();
        info!(addr = %self.local_addr, "Listening");
        Ok(())
    }

    /// Serve until the process exits.
    pub fn run(&mut self) -> Result<(), ServerError> {
        loop {
            self.poll_once(None)?;
        }
    }

    /// Run a single iteration, waiting at most `timeout` for readiness.
    ///
    /// Returns the number of readiness events processed.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<usize, ServerError> {
        if self.listener.is_none() {
            return Err(ServerError::NotListening);
        }

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                self.clean();
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        }

        // Copy out so connections can be mutated while walking the events
        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|event| {
                (
                    event.token(),
                    event.is_readable() || event.is_read_closed() || event.is_error(),
                    event.is_writable(),
                )
            })
            .collect();

        for &(token, readable, writable) in &ready {
            match token {
                LISTENER_TOKEN => self.accept_connections(),
                Token(conn_id) => {
                    if readable {
                        self.handle_readable(conn_id);
                    }
                    if writable {
                        self.flush(conn_id);
                    }
                }
            }
        }

        self.clean();
        Ok(ready.len())
    }

    /// Schedule a connection for teardown at the end of the current
    /// iteration. Idempotent; unknown ids are ignored.
    pub fn stop(&mut self, conn_id: usize) {
        if let Some(conn) = self.connections.get_mut(conn_id) {
            if conn.mark_closing() {
                self.close_queue.push(conn_id);
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of live connections, including those pending close.
    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn accept_connections(&mut self) {
        loop {
            let accepted = match self.listener.as_ref() {
                Some(listener) => listener.accept(),
                None => return,
            };

            match accepted {
                Ok((stream, peer)) => self.register_connection(stream, peer),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    break;
                }
            }
        }
    }

    fn register_connection(&mut self, stream: TcpStream, peer: SocketAddr) {
        let conn_id = match self.connections.insert(Connection::new(stream, peer)) {
            Ok(id) => id,
            Err(_) => {
                warn!(peer = %peer, "Connection limit reached");
                return;
            }
        };

        let Some(conn) = self.connections.get_mut(conn_id) else {
            return;
        };

        if let Err(e) = self.poll.registry().register(
            &mut conn.stream,
            Token(conn_id),
            Interest::READABLE | Interest::WRITABLE,
        ) {
            warn!(conn_id, peer = %peer, error = %e, "Failed to register connection");
            self.connections.remove(conn_id);
            return;
        }

        let greeting = self.handler.greeting(&conn.info(conn_id));
        conn.outbound.push(&greeting);
        debug!(
            conn_id,
            peer = %peer,
            connections = self.connections.len(),
            "Accepted connection"
        );
        self.flush(conn_id);
    }

    fn handle_readable(&mut self, conn_id: usize) {
        // Readiness is edge-triggered: keep reading until the socket is dry
        loop {
            let Some(conn) = self.connections.get_mut(conn_id) else {
                return;
            };
            if conn.is_closing() {
                break;
            }

            let n = match conn.stream.read(&mut self.read_buf) {
                Ok(0) => {
                    debug!(conn_id, peer = %conn.peer(), "Peer closed connection");
                    self.stop(conn_id);
                    break;
                }
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(conn_id, peer = %conn.peer(), error = %e, "Connection interrupted, closing");
                    self.stop(conn_id);
                    break;
                }
            };

            let info = conn.info(conn_id);
            trace!(conn_id, bytes = n, "Read");

            match self.handler.on_message(&info, &self.read_buf[..n]) {
                Ok(action) => {
                    if let Some(conn) = self.connections.get_mut(conn_id) {
                        for frame in &action.frames {
                            conn.outbound.push(frame);
                        }
                    }
                    if action.close {
                        debug!(conn_id, "Handler requested close");
                        self.stop(conn_id);
                    }
                }
                Err(e) => {
                    warn!(conn_id, peer = %info.peer, error = %e, "Handler failed, closing");
                    self.stop(conn_id);
                }
            }
        }

        self.flush(conn_id);
    }

    fn flush(&mut self, conn_id: usize) {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return;
        };
        if conn.outbound.is_empty() {
            return;
        }

        match conn.outbound.flush_to(&mut conn.stream) {
            Ok(Flush::Drained(n)) => trace!(conn_id, bytes = n, "Write drained"),
            Ok(Flush::Pending(n)) => {
                trace!(conn_id, bytes = n, remaining = conn.outbound.len(), "Partial write")
            }
            Err(e) => {
                if conn.is_closing() {
                    debug!(conn_id, error = %e, "Write failed on closing connection");
                } else {
                    warn!(conn_id, peer = %conn.peer(), error = %e, "Write failed, closing");
                }
                self.stop(conn_id);
            }
        }
    }

    /// Tear down every connection queued for close.
    fn clean(&mut self) {
        for conn_id in std::mem::take(&mut self.close_queue) {
            if let Some(mut conn) = self.connections.remove(conn_id) {
                let _ = self.poll.registry().deregister(&mut conn.stream);
                self.handler.on_close(&conn.info(conn_id));
                debug!(
                    conn_id,
                    peer = %conn.peer(),
                    unsent = conn.outbound.len(),
                    "Disconnecting"
                );
            }
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ServerError> {
    let target = format!("{}:{}", host, port);
    (host, port)
        .to_socket_addrs()
        .map_err(|e| ServerError::Resolve(target.clone(), e))?
        .next()
        .ok_or_else(|| {
            ServerError::Resolve(
                target,
                io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            )
        })
}

/// Create a TCP socket with SO_REUSEADDR so rapid restarts can rebind.
fn create_listener(addr: SocketAddr) -> Result<socket2::Socket, ServerError> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into()).map_err(|e| {
        if e.kind() == io::ErrorKind::AddrInUse {
            ServerError::AddressInUse(addr)
        } else {
            ServerError::Bind(addr, e)
        }
    })?;

    Ok(socket)
}
