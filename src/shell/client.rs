//! Client transport for the shell.
//!
//! A blocking client applies the configured timeout to every read and write.
//! A non-blocking client ignores the timeout and waits on a mio `Poll`
//! instead, the same readiness facility the server uses.

use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

const CLIENT_TOKEN: Token = Token(0);

/// Connection parameters, usually derived from `ShellVars`.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkOptions {
    pub timeout: Option<Duration>,
    /// Bytes requested per read
    pub buffer_size: usize,
    pub blocking: bool,
    /// Accumulate reads until the peer closes
    pub continuous: bool,
    /// Append `\r\n` to every frame sent
    pub add_carriage_return: bool,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(5)),
            buffer_size: 1024,
            blocking: true,
            continuous: false,
            add_carriage_return: false,
        }
    }
}

/// Client-side connection errors
#[derive(Debug)]
pub enum ClientError {
    /// Host did not resolve
    Resolve(String),
    Refused(SocketAddr),
    /// Read, write or connect exceeded the timeout
    Timeout,
    /// Connection reset or aborted by the peer
    Aborted(io::Error),
    /// Peer closed the connection without sending anything
    Closed,
    Io(io::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Resolve(target) => {
                write!(f, "Could not resolve {}", target)
            }
            ClientError::Refused(addr) => write!(f, "Connection refused by {}", addr),
            ClientError::Timeout => write!(f, "Timed out waiting for a response"),
            ClientError::Aborted(e) => write!(f, "Connection aborted: {}", e),
            ClientError::Closed => write!(f, "Connection closed by remote host"),
            ClientError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Aborted(e) | ClientError::Io(e) => Some(e),
            _ => None,
        }
    }
}

fn classify(e: io::Error) -> ClientError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ClientError::Timeout,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ClientError::Aborted(e),
        _ => ClientError::Io(e),
    }
}

enum Link {
    Blocking(TcpStream),
    Readiness {
        stream: mio::net::TcpStream,
        poll: Poll,
        events: Events,
    },
}

impl Link {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Link::Blocking(stream) => stream.read(buf),
            Link::Readiness {
                stream,
                poll,
                events,
            } => loop {
                match stream.read(buf) {
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        wait(poll, events)?;
                    }
                    other => return other,
                }
            },
        }
    }

    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        match self {
            Link::Blocking(stream) => stream.write_all(buf),
            Link::Readiness {
                stream,
                poll,
                events,
            } => {
                while !buf.is_empty() {
                    match stream.write(buf) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::WriteZero,
                                "write returned 0",
                            ));
                        }
                        Ok(n) => buf = &buf[n..],
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                            wait(poll, events)?;
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
        }
    }

    fn shutdown(&self) {
        let _ = match self {
            Link::Blocking(stream) => stream.shutdown(Shutdown::Both),
            Link::Readiness { stream, .. } => stream.shutdown(Shutdown::Both),
        };
    }
}

/// Block until the socket reports any readiness.
fn wait(poll: &mut Poll, events: &mut Events) -> io::Result<()> {
    match poll.poll(events, None) {
        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
        other => other,
    }
}

/// A connection to a framewire server.
pub struct Client {
    link: Link,
    peer: SocketAddr,
    buffer_size: usize,
    continuous: bool,
    add_carriage_return: bool,
}

impl Client {
    /// Connect to `host:port`.
    pub fn connect(host: &str, port: u16, options: &NetworkOptions) -> Result<Self, ClientError> {
        let target = format!("{}:{}", host, port);
        let peer = (host, port)
            .to_socket_addrs()
            .map_err(|_| ClientError::Resolve(target.clone()))?
            .next()
            .ok_or_else(|| ClientError::Resolve(target.clone()))?;

        let connected = match options.timeout {
            Some(timeout) => TcpStream::connect_timeout(&peer, timeout),
            None => TcpStream::connect(peer),
        };
        let stream = connected.map_err(|e| match e.kind() {
            io::ErrorKind::ConnectionRefused => ClientError::Refused(peer),
            _ => classify(e),
        })?;
        stream.set_nodelay(true).map_err(ClientError::Io)?;

        let link = if options.blocking {
            stream.set_read_timeout(options.timeout).map_err(ClientError::Io)?;
            stream.set_write_timeout(options.timeout).map_err(ClientError::Io)?;
            Link::Blocking(stream)
        } else {
            stream.set_nonblocking(true).map_err(ClientError::Io)?;
            let mut stream = mio::net::TcpStream::from_std(stream);
            let poll = Poll::new().map_err(ClientError::Io)?;
            poll.registry()
                .register(
                    &mut stream,
                    CLIENT_TOKEN,
                    Interest::READABLE | Interest::WRITABLE,
                )
                .map_err(ClientError::Io)?;
            Link::Readiness {
                stream,
                poll,
                events: Events::with_capacity(8),
            }
        };

        debug!(peer = %peer, blocking = options.blocking, "Connected");

        Ok(Client {
            link,
            peer,
            buffer_size: options.buffer_size.max(1),
            continuous: options.continuous,
            add_carriage_return: options.add_carriage_return,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send one frame. With `add_carriage_return`, frames that already end
    /// in `\r\n` are sent unchanged.
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<(), ClientError> {
        let frame = if self.add_carriage_return && !frame.ends_with(b"\r\n") {
            let mut line = Vec::with_capacity(frame.len() + 2);
            line.extend_from_slice(frame);
            line.extend_from_slice(b"\r\n");
            line
        } else {
            frame.to_vec()
        };

        self.link.write_all(&frame).map_err(classify)?;
        trace!(peer = %self.peer, bytes = frame.len(), "Sent");
        Ok(())
    }

    /// Receive the next response.
    ///
    /// Performs one read, or in continuous mode keeps reading until the peer
    /// closes. A timeout after some data arrived returns what was read.
    pub fn receive_frame(&mut self) -> Result<Vec<u8>, ClientError> {
        let mut buf = vec![0u8; self.buffer_size];
        let mut received = Vec::new();

        loop {
            match self.link.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    received.extend_from_slice(&buf[..n]);
                    if !self.continuous {
                        break;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => match classify(e) {
                    ClientError::Timeout if !received.is_empty() => break,
                    err => return Err(err),
                },
            }
        }

        if received.is_empty() {
            return Err(ClientError::Closed);
        }
        trace!(peer = %self.peer, bytes = received.len(), "Received");
        Ok(received)
    }

    /// Close both directions. Errors are ignored.
    pub fn shutdown(&mut self) {
        self.link.shutdown();
        debug!(peer = %self.peer, "Disconnected");
    }
}
