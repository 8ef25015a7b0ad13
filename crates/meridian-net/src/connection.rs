//! A single socket to one node, plain or TLS, with idle-time tracking
//! for pool eviction (§4.2).

use meridian_core::{Error, Host};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The underlying transport: a bare TCP socket, or one wrapped in a
/// `rustls` client session.
enum Socket {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Socket {
    fn tcp_stream(&self) -> &TcpStream {
        match self {
            Socket::Plain(s) => s,
            Socket::Tls(s) => s.get_ref(),
        }
    }
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Socket::Plain(s) => s.read(buf),
            Socket::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Socket::Plain(s) => s.write(buf),
            Socket::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Socket::Plain(s) => s.flush(),
            Socket::Tls(s) => s.flush(),
        }
    }
}

/// One connection to a node: a socket plus bookkeeping the pool uses to
/// decide whether this connection should be recycled or dropped.
pub struct Connection {
    socket: Socket,
    last_used: Instant,
}

impl Connection {
    /// Dial a plain TCP connection to `host`.
    pub fn connect_plain(host: &Host, connect_timeout: Duration) -> Result<Self, Error> {
        let stream = dial(host, connect_timeout)?;
        Ok(Self {
            socket: Socket::Plain(stream),
            last_used: Instant::now(),
        })
    }

    /// Dial a TLS connection to `host`, verifying the peer certificate
    /// with `config` (built by the caller from a `ServerCertVerifier`,
    /// e.g. `tls::NameAndRevocationVerifier`).
    pub fn connect_tls(host: &Host, config: Arc<ClientConfig>, connect_timeout: Duration) -> Result<Self, Error> {
        let stream = dial(host, connect_timeout)?;
        let server_name_str = host.tls_name.clone().unwrap_or_else(|| host.address.clone());
        let server_name = ServerName::try_from(server_name_str)
            .map_err(|e| Error::Connection(format!("invalid tls server name: {e}")))?
            .to_owned();
        let conn = ClientConnection::new(config, server_name)
            .map_err(|e| Error::Connection(format!("tls handshake setup failed: {e}")))?;
        let tls_stream = StreamOwned::new(conn, stream);
        Ok(Self {
            socket: Socket::Tls(Box::new(tls_stream)),
            last_used: Instant::now(),
        })
    }

    /// Read exactly `buf.len()` bytes, treating EOF before completion as
    /// a connection error.
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.socket
            .read_exact(buf)
            .map_err(|e| Error::Connection(format!("read failed: {e}")))?;
        self.touch();
        Ok(())
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.socket
            .write_all(buf)
            .map_err(|e| Error::Connection(format!("write failed: {e}")))?;
        self.touch();
        Ok(())
    }

    /// Apply `socketTimeout` to both directions of the underlying TCP
    /// socket for the duration of the next I/O call.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<(), Error> {
        let tcp = self.socket.tcp_stream();
        tcp.set_read_timeout(timeout)
            .map_err(|e| Error::Connection(format!("set_read_timeout failed: {e}")))?;
        tcp.set_write_timeout(timeout)
            .map_err(|e| Error::Connection(format!("set_write_timeout failed: {e}")))?;
        Ok(())
    }

    fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// How long this connection has sat idle since its last I/O.
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// `true` if the underlying socket is closed or has a pending reset,
    /// detected via a non-blocking zero-length peek.
    pub fn is_broken(&self) -> bool {
        let tcp = self.socket.tcp_stream();
        let mut probe = [0u8; 1];
        match tcp.peek(&mut probe) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => e.kind() != std::io::ErrorKind::WouldBlock,
        }
    }
}

fn dial(host: &Host, connect_timeout: Duration) -> Result<TcpStream, Error> {
    let addr = host
        .socket_addr_string()
        .parse()
        .map_err(|e| Error::Connection(format!("invalid host address {}: {e}", host.socket_addr_string())))?;
    let stream = TcpStream::connect_timeout(&addr, connect_timeout)
        .map_err(|e| Error::Connection(format!("connect to {addr} failed: {e}")))?;
    stream
        .set_nodelay(true)
        .map_err(|e| Error::Connection(format!("set_nodelay failed: {e}")))?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn connect_plain_succeeds_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (_sock, _) = listener.accept().unwrap();
        });
        let host = Host::new("127.0.0.1", addr.port());
        let conn = Connection::connect_plain(&host, Duration::from_secs(2)).unwrap();
        assert!(conn.idle_for() < Duration::from_secs(1));
        handle.join().unwrap();
    }

    #[test]
    fn connect_plain_fails_fast_on_refused_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let host = Host::new("127.0.0.1", addr.port());
        assert!(Connection::connect_plain(&host, Duration::from_millis(500)).is_err());
    }

    #[test]
    fn read_write_roundtrip_over_plain_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            sock.read_exact(&mut buf).unwrap();
            sock.write_all(&buf).unwrap();
        });
        let host = Host::new("127.0.0.1", addr.port());
        let mut conn = Connection::connect_plain(&host, Duration::from_secs(2)).unwrap();
        conn.write_all(b"hello").unwrap();
        let mut buf = [0u8; 5];
        conn.read_fully(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        handle.join().unwrap();
    }
}
