//! TLS session setup for the secure listener.
//!
//! The handshake itself happens lazily: `rustls` drives it from inside
//! the first read or write on the wrapped stream, so the dispatcher
//! treats plaintext and TLS connections identically.

use crate::config::ServerConfig;
use crate::io::socket::SocketWrapper;
use rustls::{ServerConnection, StreamOwned};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::path::Path;
use std::sync::Arc;

/// Builds TLS sessions for accepted sockets from a PEM certificate
/// chain and private key.
#[derive(Debug)]
pub struct TlsAcceptor {
    config: Arc<rustls::ServerConfig>,
}

impl TlsAcceptor {
    /// Build from the `TLS_CERT_FILE` / `TLS_KEY_FILE` settings.
    pub fn from_config(config: &ServerConfig) -> io::Result<Self> {
        let cert_path = config.tls_cert_file.as_deref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "SECURE_SERVER_PORT is set but TLS_CERT_FILE is not",
            )
        })?;
        let key_path = config.tls_key_file.as_deref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "SECURE_SERVER_PORT is set but TLS_KEY_FILE is not",
            )
        })?;
        Self::from_pem_files(cert_path, key_path)
    }

    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> io::Result<Self> {
        let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
            .collect::<Result<Vec<_>, _>>()?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "no private key in key file")
            })?;
        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(io::Error::other)?;
        Ok(Self {
            config: Arc::new(tls_config),
        })
    }

    /// Wrap an accepted TCP stream in a TLS session.
    pub fn accept(
        &self,
        stream: may::net::TcpStream,
        peer: SocketAddr,
    ) -> io::Result<TlsSocketWrapper> {
        let conn = ServerConnection::new(self.config.clone()).map_err(io::Error::other)?;
        Ok(TlsSocketWrapper {
            stream: StreamOwned::new(conn, stream),
            remote_ip: peer.ip().to_string(),
            remote: peer.to_string(),
        })
    }
}

/// [`SocketWrapper`] over a TLS session.
pub struct TlsSocketWrapper {
    stream: StreamOwned<ServerConnection, may::net::TcpStream>,
    remote_ip: String,
    remote: String,
}

impl Read for TlsSocketWrapper {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TlsSocketWrapper {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl SocketWrapper for TlsSocketWrapper {
    fn remote_addr(&self) -> &str {
        &self.remote_ip
    }

    fn remote_addr_with_port(&self) -> &str {
        &self.remote
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.stream.conn.send_close_notify();
        let _ = self.stream.flush();
        self.stream.sock.shutdown(Shutdown::Both)
    }
}
