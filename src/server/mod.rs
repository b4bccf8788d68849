//! # Server Module
//!
//! The accept loops and connection lifecycle management, built on the
//! `may` coroutine runtime.
//!
//! ## Architecture
//!
//! ```text
//! TCP accept → SetOfSws insert → connection coroutine
//!            → HttpDispatcher::handle_connection → SetOfSws remove
//! ```
//!
//! One plaintext listener always runs; a TLS listener joins it when
//! `SECURE_SERVER_PORT` is nonzero. Each accepted socket gets its read
//! timeout set, is counted against `MAX_CONNECTIONS` (over the bound the
//! client receives a canned 503 with `Retry-After`), and is handed to a
//! freshly spawned coroutine running the dispatcher.
//!
//! ## Socket accounting
//!
//! Every live socket is tracked in the `SetOfSws`; insertion and removal
//! are logged, which is how the test suite (and an operator reading
//! logs) proves sockets are not leaking.
//!
//! ## Shutdown
//!
//! [`ServerHandle::stop`] flips the shutdown flag, pokes the listeners
//! awake, waits up to `SHUTDOWN_GRACE_MILLIS` for in-flight connections
//! to drain, then cancels the accept coroutines.

pub mod tls;

use crate::brig::TheBrig;
use crate::config::ServerConfig;
use crate::dispatcher::HttpDispatcher;
use crate::io::socket::TcpSocketWrapper;
use may::coroutine::JoinHandle;
use may::net::{TcpListener, TcpStream};
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use self::tls::TlsAcceptor;
use tracing::{debug, error, info, warn};

const OVERLOADED_RESPONSE: &[u8] =
    b"HTTP/1.1 503 Service Unavailable\r\nServer: minum\r\nRetry-After: 1\r\nContent-Length: 0\r\n\r\n";

/// Stack size for accept-loop coroutines.
const ACCEPT_STACK_SIZE: usize = 0x10000;

/// Stack size for connection coroutines. Larger than the accept loop's
/// because a TLS handshake runs on this stack.
const CONNECTION_STACK_SIZE: usize = 0x20000;

/// The set of currently open sockets. Only the count is kept; insert
/// and removal are logged so the logs show every accepted socket being
/// released.
pub(crate) struct SetOfSws {
    count: AtomicUsize,
}

impl SetOfSws {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    fn add(&self, peer: &str) {
        let size = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("http server added ({}) into SetOfSws. size: {}", peer, size);
    }

    fn remove(&self, peer: &str) {
        let size = self.count.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("http server removed ({}) from SetOfSws. size: {}", peer, size);
    }

    fn size(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// The server: binds listeners and turns accepted sockets into
/// dispatcher coroutines.
pub struct Server {
    config: Arc<ServerConfig>,
    dispatcher: HttpDispatcher,
    brig: Arc<TheBrig>,
}

impl Server {
    #[must_use]
    pub fn new(config: Arc<ServerConfig>, dispatcher: HttpDispatcher, brig: Arc<TheBrig>) -> Self {
        Self {
            config,
            dispatcher,
            brig,
        }
    }

    /// Bind the listeners and start accepting. Returns a handle for
    /// readiness-waiting and shutdown.
    pub fn start(self) -> io::Result<ServerHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let active = Arc::new(SetOfSws::new());
        let mut handles = Vec::new();

        if self.brig.is_enabled() {
            handles.push(TheBrig::start_sweeper(
                self.brig.clone(),
                Duration::from_millis(self.config.brig_sweep_interval_millis),
            )?);
        }

        let listener =
            TcpListener::bind((self.config.host_name.as_str(), self.config.server_port))?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, "http server listening");
        handles.push(spawn_accept_loop(
            listener,
            self.dispatcher.clone(),
            self.config.clone(),
            shutdown.clone(),
            active.clone(),
            None,
        )?);

        let mut secure_addr = None;
        if self.config.secure_server_port != 0 {
            let acceptor = Arc::new(TlsAcceptor::from_config(&self.config)?);
            let tls_listener = TcpListener::bind((
                self.config.host_name.as_str(),
                self.config.secure_server_port,
            ))?;
            let tls_addr = tls_listener.local_addr()?;
            info!(addr = %tls_addr, "https server listening");
            secure_addr = Some(tls_addr);
            handles.push(spawn_accept_loop(
                tls_listener,
                self.dispatcher,
                self.config.clone(),
                shutdown.clone(),
                active.clone(),
                Some(acceptor),
            )?);
        }

        Ok(ServerHandle {
            addr,
            secure_addr,
            shutdown,
            active,
            grace: Duration::from_millis(self.config.shutdown_grace_millis),
            handles,
        })
    }
}

fn spawn_accept_loop(
    listener: TcpListener,
    dispatcher: HttpDispatcher,
    config: Arc<ServerConfig>,
    shutdown: Arc<AtomicBool>,
    active: Arc<SetOfSws>,
    acceptor: Option<Arc<TlsAcceptor>>,
) -> io::Result<JoinHandle<()>> {
    unsafe {
        may::coroutine::Builder::new()
            .name("accept-loop".to_string())
            .stack_size(ACCEPT_STACK_SIZE)
            .spawn(move || loop {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        if shutdown.load(Ordering::SeqCst) {
                            debug!("accept loop exiting on shutdown");
                            break;
                        }
                        accept_one(
                            stream,
                            peer,
                            &dispatcher,
                            &config,
                            &active,
                            acceptor.as_ref(),
                        );
                    }
                    Err(e) => {
                        if shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        error!(error = %e, "accept failed, backing off");
                        may::coroutine::sleep(Duration::from_millis(50));
                    }
                }
            })
    }
    .map_err(io::Error::other)
}

fn accept_one(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: &HttpDispatcher,
    config: &Arc<ServerConfig>,
    active: &Arc<SetOfSws>,
    acceptor: Option<&Arc<TlsAcceptor>>,
) {
    let timeout = Duration::from_millis(config.socket_timeout_millis);
    let _ = stream.set_read_timeout(Some(timeout));
    let _ = stream.set_write_timeout(Some(timeout));

    if active.size() >= config.max_connections {
        warn!(
            remote = %peer,
            active = active.size(),
            max = config.max_connections,
            "connection bound reached, refusing with 503"
        );
        refuse_overloaded(stream);
        return;
    }

    let peer_str = peer.to_string();
    active.add(&peer_str);

    let dispatcher = dispatcher.clone();
    let active_in_coroutine = active.clone();
    let acceptor = acceptor.cloned();
    let spawned = unsafe {
        may::coroutine::Builder::new()
            .stack_size(CONNECTION_STACK_SIZE)
            .spawn(move || {
                match acceptor {
                    None => {
                        let mut sock = TcpSocketWrapper::new(stream, peer);
                        dispatcher.handle_connection(&mut sock);
                    }
                    Some(acceptor) => match acceptor.accept(stream, peer) {
                        Ok(mut sock) => dispatcher.handle_connection(&mut sock),
                        Err(e) => {
                            debug!(remote = %peer_str, error = %e, "tls session setup failed");
                        }
                    },
                }
                active_in_coroutine.remove(&peer_str);
            })
    };
    if let Err(e) = spawned {
        error!(remote = %peer, error = %e, "failed to spawn connection coroutine");
        active.remove(&peer.to_string());
    }
}

fn refuse_overloaded(mut stream: TcpStream) {
    let _ = stream.write_all(OVERLOADED_RESPONSE);
    let _ = stream.flush();
    let _ = stream.shutdown(Shutdown::Both);
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    secure_addr: Option<SocketAddr>,
    shutdown: Arc<AtomicBool>,
    active: Arc<SetOfSws>,
    grace: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address of the plaintext listener.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Address of the TLS listener, when one is running.
    #[must_use]
    pub fn secure_addr(&self) -> Option<SocketAddr> {
        self.secure_addr
    }

    /// Number of currently open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.size()
    }

    /// Block until the listener answers TCP connects.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if std::net::TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting, drain in-flight connections up to the grace
    /// period, then cancel the accept coroutines.
    pub fn stop(mut self) {
        info!("server stopping");
        self.shutdown.store(true, Ordering::SeqCst);
        // poke the listeners so blocked accepts observe the flag
        let _ = std::net::TcpStream::connect(self.addr);
        if let Some(secure) = self.secure_addr {
            let _ = std::net::TcpStream::connect(secure);
        }
        let deadline = Instant::now() + self.grace;
        while self.active.size() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let remaining = self.active.size();
        if remaining > 0 {
            warn!(remaining, "grace period expired with connections still open");
        }
        for handle in self.handles.drain(..) {
            unsafe {
                handle.coroutine().cancel();
            }
            let _ = handle.join();
        }
        info!("server stopped");
    }

    /// Block until the accept loops exit on their own.
    pub fn join(self) -> thread::Result<()> {
        for handle in self.handles {
            handle.join()?;
        }
        Ok(())
    }
}
