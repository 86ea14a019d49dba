//! Single-client TCP session
//!
//! A session owns one listening socket and at most one connected peer. The
//! first peer to connect is handed to the writer; every later connection is
//! accepted and closed straight away while the session is open.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{BroadcasterError, Result};
use crate::shutdown::{Shutdown, ShutdownListener};

/// Line-oriented transport used by the broadcast loop.
///
/// Only one task ever calls [`writeln`](Session::writeln); [`stop_server`](Session::stop_server)
/// may be called from any other task while a write is pending.
pub trait Session: Send + Sync {
    /// Bind and start listening. Does not wait for a peer.
    fn start(&self) -> impl Future<Output = Result<()>> + Send;

    /// Send `text` plus a line terminator.
    ///
    /// The first call waits until a peer connects. Fails with
    /// [`BroadcasterError::BrokenConnection`] when the peer is gone and with
    /// [`BroadcasterError::SessionClosed`] when the session was stopped.
    /// A write already in progress when the session stops gets a short grace
    /// period to complete, so a peer never sees half a block unless it has
    /// stopped reading.
    fn writeln(&self, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Whether the listening endpoint is open
    fn is_alive(&self) -> bool;

    /// Close the peer and the listening endpoint. Idempotent.
    fn stop_server(&self) -> impl Future<Output = ()> + Send;
}

/// TCP implementation of [`Session`]
pub struct TcpSession {
    port: u16,
    listening: Arc<AtomicBool>,
    peer_attached: AtomicBool,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
    incoming: Mutex<Option<mpsc::Receiver<TcpStream>>>,
    peer: Mutex<Option<TcpStream>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: Shutdown,
}

impl TcpSession {
    /// Create a session for `port`; port 0 picks an ephemeral port on start
    pub fn new(port: u16) -> Self {
        Self {
            port,
            listening: Arc::new(AtomicBool::new(false)),
            peer_attached: AtomicBool::new(false),
            local_addr: std::sync::Mutex::new(None),
            incoming: Mutex::new(None),
            peer: Mutex::new(None),
            accept_task: Mutex::new(None),
            shutdown: Shutdown::new(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address bound by the last successful start
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a peer has been attached to the writer
    pub fn has_peer(&self) -> bool {
        self.peer_attached.load(Ordering::SeqCst)
    }

    async fn attach_peer(&self, listener: &mut ShutdownListener) -> Result<TcpStream> {
        let mut incoming = self.incoming.lock().await;
        let rx = incoming.as_mut().ok_or(BroadcasterError::SessionClosed)?;

        tokio::select! {
            stream = rx.recv() => stream.ok_or(BroadcasterError::SessionClosed),
            _ = listener.wait() => Err(BroadcasterError::SessionClosed),
        }
    }
}

impl Session for TcpSession {
    async fn start(&self) -> Result<()> {
        if self.listening.load(Ordering::SeqCst) {
            return Err(BroadcasterError::AlreadyRunning);
        }

        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        let addr = listener.local_addr()?;
        *self
            .local_addr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(addr);

        let (tx, rx) = mpsc::channel(1);
        *self.incoming.lock().await = Some(rx);
        *self.peer.lock().await = None;
        self.peer_attached.store(false, Ordering::SeqCst);

        self.shutdown.reset();
        self.listening.store(true, Ordering::SeqCst);

        tracing::info!("WITS session listening on {}", addr);

        let listening = Arc::clone(&self.listening);
        let mut closed = self.shutdown.subscribe();

        let task = tokio::spawn(async move {
            let mut peer_taken = false;
            loop {
                let accepted = tokio::select! {
                    accepted = listener.accept() => accepted,
                    _ = closed.wait() => break,
                };

                match accepted {
                    Ok((stream, peer_addr)) if !peer_taken => {
                        if tx.try_send(stream).is_err() {
                            tracing::warn!("Session closed before client {} could attach", peer_addr);
                            break;
                        }
                        peer_taken = true;
                        tracing::info!("Client connected from {}", peer_addr);
                    }
                    Ok((stream, peer_addr)) => {
                        tracing::warn!(
                            "Refusing client {}: only one client is served at a time",
                            peer_addr
                        );
                        drop(stream);
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept client: {}", e);
                        if !pause_after_accept_error(&mut closed).await {
                            break;
                        }
                    }
                }
            }
            listening.store(false, Ordering::SeqCst);
            tracing::debug!("Client acceptance task stopped");
        });

        *self.accept_task.lock().await = Some(task);

        Ok(())
    }

    async fn writeln(&self, text: &str) -> Result<()> {
        let mut closed = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            return Err(BroadcasterError::SessionClosed);
        }

        let mut peer = self.peer.lock().await;
        if peer.is_none() {
            *peer = Some(self.attach_peer(&mut closed).await?);
            self.peer_attached.store(true, Ordering::SeqCst);
        }
        let stream = peer.as_mut().ok_or(BroadcasterError::SessionClosed)?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        let write = write_line(stream, line.as_bytes());
        tokio::pin!(write);

        tokio::select! {
            result = &mut write => result.map_err(BroadcasterError::BrokenConnection),
            _ = closed.wait() => {
                // finish the block on the wire rather than cut it mid-record
                match tokio::time::timeout(WRITE_GRACE, &mut write).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(BroadcasterError::BrokenConnection(e)),
                    Err(_) => {
                        tracing::warn!("Dropping partially written block on shutdown");
                        Err(BroadcasterError::SessionClosed)
                    }
                }
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    async fn stop_server(&self) {
        self.shutdown.trigger();

        let task = self.accept_task.lock().await.take();
        let was_running = task.is_some();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Client acceptance task ended abnormally: {}", e);
            }
        }
        self.listening.store(false, Ordering::SeqCst);

        self.incoming.lock().await.take();
        if let Some(mut stream) = self.peer.lock().await.take() {
            let _ = stream.shutdown().await;
        }
        self.peer_attached.store(false, Ordering::SeqCst);

        if was_running {
            tracing::info!("WITS session on port {} stopped", self.port);
        }
    }
}

/// Time an in-flight write may take to complete once a stop is requested
pub const WRITE_GRACE: Duration = Duration::from_millis(500);

/// Pause before retrying a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Wait out the accept backoff; `false` when the session closed meanwhile
async fn pause_after_accept_error(closed: &mut ShutdownListener) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
        _ = closed.wait() => false,
    }
}

async fn write_line(stream: &mut TcpStream, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}
