//! Loopback TCP server for a virtual matrix
//!
//! Binds an ephemeral port on 127.0.0.1 and answers every connection with the
//! shared [`VirtualMatrix`]. Connections are served concurrently, exactly like
//! a real unit would accept them. Every received command is logged for
//! inspection.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hdmx_protocol::{CommandCodec, MatrixCommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::VirtualMatrix;

struct Shared {
    matrix: Mutex<VirtualMatrix>,
    received: Mutex<Vec<MatrixCommand>>,
    accepted: AtomicUsize,
}

impl Shared {
    fn matrix(&self) -> MutexGuard<'_, VirtualMatrix> {
        self.matrix.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn received(&self) -> MutexGuard<'_, Vec<MatrixCommand>> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A virtual matrix listening on a loopback TCP port
///
/// The listener stops when the server is dropped.
pub struct VirtualMatrixServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl VirtualMatrixServer {
    /// Start serving `matrix` on an ephemeral loopback port
    pub async fn spawn(matrix: VirtualMatrix) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            matrix: Mutex::new(matrix),
            received: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
        });

        info!("Virtual matrix listening on {}", addr);

        let task = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
        Ok(Self { addr, shared, task })
    }

    /// Address the server is bound to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Host part of the bound address
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Port the server is bound to
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Lock the simulated matrix for inspection or out-of-band changes
    pub fn matrix(&self) -> MutexGuard<'_, VirtualMatrix> {
        self.shared.matrix()
    }

    /// Every command received so far, in arrival order
    pub fn received(&self) -> Vec<MatrixCommand> {
        self.shared.received().clone()
    }

    /// Forget the received command log
    pub fn clear_received(&self) {
        self.shared.received().clear();
    }

    /// Total connections accepted
    pub fn connections_accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Stop listening and wait until the port is closed
    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        info!("Virtual matrix on {} stopped", self.addr);
    }
}

impl Drop for VirtualMatrixServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Virtual matrix accepted connection from {}", peer);
                tokio::spawn(serve_connection(stream, Arc::clone(&shared)));
            }
            Err(e) => {
                warn!("Virtual matrix accept failed: {}", e);
                break;
            }
        }
    }
}

async fn serve_connection(mut stream: TcpStream, shared: Arc<Shared>) {
    shared.accepted.fetch_add(1, Ordering::SeqCst);

    let mut codec = CommandCodec::new();
    let mut buf = [0u8; 256];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                trace!("Virtual matrix read error: {}", e);
                break;
            }
        };
        codec.push_bytes(&buf[..n]);

        while let Some(command) = codec.next_command() {
            shared.received().push(command);

            let reply = {
                let mut matrix = shared.matrix();
                let reply = matrix.handle(&command);
                (!matrix.is_silent()).then_some(reply)
            };

            let Some(reply) = reply else {
                trace!("Virtual matrix silently dropped {:?}", command);
                continue;
            };

            trace!("Virtual matrix reply to {:?}: {:?}", command, reply);
            if let Err(e) = stream.write_all(reply.as_bytes()).await {
                trace!("Virtual matrix write error: {}", e);
                return;
            }
        }
    }
}
