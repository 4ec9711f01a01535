//! TCP front end: accept loop, one task per connection, framed
//! request/response loop, graceful shutdown over a watch channel.

use crate::error::{StrataDbError, StrataDbResult};
use crate::node::StrataNode;
use crate::protocol::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::protocol::wire::{read_frame, write_frame};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

pub struct TcpServer {
    node: Arc<StrataNode>,
    listener: TcpListener,
    shutdown_tx: watch::Sender<bool>,
}

impl TcpServer {
    /// Bind the node's configured listen address.
    pub async fn bind(node: Arc<StrataNode>) -> StrataDbResult<Self> {
        let address = node.config().listen_address.clone();
        let listener = TcpListener::bind(&address).await?;
        let (shutdown_tx, _) = watch::channel(false);
        info!("listening on {}", listener.local_addr()?);
        Ok(Self {
            node,
            listener,
            shutdown_tx,
        })
    }

    /// The bound address; useful when the config asked for port 0.
    pub fn local_addr(&self) -> StrataDbResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle that stops the accept loop when triggered.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Accept connections until shutdown is signalled. Each connection gets
    /// its own task; in-flight requests on live connections finish on their
    /// own schedule.
    pub async fn run(self) -> StrataDbResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!("connection from {}", peer);
                    let node = Arc::clone(&self.node);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(node, stream).await {
                            debug!("connection {} closed: {}", peer, e);
                        }
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("shutting down listener");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// One connection: read a frame, dispatch, write the reply, repeat until
/// the peer closes. Requests on a connection are answered in order.
async fn serve_connection(node: Arc<StrataNode>, mut stream: TcpStream) -> StrataDbResult<()> {
    loop {
        let request: Option<RequestEnvelope> = match read_frame(&mut stream).await {
            Ok(request) => request,
            Err(StrataDbError::Serialization(e)) => {
                // Unparseable frame: answer with an error and keep going.
                let err = StrataDbError::InvalidArgument(format!("Malformed envelope: {}", e));
                write_frame(&mut stream, &ResponseEnvelope::err(&err)).await?;
                continue;
            }
            Err(e) => return Err(e),
        };
        let Some(request) = request else {
            return Ok(());
        };
        let response = node.dispatch(request).await;
        if let Err(e) = write_frame(&mut stream, &response).await {
            error!("failed to write response: {}", e);
            return Err(e);
        }
    }
}
