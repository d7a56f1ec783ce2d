//! TCP lobby server
//!
//! Each connection carries any number of request/response exchanges using
//! the framing in `protocol`. All connections share one `ServerState`.

use crate::error::Result;
use crate::protocol::{Request, Response, read_message, write_message};
use crate::session::ServerState;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Server state shared between connection tasks
pub type SharedState = Arc<Mutex<ServerState>>;

/// Answer one request against shared state
pub fn handle_request(state: &Mutex<ServerState>, request: Request) -> Response {
    debug!("{}", request.route());
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    state.dispatch(request, Instant::now())
}

pub struct LobbyServer {
    listener: TcpListener,
    state: SharedState,
}

impl LobbyServer {
    pub async fn bind(addr: &str, state: ServerState) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Lobby server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            state: Arc::new(Mutex::new(state)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Accept connections until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    debug!("Connection from {}", peer);
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, state).await {
                            error!("Connection {} failed: {}", peer, e);
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Lobby server shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn serve_connection(mut stream: TcpStream, state: SharedState) -> Result<()> {
    while let Some(request) = read_message::<_, Request>(&mut stream).await? {
        let response = handle_request(&state, request);
        write_message(&mut stream, &response).await?;
    }
    Ok(())
}
