//! Client side of the lobby protocol

use crate::error::{NetError, Result};
use crate::leaderboard::ScoreRecord;
use crate::protocol::{
    LobbyInfo, Request, Response, SeatStatus, SeatTicket, read_message, write_message,
};
use crate::server::{SharedState, handle_request};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default bound on a single request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Something that can carry one request to a lobby server and bring back its answer
pub trait Transport: Send + Sync + 'static {
    fn call(&self, request: Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Opens a fresh TCP connection per request
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    async fn exchange(&self, request: &Request) -> Result<Response> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        write_message(&mut stream, request).await?;
        match read_message(&mut stream).await? {
            Some(response) => Ok(response),
            None => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
        }
    }
}

impl Transport for TcpTransport {
    async fn call(&self, request: Request) -> Result<Response> {
        timeout(self.timeout, self.exchange(&request))
            .await
            .map_err(|_| NetError::Timeout(request.kind()))?
    }
}

/// Talks to server state in the same process
#[derive(Debug, Clone)]
pub struct LocalTransport {
    state: SharedState,
}

impl LocalTransport {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl Transport for LocalTransport {
    async fn call(&self, request: Request) -> Result<Response> {
        Ok(handle_request(&self.state, request))
    }
}

/// Typed wrapper over the lobby requests
#[derive(Debug, Clone)]
pub struct LobbyClient<T> {
    transport: T,
}

impl<T: Transport> LobbyClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn request(&self, request: Request) -> Result<Response> {
        match self.transport.call(request).await? {
            Response::Error { message } => Err(NetError::Server(message)),
            response => Ok(response),
        }
    }

    /// Ask for a seat; `None` means the lobby is full
    pub async fn seat(&self, game_id: u32) -> Result<Option<SeatTicket>> {
        match self.request(Request::Sit { game_id }).await? {
            Response::Seat {
                status: SeatStatus::Seated,
                ticket: Some(ticket),
            } => Ok(Some(ticket)),
            Response::Seat {
                status: SeatStatus::Full,
                ..
            } => Ok(None),
            _ => Err(NetError::UnexpectedResponse("sit")),
        }
    }

    pub async fn board_states(&self, game_id: u32) -> Result<Vec<String>> {
        match self.request(Request::GetBoards { game_id }).await? {
            Response::Boards { boards } => Ok(boards),
            _ => Err(NetError::UnexpectedResponse("get_boards")),
        }
    }

    pub async fn update_board(
        &self,
        game_id: u32,
        ticket: SeatTicket,
        board_state: String,
        dead: bool,
    ) -> Result<()> {
        let request = Request::UpdateBoard {
            game_id,
            seat: ticket.seat,
            token: ticket.token,
            board_state,
            dead,
        };
        match self.request(request).await? {
            Response::Ack => Ok(()),
            _ => Err(NetError::UnexpectedResponse("update_board")),
        }
    }

    /// Send lines to every other seat, returns all waiting counters
    pub async fn line_clear_attack(
        &self,
        game_id: u32,
        ticket: SeatTicket,
        lines: u32,
    ) -> Result<Vec<u32>> {
        let request = Request::LineClearAttack {
            game_id,
            seat: ticket.seat,
            token: ticket.token,
            lines,
        };
        match self.request(request).await? {
            Response::AttackCounters { attacks } => Ok(attacks),
            _ => Err(NetError::UnexpectedResponse("line_clear_attack")),
        }
    }

    /// Take the lines owed to this seat
    pub async fn get_attacks(&self, game_id: u32, ticket: SeatTicket) -> Result<u32> {
        let request = Request::GetAttacks {
            game_id,
            seat: ticket.seat,
            token: ticket.token,
        };
        match self.request(request).await? {
            Response::Attacks { lines } => Ok(lines),
            _ => Err(NetError::UnexpectedResponse("get_attacks")),
        }
    }

    /// Submit a finished run, returns the leaderboard afterwards
    pub async fn submit_score(&self, record: ScoreRecord) -> Result<Vec<ScoreRecord>> {
        match self.request(Request::SubmitScore { record }).await? {
            Response::Leaderboard { entries } => Ok(entries),
            _ => Err(NetError::UnexpectedResponse("submit_score")),
        }
    }

    pub async fn leaderboard(&self) -> Result<Vec<ScoreRecord>> {
        match self.request(Request::GetLeaderboard).await? {
            Response::Leaderboard { entries } => Ok(entries),
            _ => Err(NetError::UnexpectedResponse("get_leaderboard")),
        }
    }

    pub async fn list_lobbies(&self) -> Result<Vec<LobbyInfo>> {
        match self.request(Request::ListLobbies).await? {
            Response::Lobbies { lobbies } => Ok(lobbies),
            _ => Err(NetError::UnexpectedResponse("list_lobbies")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SEAT_TIMEOUT, SEATS_PER_GAME, ServerState, SessionManager};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    fn local_client() -> LobbyClient<LocalTransport> {
        let state = ServerState::new(SessionManager::new(1, SEAT_TIMEOUT));
        LobbyClient::new(LocalTransport::new(Arc::new(Mutex::new(state))))
    }

    #[tokio::test]
    async fn test_full_lobby_is_not_an_error() {
        let client = local_client();
        for expected in 0..SEATS_PER_GAME {
            let ticket = client.seat(0).await.unwrap().unwrap();
            assert_eq!(ticket.seat, expected);
        }
        assert_eq!(client.seat(0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_server_errors_surface() {
        let client = local_client();
        let ticket = client.seat(0).await.unwrap().unwrap();
        let result = client.get_attacks(3, ticket).await;
        assert!(matches!(result, Err(NetError::Server(_))));

        let stale = SeatTicket {
            token: ticket.token + 1,
            ..ticket
        };
        let result = client.update_board(0, stale, String::new(), false).await;
        assert!(matches!(result, Err(NetError::Server(_))));
    }

    #[tokio::test]
    async fn test_tcp_times_out_on_silent_server() {
        // Accepts connections but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = LobbyClient::new(TcpTransport::new(addr.to_string(), Duration::from_millis(100)));
        let result = client.seat(0).await;
        assert!(matches!(result, Err(NetError::Timeout("sit"))));
    }
}
