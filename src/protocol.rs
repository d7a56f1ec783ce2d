//! Lobby protocol messages and framing
//!
//! Every request is answered by exactly one response. Messages are JSON,
//! each prefixed with its length as a 4-byte big-endian integer.
//!
//! Request                  | HTTP-style route
//! ------------------------ | -----------------------------------------
//! `Sit`                    | `GET /games/{id}/sit`
//! `GetBoards`              | `GET /games/{id}`
//! `UpdateBoard`            | `POST /games/update/{id}/{seat}`
//! `LineClearAttack`        | `POST /games/line-clear-attack/{id}/{seat}/{lines}`
//! `GetAttacks`             | `GET /games/get-attacks/{id}/{seat}`
//! `SubmitScore`            | `POST /leaderboard`
//! `GetLeaderboard`         | `GET /leaderboard`
//! `ListLobbies`            | `GET /games`

use crate::error::{NetError, Result};
use crate::leaderboard::ScoreRecord;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests a client can send to the lobby server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ask for a free seat in a lobby
    Sit { game_id: u32 },
    /// Fetch every seat's exported board
    GetBoards { game_id: u32 },
    /// Push this seat's exported board
    UpdateBoard {
        game_id: u32,
        seat: usize,
        token: u64,
        board_state: String,
        /// A dead board gives its seat up but stays visible
        #[serde(default)]
        dead: bool,
    },
    /// Send lines to every other seat
    LineClearAttack {
        game_id: u32,
        seat: usize,
        token: u64,
        lines: u32,
    },
    /// Read and zero this seat's waiting attack lines
    GetAttacks { game_id: u32, seat: usize, token: u64 },
    /// Record a finished time attack run
    SubmitScore { record: ScoreRecord },
    /// Fetch the leaderboard without submitting
    GetLeaderboard,
    /// Describe every lobby
    ListLobbies,
}

impl Request {
    /// Short operation name for errors and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Sit { .. } => "sit",
            Request::GetBoards { .. } => "get_boards",
            Request::UpdateBoard { .. } => "update_board",
            Request::LineClearAttack { .. } => "line_clear_attack",
            Request::GetAttacks { .. } => "get_attacks",
            Request::SubmitScore { .. } => "submit_score",
            Request::GetLeaderboard => "get_leaderboard",
            Request::ListLobbies => "list_lobbies",
        }
    }

    /// HTTP-style route, used in logs
    pub fn route(&self) -> String {
        match self {
            Request::Sit { game_id } => format!("GET /games/{}/sit", game_id),
            Request::GetBoards { game_id } => format!("GET /games/{}", game_id),
            Request::UpdateBoard { game_id, seat, .. } => {
                format!("POST /games/update/{}/{}", game_id, seat)
            }
            Request::LineClearAttack {
                game_id,
                seat,
                lines,
                ..
            } => format!("POST /games/line-clear-attack/{}/{}/{}", game_id, seat, lines),
            Request::GetAttacks { game_id, seat, .. } => {
                format!("GET /games/get-attacks/{}/{}", game_id, seat)
            }
            Request::SubmitScore { .. } => "POST /leaderboard".to_string(),
            Request::GetLeaderboard => "GET /leaderboard".to_string(),
            Request::ListLobbies => "GET /games".to_string(),
        }
    }
}

/// Outcome of a sit request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Seated,
    /// Every seat is in use
    Full,
}

/// A claimed seat
///
/// The token is handed out by `Sit` and must accompany every request made
/// from the seat, so a client whose seat was recycled cannot touch the new
/// occupant's board or attacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatTicket {
    pub seat: usize,
    pub token: u64,
}

/// Summary of one lobby
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyInfo {
    pub id: u32,
    pub name: String,
    pub occupied: usize,
}

/// Server replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Seat {
        status: SeatStatus,
        ticket: Option<SeatTicket>,
    },
    Boards { boards: Vec<String> },
    Ack,
    /// Every seat's waiting-attack counter after an attack
    AttackCounters { attacks: Vec<u32> },
    Attacks { lines: u32 },
    Leaderboard { entries: Vec<ScoreRecord> },
    Lobbies { lobbies: Vec<LobbyInfo> },
    Error { message: String },
}

/// Serialize a message to bytes with length prefix
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_LEN {
        return Err(NetError::MessageTooLarge(json.len()));
    }
    let len = json.len() as u32;
    let mut data = len.to_be_bytes().to_vec();
    data.extend(json);
    Ok(data)
}

/// Write one length-prefixed message
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let data = encode_message(msg)?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-prefixed message from a stream
///
/// Returns `Ok(None)` if the stream closed cleanly before a new message.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncReadExt + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(NetError::MessageTooLarge(len));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Some(serde_json::from_slice(&data)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes() {
        assert_eq!(Request::Sit { game_id: 3 }.route(), "GET /games/3/sit");
        assert_eq!(
            Request::LineClearAttack {
                game_id: 1,
                seat: 0,
                token: 7,
                lines: 2
            }
            .route(),
            "POST /games/line-clear-attack/1/0/2"
        );
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(Request::GetAttacks {
            game_id: 4,
            seat: 2,
            token: 11,
        })
        .unwrap();
        assert_eq!(json["type"], "get_attacks");
        assert_eq!(json["seat"], 2);
        assert_eq!(json["token"], 11);

        let json = serde_json::to_value(Response::Seat {
            status: SeatStatus::Full,
            ticket: None,
        })
        .unwrap();
        assert_eq!(json["status"], "full");
    }

    #[test]
    fn test_update_without_dead_flag_is_alive() {
        let request: Request = serde_json::from_str(
            r#"{"type":"update_board","game_id":0,"seat":1,"token":3,"board_state":""}"#,
        )
        .unwrap();
        assert!(matches!(request, Request::UpdateBoard { dead: false, .. }));
    }

    #[tokio::test]
    async fn test_framed_exchange() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let request = Request::UpdateBoard {
            game_id: 0,
            seat: 5,
            token: 2,
            board_state: "0".repeat(240),
            dead: true,
        };
        write_message(&mut client, &request).await.unwrap();
        let received: Option<Request> = read_message(&mut server).await.unwrap();
        assert_eq!(received, Some(request));

        drop(client);
        let closed: Option<Request> = read_message(&mut server).await.unwrap();
        assert_eq!(closed, None);
    }

    #[tokio::test]
    async fn test_rejects_oversized_frame() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let len = (MAX_MESSAGE_LEN as u32 + 1).to_be_bytes();
        client.write_all(&len).await.unwrap();
        let result: Result<Option<Request>> = read_message(&mut server).await;
        assert!(matches!(result, Err(NetError::MessageTooLarge(_))));
    }
}
