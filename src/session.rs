//! Server-side lobby state
//!
//! A `SessionManager` owns every lobby and is only changed through its own
//! methods. Callers pass the current `Instant` so seat timeouts can be
//! driven deterministically.

use crate::board::empty_export;
use crate::error::SessionError;
use crate::leaderboard::Leaderboard;
use crate::protocol::{LobbyInfo, Request, Response, SeatStatus, SeatTicket};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Seats in every lobby
pub const SEATS_PER_GAME: usize = 9;

/// Seats not updated for this long are recycled
pub const SEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// One player slot
#[derive(Debug, Clone, PartialEq)]
pub struct Seat {
    /// Last exported board pushed by the occupant
    pub board_state: String,
    pub attacks_waiting: u32,
    /// `None` until someone sits
    pub last_update: Option<Instant>,
    /// Occupant's board has died; the seat can be claimed again
    pub dead: bool,
    token: u64,
}

impl Seat {
    fn fresh() -> Self {
        Self {
            board_state: empty_export(),
            attacks_waiting: 0,
            last_update: None,
            dead: false,
            token: 0,
        }
    }

    /// Held by a live player
    pub fn is_occupied(&self) -> bool {
        self.last_update.is_some() && !self.dead
    }

    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.last_update
            .is_some_and(|last| now.saturating_duration_since(last) > timeout)
    }
}

#[derive(Debug, Clone)]
pub struct Lobby {
    pub id: u32,
    pub name: String,
    seats: Vec<Seat>,
}

impl Lobby {
    fn new(id: u32) -> Self {
        Self {
            id,
            name: format!("Lobby {}", id + 1),
            seats: (0..SEATS_PER_GAME).map(|_| Seat::fresh()).collect(),
        }
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn occupied(&self) -> usize {
        self.seats.iter().filter(|s| s.is_occupied()).count()
    }

    /// Reset seats whose occupant stopped updating
    fn purge(&mut self, now: Instant, timeout: Duration) {
        for (index, seat) in self.seats.iter_mut().enumerate() {
            if seat.is_expired(now, timeout) {
                tracing::info!("Lobby {} seat {} timed out", self.id, index);
                *seat = Seat::fresh();
            }
        }
    }

    fn seat_mut(&mut self, seat: usize) -> Result<&mut Seat, SessionError> {
        let game_id = self.id;
        self.seats
            .get_mut(seat)
            .ok_or(SessionError::SeatOutOfRange { game_id, seat })
    }

    /// The seat a ticket refers to, if the ticket is still current
    fn held_seat_mut(&mut self, ticket: SeatTicket) -> Result<&mut Seat, SessionError> {
        let game_id = self.id;
        let seat = self.seat_mut(ticket.seat)?;
        if seat.last_update.is_none() || seat.token != ticket.token {
            return Err(SessionError::SeatNotHeld {
                game_id,
                seat: ticket.seat,
            });
        }
        Ok(seat)
    }
}

/// Every lobby on the server
#[derive(Debug, Clone)]
pub struct SessionManager {
    lobbies: Vec<Lobby>,
    seat_timeout: Duration,
    next_token: u64,
}

impl SessionManager {
    pub fn new(lobby_count: usize, seat_timeout: Duration) -> Self {
        Self {
            lobbies: (0..lobby_count as u32).map(Lobby::new).collect(),
            seat_timeout,
            next_token: 1,
        }
    }

    pub fn lobby(&self, game_id: u32) -> Result<&Lobby, SessionError> {
        self.lobbies
            .get(game_id as usize)
            .ok_or(SessionError::UnknownGame(game_id))
    }

    fn lobby_mut(&mut self, game_id: u32) -> Result<&mut Lobby, SessionError> {
        self.lobbies
            .get_mut(game_id as usize)
            .ok_or(SessionError::UnknownGame(game_id))
    }

    /// Claim the first seat that is free or whose board is dead, after
    /// recycling timed-out ones
    ///
    /// Returns `None` when the lobby is full.
    pub fn seat(&mut self, game_id: u32, now: Instant) -> Result<Option<SeatTicket>, SessionError> {
        let timeout = self.seat_timeout;
        let token = self.next_token;
        let lobby = self.lobby_mut(game_id)?;
        lobby.purge(now, timeout);

        let Some(index) = lobby.seats.iter().position(|s| !s.is_occupied()) else {
            tracing::info!("Lobby {} is full", game_id);
            return Ok(None);
        };
        lobby.seats[index] = Seat {
            last_update: Some(now),
            token,
            ..Seat::fresh()
        };
        self.next_token += 1;
        tracing::info!("Seated player in lobby {} seat {}", game_id, index);
        Ok(Some(SeatTicket { seat: index, token }))
    }

    /// Exported boards of every seat, in seat order
    pub fn board_states(&self, game_id: u32) -> Result<Vec<String>, SessionError> {
        Ok(self
            .lobby(game_id)?
            .seats
            .iter()
            .map(|s| s.board_state.clone())
            .collect())
    }

    /// Store a seat's board
    ///
    /// Once a seat reports a dead board it stays claimable, even though the
    /// old occupant keeps pushing for spectators.
    pub fn update_board(
        &mut self,
        game_id: u32,
        ticket: SeatTicket,
        board_state: String,
        dead: bool,
        now: Instant,
    ) -> Result<(), SessionError> {
        let seat = self.lobby_mut(game_id)?.held_seat_mut(ticket)?;
        if dead && !seat.dead {
            tracing::info!("Lobby {} seat {} is out", game_id, ticket.seat);
        }
        seat.board_state = board_state;
        seat.dead |= dead;
        seat.last_update = Some(now);
        Ok(())
    }

    /// Give `lines` to every seat except the sender
    ///
    /// Returns every seat's waiting counter afterwards.
    pub fn line_clear_attack(
        &mut self,
        game_id: u32,
        sender: SeatTicket,
        lines: u32,
    ) -> Result<Vec<u32>, SessionError> {
        let lobby = self.lobby_mut(game_id)?;
        lobby.held_seat_mut(sender)?;
        for (index, seat) in lobby.seats.iter_mut().enumerate() {
            if index != sender.seat {
                seat.attacks_waiting = seat.attacks_waiting.saturating_add(lines);
            }
        }
        tracing::debug!(
            "Seat {} in lobby {} sent {} lines",
            sender.seat,
            game_id,
            lines
        );
        Ok(lobby.seats.iter().map(|s| s.attacks_waiting).collect())
    }

    /// Read and zero a seat's waiting attacks
    pub fn take_attacks(&mut self, game_id: u32, ticket: SeatTicket) -> Result<u32, SessionError> {
        let seat = self.lobby_mut(game_id)?.held_seat_mut(ticket)?;
        Ok(std::mem::take(&mut seat.attacks_waiting))
    }

    /// Describe every lobby, recycling timed-out seats first
    pub fn lobbies(&mut self, now: Instant) -> Vec<LobbyInfo> {
        let timeout = self.seat_timeout;
        self.lobbies
            .iter_mut()
            .map(|l| {
                l.purge(now, timeout);
                LobbyInfo {
                    id: l.id,
                    name: l.name.clone(),
                    occupied: l.occupied(),
                }
            })
            .collect()
    }
}

/// Everything a lobby server answers requests from
#[derive(Debug)]
pub struct ServerState {
    pub sessions: SessionManager,
    pub leaderboard: Leaderboard,
    /// Where the leaderboard is saved after each accepted run
    pub leaderboard_path: Option<PathBuf>,
}

impl ServerState {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions,
            leaderboard: Leaderboard::new(),
            leaderboard_path: None,
        }
    }

    /// Answer one request
    pub fn dispatch(&mut self, request: Request, now: Instant) -> Response {
        match self.handle(request, now) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Rejected request: {}", e);
                Response::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    fn handle(&mut self, request: Request, now: Instant) -> Result<Response, SessionError> {
        let response = match request {
            Request::Sit { game_id } => {
                let ticket = self.sessions.seat(game_id, now)?;
                let status = match ticket {
                    Some(_) => SeatStatus::Seated,
                    None => SeatStatus::Full,
                };
                Response::Seat { status, ticket }
            }
            Request::GetBoards { game_id } => Response::Boards {
                boards: self.sessions.board_states(game_id)?,
            },
            Request::UpdateBoard {
                game_id,
                seat,
                token,
                board_state,
                dead,
            } => {
                let ticket = SeatTicket { seat, token };
                self.sessions
                    .update_board(game_id, ticket, board_state, dead, now)?;
                Response::Ack
            }
            Request::LineClearAttack {
                game_id,
                seat,
                token,
                lines,
            } => Response::AttackCounters {
                attacks: self.sessions.line_clear_attack(
                    game_id,
                    SeatTicket { seat, token },
                    lines,
                )?,
            },
            Request::GetAttacks {
                game_id,
                seat,
                token,
            } => Response::Attacks {
                lines: self
                    .sessions
                    .take_attacks(game_id, SeatTicket { seat, token })?,
            },
            Request::SubmitScore { record } => {
                let player = record.player.clone();
                let time = record.time;
                if let Some(rank) = self.leaderboard.submit(record) {
                    tracing::info!("{} placed #{} with {:.3}s", player, rank, time);
                    self.save_leaderboard();
                }
                Response::Leaderboard {
                    entries: self.leaderboard.entries().to_vec(),
                }
            }
            Request::GetLeaderboard => Response::Leaderboard {
                entries: self.leaderboard.entries().to_vec(),
            },
            Request::ListLobbies => Response::Lobbies {
                lobbies: self.sessions.lobbies(now),
            },
        };
        Ok(response)
    }

    fn save_leaderboard(&self) {
        let Some(path) = &self.leaderboard_path else {
            return;
        };
        if let Err(e) = self.leaderboard.save(path) {
            tracing::warn!("Failed to save leaderboard to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::ScoreRecord;

    fn manager() -> SessionManager {
        SessionManager::new(2, SEAT_TIMEOUT)
    }

    /// Fill lobby 0 and return every ticket in seat order
    fn fill(sessions: &mut SessionManager, now: Instant) -> Vec<SeatTicket> {
        (0..SEATS_PER_GAME)
            .map(|_| sessions.seat(0, now).unwrap().unwrap())
            .collect()
    }

    #[test]
    fn test_seats_fill_in_order() {
        let mut sessions = manager();
        let now = Instant::now();
        let tickets = fill(&mut sessions, now);
        let seats: Vec<usize> = tickets.iter().map(|t| t.seat).collect();
        assert_eq!(seats, (0..SEATS_PER_GAME).collect::<Vec<_>>());
        assert_eq!(sessions.seat(0, now), Ok(None));
        // Other lobbies are independent
        assert_eq!(sessions.seat(1, now).unwrap().map(|t| t.seat), Some(0));
    }

    #[test]
    fn test_tokens_are_unique() {
        let mut sessions = manager();
        let now = Instant::now();
        let mut tokens: Vec<u64> = fill(&mut sessions, now).iter().map(|t| t.token).collect();
        tokens.push(sessions.seat(1, now).unwrap().unwrap().token);
        tokens.sort_unstable();
        tokens.dedup();
        assert_eq!(tokens.len(), SEATS_PER_GAME + 1);
    }

    #[test]
    fn test_timed_out_seat_is_recycled() {
        let mut sessions = manager();
        let start = Instant::now();
        let tickets = fill(&mut sessions, start);
        sessions
            .update_board(0, tickets[3], "1".repeat(240), false, start)
            .unwrap();
        sessions.line_clear_attack(0, tickets[0], 4).unwrap();

        // Everyone but seat 5 keeps updating
        let later = start + SEAT_TIMEOUT + Duration::from_secs(1);
        for ticket in tickets.iter().filter(|t| t.seat != 5) {
            sessions
                .update_board(0, *ticket, empty_export(), false, later)
                .unwrap();
        }

        let recycled = sessions.seat(0, later).unwrap().unwrap();
        assert_eq!(recycled.seat, 5);
        let lobby = sessions.lobby(0).unwrap();
        assert_eq!(lobby.seats()[5].attacks_waiting, 0);
        assert_eq!(lobby.seats()[5].board_state, empty_export());
        assert_eq!(lobby.occupied(), SEATS_PER_GAME);

        // The stalled client no longer owns the seat
        assert_eq!(
            sessions.update_board(0, tickets[5], "2".repeat(240), false, later),
            Err(SessionError::SeatNotHeld {
                game_id: 0,
                seat: 5
            })
        );
        assert_eq!(
            sessions.take_attacks(0, tickets[5]),
            Err(SessionError::SeatNotHeld {
                game_id: 0,
                seat: 5
            })
        );
        assert_eq!(sessions.take_attacks(0, recycled), Ok(0));
    }

    #[test]
    fn test_dead_seat_can_be_claimed() {
        let mut sessions = manager();
        let now = Instant::now();
        let tickets = fill(&mut sessions, now);
        assert_eq!(sessions.seat(0, now), Ok(None));

        let dead_board = "3".repeat(240);
        sessions
            .update_board(0, tickets[3], dead_board.clone(), true, now)
            .unwrap();
        assert_eq!(sessions.lobby(0).unwrap().occupied(), SEATS_PER_GAME - 1);

        // Spectator pushes keep the board visible but don't retake the seat
        let later = now + Duration::from_secs(1);
        sessions
            .update_board(0, tickets[3], dead_board.clone(), false, later)
            .unwrap();
        assert_eq!(sessions.board_states(0).unwrap()[3], dead_board);
        assert_eq!(sessions.lobby(0).unwrap().occupied(), SEATS_PER_GAME - 1);

        let newcomer = sessions.seat(0, later).unwrap().unwrap();
        assert_eq!(newcomer.seat, 3);
        assert_eq!(sessions.board_states(0).unwrap()[3], empty_export());
        assert!(
            sessions
                .update_board(0, tickets[3], dead_board, true, later)
                .is_err()
        );
        assert_eq!(sessions.lobby(0).unwrap().occupied(), SEATS_PER_GAME);
    }

    #[test]
    fn test_free_seat_rejects_updates() {
        let mut sessions = manager();
        let guess = SeatTicket { seat: 2, token: 0 };
        assert_eq!(
            sessions.update_board(0, guess, empty_export(), false, Instant::now()),
            Err(SessionError::SeatNotHeld {
                game_id: 0,
                seat: 2
            })
        );
        assert_eq!(sessions.lobby(0).unwrap().occupied(), 0);
    }

    #[test]
    fn test_attack_skips_sender() {
        let mut sessions = manager();
        let tickets = fill(&mut sessions, Instant::now());
        let counters = sessions.line_clear_attack(0, tickets[0], 2).unwrap();
        assert_eq!(counters[0], 0);
        assert!(counters[1..].iter().all(|&c| c == 2));

        let counters = sessions.line_clear_attack(0, tickets[4], 1).unwrap();
        assert_eq!(counters[0], 1);
        assert_eq!(counters[4], 2);
        assert_eq!(counters[8], 3);
    }

    #[test]
    fn test_take_attacks_zeroes() {
        let mut sessions = manager();
        let tickets = fill(&mut sessions, Instant::now());
        sessions.line_clear_attack(0, tickets[0], 3).unwrap();
        assert_eq!(sessions.take_attacks(0, tickets[1]), Ok(3));
        assert_eq!(sessions.take_attacks(0, tickets[1]), Ok(0));
        assert_eq!(sessions.take_attacks(0, tickets[0]), Ok(0));
    }

    #[test]
    fn test_lobby_list_drops_stale_seats() {
        let mut sessions = manager();
        let start = Instant::now();
        let first = sessions.seat(0, start).unwrap().unwrap();
        sessions.seat(0, start).unwrap();
        let later = start + SEAT_TIMEOUT + Duration::from_secs(1);
        sessions
            .update_board(0, first, empty_export(), false, later)
            .unwrap();

        let lobbies = sessions.lobbies(later);
        assert_eq!(lobbies[0].occupied, 1);
        assert_eq!(lobbies[1].occupied, 0);
    }

    #[test]
    fn test_bad_ids() {
        let mut sessions = manager();
        assert_eq!(
            sessions.seat(7, Instant::now()),
            Err(SessionError::UnknownGame(7))
        );
        let ticket = SeatTicket {
            seat: SEATS_PER_GAME,
            token: 1,
        };
        assert_eq!(
            sessions.take_attacks(1, ticket),
            Err(SessionError::SeatOutOfRange {
                game_id: 1,
                seat: SEATS_PER_GAME
            })
        );
    }

    #[test]
    fn test_dispatch() {
        let mut state = ServerState::new(manager());
        let now = Instant::now();

        let Response::Seat {
            status: SeatStatus::Seated,
            ticket: Some(ticket),
        } = state.dispatch(Request::Sit { game_id: 0 }, now)
        else {
            panic!("expected a seat");
        };
        assert_eq!(ticket.seat, 0);
        assert!(matches!(
            state.dispatch(Request::GetBoards { game_id: 9 }, now),
            Response::Error { .. }
        ));
        assert!(matches!(
            state.dispatch(
                Request::GetAttacks {
                    game_id: 0,
                    seat: 0,
                    token: ticket.token + 1
                },
                now
            ),
            Response::Error { .. }
        ));

        let record = ScoreRecord {
            player: "ada".to_string(),
            time: 61.5,
            lines: 40,
            pieces: 101,
            score: 9000,
            frames: 3690,
        };
        let response = state.dispatch(Request::SubmitScore { record: record.clone() }, now);
        assert_eq!(
            response,
            Response::Leaderboard {
                entries: vec![record]
            }
        );

        let Response::Lobbies { lobbies } = state.dispatch(Request::ListLobbies, now) else {
            panic!("expected lobby list");
        };
        assert_eq!(lobbies.len(), 2);
        assert_eq!(lobbies[0].occupied, 1);
    }
}
