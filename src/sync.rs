//! Background lobby sync
//!
//! The logic thread never hands its `Board` to the network. Once per frame it
//! calls `SyncLink::publish`, which copies the board export into the link,
//! moves the outgoing attack queue out and moves any pulled attacks in. The
//! `SyncWorker` task only ever touches the link.

use crate::board::{BOARD_WIDTH, Board, EMPTY, Grid, TOTAL_HEIGHT, decode_grid, empty_export};
use crate::leaderboard::ScoreRecord;
use crate::protocol::SeatTicket;
use crate::transport::{LobbyClient, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Default wall-clock interval between sync rounds
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Shortest interval the worker will poll at
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub game_id: u32,
    pub ticket: SeatTicket,
    pub poll_interval: Duration,
}

/// An opponent's board as last seen by the worker
#[derive(Debug, Clone, PartialEq)]
pub struct Opponent {
    pub seat: usize,
    pub grid: Grid,
}

#[derive(Debug)]
struct LinkState {
    board_state: String,
    dead: bool,
    /// Lines waiting to be sent
    outgoing: u32,
    /// Lines pulled from the server, not yet given to the board
    incoming: u32,
    opponents: Vec<Opponent>,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            board_state: empty_export(),
            dead: false,
            outgoing: 0,
            incoming: 0,
            opponents: Vec::new(),
        }
    }
}

/// State shared between the logic thread and the sync worker
#[derive(Debug, Clone, Default)]
pub struct SyncLink {
    inner: Arc<Mutex<LinkState>>,
}

impl SyncLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exchange state with the local board
    ///
    /// Returns how many attack lines were handed to the board.
    pub fn publish(&self, board: &mut Board) -> u32 {
        let mut link = self.lock();
        link.board_state = board.export_board();
        link.dead = board.is_dead();
        link.outgoing += board.take_outgoing_attacks();

        let incoming = std::mem::take(&mut link.incoming);
        if incoming > 0 {
            board.queue_attack(incoming);
        }
        incoming
    }

    /// Latest opponent boards, in seat order
    pub fn opponents(&self) -> Vec<Opponent> {
        self.lock().opponents.clone()
    }

    /// Lines queued for sending but not yet taken by the worker
    pub fn pending_outgoing(&self) -> u32 {
        self.lock().outgoing
    }
}

/// What one sync round achieved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub sent: u32,
    pub received: u32,
    /// Number of requests that failed this round
    pub failures: u32,
}

/// Push the last published board
///
/// Returns false if the push failed.
async fn push_board<T: Transport>(
    client: &LobbyClient<T>,
    config: &SyncConfig,
    link: &SyncLink,
) -> bool {
    let (board_state, dead) = {
        let state = link.lock();
        (state.board_state.clone(), state.dead)
    };
    match client
        .update_board(config.game_id, config.ticket, board_state, dead)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!("update_board failed: {}", e);
            false
        }
    }
}

/// Run one push/pull round against the server
///
/// Failures are logged and skipped; lines that fail to send are dropped.
/// Once the board is dead only the board push continues.
pub async fn sync_once<T: Transport>(
    client: &LobbyClient<T>,
    config: &SyncConfig,
    link: &SyncLink,
) -> SyncReport {
    let SyncConfig { game_id, ticket, .. } = *config;
    let mut report = SyncReport::default();

    if !push_board(client, config, link).await {
        report.failures += 1;
    }

    let (dead, outgoing) = {
        let mut state = link.lock();
        (state.dead, std::mem::take(&mut state.outgoing))
    };
    if dead {
        if outgoing > 0 {
            debug!("Seat {} is out, dropping {} lines", ticket.seat, outgoing);
        }
    } else {
        if outgoing > 0 {
            match client.line_clear_attack(game_id, ticket, outgoing).await {
                Ok(_) => {
                    debug!("Sent {} lines from seat {}", outgoing, ticket.seat);
                    report.sent = outgoing;
                }
                Err(e) => {
                    warn!("line_clear_attack failed, {} lines lost: {}", outgoing, e);
                    report.failures += 1;
                }
            }
        }

        match client.get_attacks(game_id, ticket).await {
            Ok(lines) => {
                if lines > 0 {
                    debug!("Seat {} received {} lines", ticket.seat, lines);
                    link.lock().incoming += lines;
                }
                report.received = lines;
            }
            Err(e) => {
                warn!("get_attacks failed: {}", e);
                report.failures += 1;
            }
        }
    }

    match client.board_states(game_id).await {
        Ok(boards) => {
            let opponents = decode_opponents(&boards, ticket.seat);
            link.lock().opponents = opponents;
        }
        Err(e) => {
            warn!("get_board_states failed: {}", e);
            report.failures += 1;
        }
    }

    report
}

/// Decode every board except our own; malformed boards show as empty
fn decode_opponents(boards: &[String], own_seat: usize) -> Vec<Opponent> {
    boards
        .iter()
        .enumerate()
        .filter(|&(seat, _)| seat != own_seat)
        .map(|(seat, state)| {
            let grid = decode_grid(state).unwrap_or_else(|e| {
                warn!("Opponent seat {} sent a malformed board: {}", seat, e);
                [[EMPTY; BOARD_WIDTH]; TOTAL_HEIGHT]
            });
            Opponent { seat, grid }
        })
        .collect()
}

/// Handle to the background sync task
pub struct SyncWorker {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SyncWorker {
    pub fn spawn<T: Transport>(
        handle: &Handle,
        client: LobbyClient<T>,
        config: SyncConfig,
        link: SyncLink,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(Notify::new());

        info!(
            "Starting sync for lobby {} seat {} every {:?}",
            config.game_id, config.ticket.seat, config.poll_interval
        );
        let task = handle.spawn(run_loop(
            client,
            config,
            link,
            running.clone(),
            wake.clone(),
        ));

        Self {
            running,
            wake,
            task,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.task.is_finished()
    }

    /// Stop the worker and wait for it to push the last published board
    pub async fn shutdown(self) {
        self.running.store(false, Ordering::Release);
        self.wake.notify_one();
        if let Err(e) = self.task.await {
            warn!("Sync worker ended abnormally: {}", e);
        }
        info!("Sync worker stopped");
    }

    /// `shutdown` for callers outside the runtime
    pub fn shutdown_blocking(self, handle: &Handle) {
        handle.block_on(self.shutdown());
    }
}

async fn run_loop<T: Transport>(
    client: LobbyClient<T>,
    config: SyncConfig,
    link: SyncLink,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
) {
    let mut ticker = interval(config.poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while running.load(Ordering::Acquire) {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }
        if !running.load(Ordering::Acquire) {
            break;
        }
        let report = sync_once(&client, &config, &link).await;
        if report.failures > 0 {
            debug!("Sync round had {} failures", report.failures);
        }
    }

    push_board(&client, &config, &link).await;
}

/// Submit a finished run without blocking the caller
///
/// Errors are logged and dropped.
pub fn submit_run<T: Transport>(
    handle: &Handle,
    client: LobbyClient<T>,
    record: ScoreRecord,
) -> JoinHandle<()> {
    handle.spawn(async move {
        let player = record.player.clone();
        let time = record.time;
        match client.submit_score(record).await {
            Ok(entries) => {
                let rank = entries
                    .iter()
                    .position(|e| e.player == player && e.time == time);
                match rank {
                    Some(rank) => info!("Run by {} ranked #{}", player, rank + 1),
                    None => info!("Run by {} did not make the leaderboard", player),
                }
            }
            Err(e) => warn!("Leaderboard submission failed: {}", e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::export_grid;
    use crate::server::SharedState;
    use crate::session::{SEAT_TIMEOUT, SEATS_PER_GAME, ServerState, SessionManager};
    use crate::transport::LocalTransport;

    fn shared_state() -> SharedState {
        Arc::new(Mutex::new(ServerState::new(SessionManager::new(1, SEAT_TIMEOUT))))
    }

    fn config(ticket: SeatTicket) -> SyncConfig {
        SyncConfig {
            game_id: 0,
            ticket,
            poll_interval: Duration::from_millis(10),
        }
    }

    async fn sit(client: &LobbyClient<LocalTransport>) -> SeatTicket {
        client.seat(0).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_attack_reaches_other_board() {
        let client = LobbyClient::new(LocalTransport::new(shared_state()));
        let (first, second) = (sit(&client).await, sit(&client).await);
        let sender = SyncLink::new();
        let receiver = SyncLink::new();
        sender.lock().outgoing = 2;

        let report = sync_once(&client, &config(first), &sender).await;
        assert_eq!(report.sent, 2);
        assert_eq!(sender.pending_outgoing(), 0);

        let report = sync_once(&client, &config(second), &receiver).await;
        assert_eq!(report.received, 2);

        let mut board = Board::with_seed(1);
        assert_eq!(receiver.publish(&mut board), 2);
        assert_eq!(board.attacks_waiting(), 2);
        // Handed over exactly once
        assert_eq!(receiver.publish(&mut board), 0);
    }

    #[tokio::test]
    async fn test_dead_board_stops_attack_exchange() {
        let client = LobbyClient::new(LocalTransport::new(shared_state()));
        let (attacker, victim) = (sit(&client).await, sit(&client).await);
        let link = SyncLink::new();
        let mut board = Board::with_seed(1);
        board.kill();
        link.publish(&mut board);
        link.lock().outgoing = 2;

        client.line_clear_attack(0, attacker, 3).await.unwrap();
        let report = sync_once(&client, &config(victim), &link).await;
        assert_eq!(report, SyncReport::default());
        assert_eq!(link.pending_outgoing(), 0);
        // Still owed on the server, and nothing went to the attacker
        assert_eq!(client.get_attacks(0, victim).await.unwrap(), 3);
        assert_eq!(client.get_attacks(0, attacker).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dead_board_frees_its_seat() {
        let client = LobbyClient::new(LocalTransport::new(shared_state()));
        let mut tickets = Vec::new();
        for _ in 0..SEATS_PER_GAME {
            tickets.push(sit(&client).await);
        }
        assert_eq!(client.seat(0).await.unwrap(), None);

        let link = SyncLink::new();
        let mut board = Board::with_seed(1);
        board.kill();
        link.publish(&mut board);
        sync_once(&client, &config(tickets[3]), &link).await;
        // Spectator pushes keep going without retaking the seat
        sync_once(&client, &config(tickets[3]), &link).await;

        let newcomer = client.seat(0).await.unwrap().unwrap();
        assert_eq!(newcomer.seat, 3);
        let report = sync_once(&client, &config(tickets[3]), &link).await;
        assert_eq!(report.failures, 1);
    }

    #[tokio::test]
    async fn test_pushes_board_and_reads_opponents() {
        let client = LobbyClient::new(LocalTransport::new(shared_state()));
        let mut tickets = Vec::new();
        for _ in 0..5 {
            tickets.push(sit(&client).await);
        }
        let link = SyncLink::new();
        let mut board = Board::with_seed(1);
        board.set(23, 0, 5);
        link.publish(&mut board);

        sync_once(&client, &config(tickets[2]), &link).await;
        let boards = client.board_states(0).await.unwrap();
        assert_eq!(boards[2], board.export_board());

        client
            .update_board(0, tickets[4], "zz".to_string(), false)
            .await
            .unwrap();
        sync_once(&client, &config(tickets[2]), &link).await;
        let opponents = link.opponents();
        assert_eq!(opponents.len(), 8);
        assert!(opponents.iter().all(|o| o.seat != 2));
        let garbled = opponents.iter().find(|o| o.seat == 4).unwrap();
        assert_eq!(export_grid(&garbled.grid), empty_export());
    }

    #[tokio::test]
    async fn test_worker_runs_until_shutdown() {
        let state = shared_state();
        let client = LobbyClient::new(LocalTransport::new(state.clone()));
        let (own, other) = (sit(&client).await, sit(&client).await);
        let link = SyncLink::new();
        let worker = SyncWorker::spawn(&Handle::current(), client.clone(), config(own), link.clone());
        assert!(worker.is_running());

        client.line_clear_attack(0, other, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut board = Board::with_seed(1);
        assert_eq!(link.publish(&mut board), 1);

        // The last published board reaches the server on shutdown
        board.set(23, 4, 6);
        link.publish(&mut board);
        worker.shutdown().await;
        let boards = client.board_states(0).await.unwrap();
        assert_eq!(boards[own.seat], board.export_board());
    }

    #[tokio::test]
    async fn test_zero_poll_interval_keeps_running() {
        let client = LobbyClient::new(LocalTransport::new(shared_state()));
        let (own, other) = (sit(&client).await, sit(&client).await);
        let link = SyncLink::new();
        let config = SyncConfig {
            poll_interval: Duration::ZERO,
            ..config(own)
        };
        let worker = SyncWorker::spawn(&Handle::current(), client.clone(), config, link.clone());

        client.line_clear_attack(0, other, 2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(worker.is_running());

        let mut board = Board::with_seed(1);
        assert_eq!(link.publish(&mut board), 2);
        worker.shutdown().await;
    }
}
