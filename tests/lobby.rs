use quadblox::board::{Board, TOTAL_HEIGHT};
use quadblox::controller::{Controller, ControllerConfig};
use quadblox::input::FrameInput;
use quadblox::leaderboard::ScoreRecord;
use quadblox::piece::Piece;
use quadblox::server::LobbyServer;
use quadblox::session::{SEAT_TIMEOUT, SEATS_PER_GAME, ServerState, SessionManager};
use quadblox::sync::{SyncConfig, SyncLink, SyncWorker, sync_once};
use quadblox::tetromino::{Rotation, TetrominoType};
use quadblox::transport::{LobbyClient, LocalTransport, TcpTransport};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

fn local_lobby() -> LobbyClient<LocalTransport> {
    let state = ServerState::new(SessionManager::new(1, SEAT_TIMEOUT));
    LobbyClient::new(LocalTransport::new(Arc::new(Mutex::new(state))))
}

/// Board that just cleared two rows, leaving one line queued to send
fn board_with_double() -> Board {
    let mut board = Board::with_seed(9);
    for row in [TOTAL_HEIGHT - 2, TOTAL_HEIGHT - 1] {
        for col in 0..9 {
            board.set(row as i32, col, 2);
        }
    }
    let mut piece = Piece::new(TetrominoType::I);
    piece.rotation = Rotation::East;
    piece.col = 7;
    piece.row = TOTAL_HEIGHT as i32 - 4;
    let placement = board.place(&piece);
    assert_eq!(placement.cleared.len(), 2);
    assert_eq!(board.outgoing_attack_queue(), 1);
    board
}

#[tokio::test]
async fn two_clients_exchange_line_clear_attack() {
    let alice = local_lobby();
    let bob = alice.clone();

    let alice_seat = alice.seat(0).await.unwrap().unwrap();
    let bob_seat = bob.seat(0).await.unwrap().unwrap();
    assert_eq!((alice_seat.seat, bob_seat.seat), (0, 1));

    let counters = alice.line_clear_attack(0, alice_seat, 2).await.unwrap();
    assert_eq!(counters.len(), SEATS_PER_GAME);
    assert_eq!(counters[0], 0);
    assert!(counters[1..].iter().all(|&waiting| waiting == 2));

    assert_eq!(bob.get_attacks(0, bob_seat).await.unwrap(), 2);
    assert_eq!(bob.get_attacks(0, bob_seat).await.unwrap(), 0);
    assert_eq!(alice.get_attacks(0, alice_seat).await.unwrap(), 0);
}

#[tokio::test]
async fn cleared_lines_arrive_as_garbage() {
    let client = local_lobby();
    let sender_link = SyncLink::new();
    let receiver_link = SyncLink::new();
    let sender_seat = client.seat(0).await.unwrap().unwrap();
    let receiver_seat = client.seat(0).await.unwrap().unwrap();
    let config = |ticket| SyncConfig {
        game_id: 0,
        ticket,
        poll_interval: Duration::from_millis(10),
    };

    let mut sender = board_with_double();
    sender_link.publish(&mut sender);
    assert_eq!(sender.outgoing_attack_queue(), 0);
    sync_once(&client, &config(sender_seat), &sender_link).await;

    let mut receiver = Controller::new(ControllerConfig {
        seed: 3,
        ..ControllerConfig::default()
    });
    sync_once(&client, &config(receiver_seat), &receiver_link).await;
    receiver_link.publish(&mut receiver.board);
    assert_eq!(receiver.board.attacks_waiting(), 1);

    let report = receiver.update(&FrameInput::none());
    assert_eq!(report.attacks_applied, 1);
    let bottom = receiver.board.grid()[TOTAL_HEIGHT - 1];
    assert_eq!(bottom.iter().filter(|&&c| c != 0).count(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn versus_over_tcp() {
    let state = ServerState::new(SessionManager::new(2, SEAT_TIMEOUT));
    let server = LobbyServer::bind("127.0.0.1:0", state).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (stop_tx, stop_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.run(stop_rx));

    let client = LobbyClient::new(TcpTransport::new(addr, Duration::from_secs(2)));
    let lobbies = client.list_lobbies().await.unwrap();
    assert_eq!(lobbies.len(), 2);
    assert!(lobbies.iter().all(|l| l.occupied == 0));

    let attacker_seat = client.seat(1).await.unwrap().unwrap();
    let victim_seat = client.seat(1).await.unwrap().unwrap();

    let attacker_link = SyncLink::new();
    let victim_link = SyncLink::new();
    let poll = Duration::from_millis(20);
    let attacker = SyncWorker::spawn(
        &Handle::current(),
        client.clone(),
        SyncConfig {
            game_id: 1,
            ticket: attacker_seat,
            poll_interval: poll,
        },
        attacker_link.clone(),
    );
    let victim = SyncWorker::spawn(
        &Handle::current(),
        client.clone(),
        SyncConfig {
            game_id: 1,
            ticket: victim_seat,
            poll_interval: poll,
        },
        victim_link.clone(),
    );

    let mut attacking_board = board_with_double();
    attacker_link.publish(&mut attacking_board);

    let mut victim_board = Board::with_seed(4);
    for _ in 0..100 {
        tokio::time::sleep(poll).await;
        victim_link.publish(&mut victim_board);
        if victim_board.attacks_waiting() > 0 {
            break;
        }
    }
    assert_eq!(victim_board.attacks_waiting(), 1);

    // The victim sees the attacker's board among its opponents
    let mut seen = None;
    for _ in 0..100 {
        seen = victim_link
            .opponents()
            .into_iter()
            .find(|o| o.seat == attacker_seat.seat);
        if seen.as_ref().is_some_and(|o| &o.grid == attacking_board.grid()) {
            break;
        }
        tokio::time::sleep(poll).await;
    }
    assert_eq!(&seen.unwrap().grid, attacking_board.grid());

    attacker.shutdown().await;
    victim.shutdown().await;

    // Both seats are still fresh, so the listing counts them
    let lobbies = client.list_lobbies().await.unwrap();
    assert_eq!(lobbies[1].occupied, 2);

    let record = ScoreRecord {
        player: "grace".to_string(),
        time: 58.25,
        lines: 40,
        pieces: 98,
        score: 7200,
        frames: 3495,
    };
    let entries = client.submit_score(record.clone()).await.unwrap();
    assert_eq!(entries, vec![record.clone()]);
    assert_eq!(client.leaderboard().await.unwrap(), vec![record]);

    stop_tx.send(true).unwrap();
    server_task.await.unwrap().unwrap();
}
