//! Per-frame game controller
//!
//! Drives one local board, one active piece, the next piece and an optional
//! held piece. Each call to `update` consumes one frame of input and resolves
//! it in a fixed order: waiting attacks, hold, horizontal movement, rotation,
//! vertical movement, forced lock, death check.

use crate::bag::Bag;
use crate::board::{Board, Placement};
use crate::input::{DasCounter, DasTiming, FrameInput, Key};
use crate::leaderboard::ScoreRecord;
use crate::mode::{frames_to_seconds, GameMode};
use crate::piece::Piece;
use crate::tetromino::TetrominoType;
use tracing::{debug, info};

/// Number of queued pieces exposed for the preview panel
pub const PREVIEW_LEN: usize = 5;

/// Where the active piece is in its life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A piece is falling under player control
    Falling,
    /// A placement has been triggered this frame
    Locking,
    /// The board is dead; terminal
    GameOver,
}

/// Controller construction options
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub mode: GameMode,
    pub das: DasTiming,
    /// Seed for the piece bag and garbage holes
    pub seed: u64,
    /// Name submitted with time attack runs
    pub player: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::Marathon,
            das: DasTiming::default(),
            seed: rand::random(),
            player: "player".to_string(),
        }
    }
}

/// What happened during one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Set when a piece locked this frame
    pub placement: Option<Placement>,
    /// Garbage lines applied at the start of the frame
    pub attacks_applied: u32,
    /// Rows skipped by a hard drop this frame
    pub hard_drop_rows: u32,
    /// Set exactly once, on the frame a time attack run completes
    pub run_complete: Option<ScoreRecord>,
}

/// The game controller
pub struct Controller {
    /// The local board
    pub board: Board,
    /// Current falling piece
    active: Piece,
    /// Piece that spawns after the active one locks
    next: TetrominoType,
    /// Held piece
    held: Option<TetrominoType>,
    bag: Bag,
    mode: GameMode,
    das: DasTiming,
    left: DasCounter,
    right: DasCounter,
    down: DasCounter,
    /// Frames since the last gravity step
    gravity_frames: u32,
    phase: Phase,
    player: String,
    /// Completed time attack run
    run_record: Option<ScoreRecord>,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        let mut bag = Bag::with_seed(config.seed);
        let first = bag.next();
        let next = bag.next();

        let mut controller = Self {
            board: Board::with_seed(config.seed.rotate_left(32)),
            active: Piece::new(first),
            next,
            held: None,
            bag,
            mode: config.mode,
            das: config.das,
            left: DasCounter::default(),
            right: DasCounter::default(),
            down: DasCounter::default(),
            gravity_frames: 0,
            phase: Phase::Falling,
            player: config.player,
            run_record: None,
        };
        if controller.active.collides(&controller.board) {
            controller.game_over();
        }
        controller
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == Phase::GameOver
    }

    /// The falling piece, None once the game is over
    pub fn active(&self) -> Option<&Piece> {
        (self.phase != Phase::GameOver).then_some(&self.active)
    }

    /// Where the active piece would land
    pub fn ghost(&self) -> Option<Piece> {
        self.active().map(|piece| piece.ghost(&self.board))
    }

    pub fn held(&self) -> Option<TetrominoType> {
        self.held
    }

    pub fn next(&self) -> TetrominoType {
        self.next
    }

    /// The next piece followed by the rest of the queue
    pub fn preview(&self) -> Vec<TetrominoType> {
        let mut pieces = vec![self.next];
        pieces.extend(self.bag.preview(PREVIEW_LEN - 1));
        pieces
    }

    /// Frames elapsed on the board clock (frozen once the board dies)
    pub fn elapsed_frames(&self) -> u64 {
        self.board.frame()
    }

    /// The completed time attack run, if any
    pub fn run_record(&self) -> Option<&ScoreRecord> {
        self.run_record.as_ref()
    }

    /// Lines still to clear in time attack
    pub fn lines_remaining(&self) -> Option<u32> {
        self.mode
            .line_target()
            .map(|target| target.saturating_sub(self.board.score.lines))
    }

    /// Advance the game by one frame
    pub fn update(&mut self, input: &FrameInput) -> FrameReport {
        let mut report = FrameReport::default();
        if self.phase == Phase::GameOver {
            return report;
        }

        self.board.tick();

        report.attacks_applied = self.board.apply_waiting_attacks();
        if report.attacks_applied > 0 {
            debug!("Applied {} garbage lines", report.attacks_applied);
        }
        if self.board.is_dead() {
            self.game_over();
            return report;
        }

        if input.pressed(Key::Hold) {
            self.hold();
        }

        self.move_horizontal(input);

        if input.pressed(Key::Rotate) {
            self.active.rotate(&self.board);
        }

        let mut lock = self.move_vertical(input, &mut report);

        // A piece overlapping the stack (e.g. after garbage rose into it)
        // would otherwise be stuck
        if !lock && self.active.collides(&self.board) {
            lock = true;
        }

        if lock {
            self.phase = Phase::Locking;
            self.lock_piece(&mut report);
        }

        report
    }

    fn move_horizontal(&mut self, input: &FrameInput) {
        let left_held = input.held(Key::Left);
        let right_held = input.held(Key::Right);

        if left_held && right_held {
            self.left.reset();
            self.right.reset();
            return;
        }

        if input.pressed(Key::Left) {
            self.active.move_left(&self.board);
        }
        if input.pressed(Key::Right) {
            self.active.move_right(&self.board);
        }
        if self.left.update(left_held, self.das) {
            self.active.move_left(&self.board);
        }
        if self.right.update(right_held, self.das) {
            self.active.move_right(&self.board);
        }
    }

    /// Gravity, hard drop and soft drop; returns true if the piece must lock
    fn move_vertical(&mut self, input: &FrameInput, report: &mut FrameReport) -> bool {
        self.gravity_frames += 1;
        if self.gravity_frames >= self.board.fall_frames() {
            self.gravity_frames = 0;
            if !self.active.move_down(&self.board) {
                return true;
            }
        }

        if input.pressed(Key::HardDrop) {
            let rows = self.active.hard_drop(&self.board);
            self.board.score.add_hard_drop(rows);
            report.hard_drop_rows = rows;
            return true;
        }

        if self.down.update(input.held(Key::Down), self.das) {
            if self.active.move_down(&self.board) {
                self.board.score.add_soft_drop(1);
            } else {
                return true;
            }
        }

        false
    }

    /// Swap the active piece with the hold slot
    ///
    /// The first hold promotes the next piece; later holds exchange active
    /// and held without drawing. A swap whose incoming piece would collide
    /// at the spawn position is rejected.
    fn hold(&mut self) {
        let incoming = self.held.unwrap_or(self.next);
        let candidate = Piece::new(incoming);
        if candidate.collides(&self.board) {
            debug!("Rejected hold: {} cannot spawn", incoming.name());
            return;
        }

        if self.held.is_none() {
            self.next = self.bag.next();
        }
        self.held = Some(self.active.piece_type);
        self.active = candidate;
        self.gravity_frames = 0;
    }

    fn lock_piece(&mut self, report: &mut FrameReport) {
        let placement = self.board.place(&self.active);
        if !placement.cleared.is_empty() {
            debug!(
                "Cleared {} lines, total {}",
                placement.cleared.len(),
                self.board.score.lines
            );
        }
        report.placement = Some(placement);

        if let Some(target) = self.mode.line_target() {
            if !self.board.is_dead() && self.board.score.lines >= target {
                self.board.kill();
                report.run_complete = Some(self.finish_run());
            }
        }

        if self.board.is_dead() {
            self.game_over();
            return;
        }
        self.spawn_next();
    }

    fn spawn_next(&mut self) {
        self.active = Piece::new(self.next);
        self.next = self.bag.next();
        self.gravity_frames = 0;
        self.down.reset();

        if self.active.collides(&self.board) {
            self.board.kill();
            self.game_over();
        } else {
            self.phase = Phase::Falling;
        }
    }

    fn finish_run(&mut self) -> ScoreRecord {
        let frames = self.board.frame();
        let record = ScoreRecord {
            player: self.player.clone(),
            time: frames_to_seconds(frames),
            lines: self.board.score.lines,
            pieces: self.board.blocks_placed(),
            score: self.board.score.points,
            frames,
        };
        info!(
            "Time attack complete: {} lines in {:.3}s ({} frames)",
            record.lines, record.time, record.frames
        );
        self.run_record = Some(record.clone());
        record
    }

    fn game_over(&mut self) {
        if self.phase != Phase::GameOver {
            info!(
                "Game over: score {} lines {} pieces {}",
                self.board.score.points,
                self.board.score.lines,
                self.board.blocks_placed()
            );
        }
        self.phase = Phase::GameOver;
    }
}
