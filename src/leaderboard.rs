//! Time attack leaderboard
//!
//! Keeps the ten fastest completed runs, ranked ascending by time.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Maximum number of entries to keep
pub const MAX_ENTRIES: usize = 10;

/// A completed time attack run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub player: String,
    /// Elapsed time in seconds at the fixed logic rate
    pub time: f64,
    pub lines: u32,
    pub pieces: u32,
    pub score: u64,
    pub frames: u64,
}

/// Top runs, fastest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    entries: Vec<ScoreRecord>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ScoreRecord] {
        &self.entries
    }

    /// Check if a time would make the board
    pub fn qualifies(&self, time: f64) -> bool {
        if !time.is_finite() || time < 0.0 {
            return false;
        }
        if self.entries.len() < MAX_ENTRIES {
            return true;
        }
        self.entries.last().map(|e| time < e.time).unwrap_or(true)
    }

    /// Add a run to the leaderboard (if it qualifies)
    /// Returns the rank achieved (1-indexed) or None if it didn't qualify
    pub fn submit(&mut self, record: ScoreRecord) -> Option<usize> {
        if !self.qualifies(record.time) {
            return None;
        }
        // Ties keep the earlier run ahead
        let pos = self
            .entries
            .iter()
            .position(|e| record.time < e.time)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, record);
        self.entries.truncate(MAX_ENTRIES);
        Some(pos + 1)
    }

    /// Load a leaderboard from a JSON file; a missing file is an empty board
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(io::Error::other),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e),
        }
    }

    /// Save the leaderboard as JSON, creating parent directories
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(player: &str, time: f64) -> ScoreRecord {
        ScoreRecord {
            player: player.to_string(),
            time,
            lines: 40,
            pieces: 100,
            score: 5000,
            frames: (time * 60.0) as u64,
        }
    }

    #[test]
    fn test_sorted_ascending_by_time() {
        let mut board = Leaderboard::new();
        assert_eq!(board.submit(run("b", 60.0)), Some(1));
        assert_eq!(board.submit(run("a", 45.5)), Some(1));
        assert_eq!(board.submit(run("c", 90.0)), Some(3));
        let names: Vec<_> = board.entries().iter().map(|e| e.player.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_keeps_top_ten() {
        let mut board = Leaderboard::new();
        for i in 0..15 {
            board.submit(run("p", 100.0 - i as f64));
        }
        assert_eq!(board.entries().len(), MAX_ENTRIES);
        assert_eq!(board.entries()[0].time, 86.0);
        assert!(!board.qualifies(99.0));
        assert_eq!(board.submit(run("slow", 200.0)), None);
        assert_eq!(board.submit(run("fast", 1.0)), Some(1));
        assert_eq!(board.entries().len(), MAX_ENTRIES);
    }

    #[test]
    fn test_rejects_nonsense_times() {
        let board = Leaderboard::new();
        assert!(!board.qualifies(f64::NAN));
        assert!(!board.qualifies(-1.0));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("quadblox-lb-{}", rand::random::<u32>()));
        let path = dir.join("leaderboard.json");
        assert_eq!(Leaderboard::load(&path).unwrap(), Leaderboard::new());

        let mut board = Leaderboard::new();
        board.submit(run("a", 30.0));
        board.save(&path).unwrap();
        assert_eq!(Leaderboard::load(&path).unwrap(), board);
        let _ = fs::remove_dir_all(dir);
    }
}
