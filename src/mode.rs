//! Game modes: Marathon, Time Attack, Versus

use serde::{Deserialize, Serialize};

/// Fixed logic rate used for all frame-to-time conversions
pub const FRAMES_PER_SECOND: u32 = 60;

/// Lines to clear in a time attack run
pub const TIME_ATTACK_LINES: u32 = 40;

/// Available game modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    #[default]
    Marathon, // Endless, level increases every 10 lines
    TimeAttack, // Clear a line target as fast as possible
    Versus,     // Lobby play with attacks
}

impl GameMode {
    pub fn name(&self) -> &'static str {
        match self {
            GameMode::Marathon => "Marathon",
            GameMode::TimeAttack => "Time Attack",
            GameMode::Versus => "Versus",
        }
    }

    /// Line target that ends the run, if any
    pub fn line_target(&self) -> Option<u32> {
        match self {
            GameMode::TimeAttack => Some(TIME_ATTACK_LINES),
            _ => None,
        }
    }
}

/// Convert a frame count to seconds at the fixed logic rate
pub fn frames_to_seconds(frames: u64) -> f64 {
    frames as f64 / FRAMES_PER_SECOND as f64
}

/// Format a frame count as MM:SS.mmm
pub fn format_frames(frames: u64) -> String {
    let total_millis = frames * 1000 / FRAMES_PER_SECOND as u64;
    let minutes = total_millis / 60000;
    let seconds = (total_millis % 60000) / 1000;
    let millis = total_millis % 1000;
    format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_targets() {
        assert_eq!(GameMode::TimeAttack.line_target(), Some(40));
        assert_eq!(GameMode::Marathon.line_target(), None);
        assert_eq!(GameMode::Versus.line_target(), None);
    }

    #[test]
    fn test_frame_conversion() {
        assert_eq!(frames_to_seconds(90), 1.5);
        assert_eq!(format_frames(60 * 61 + 30), "01:01.500");
    }
}
