//! Error types for the QuadBlox engine and lobby protocol

use thiserror::Error;

/// Result type alias for network operations
pub type Result<T> = std::result::Result<T, NetError>;

/// Reasons an exported board string cannot be imported
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardImportError {
    /// String does not hold exactly one digit per cell
    #[error("expected {expected} cells, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    /// Character is not a hex digit
    #[error("invalid cell digit {digit:?} at index {index}")]
    InvalidDigit { index: usize, digit: char },

    /// Hex digit outside the palette
    #[error("color {color} at index {index} is outside the palette")]
    ColorOutOfRange { index: usize, color: u8 },
}

/// Errors raised by the server-side session manager
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No lobby with this id
    #[error("unknown game {0}")]
    UnknownGame(u32),

    /// Seat index outside the lobby
    #[error("seat {seat} out of range for game {game_id}")]
    SeatOutOfRange { game_id: u32, seat: usize },

    /// Token does not match the seat's current occupant
    #[error("seat {seat} in game {game_id} is not held by this client")]
    SeatNotHeld { game_id: u32, seat: usize },
}

/// Errors that can occur talking to the lobby server
#[derive(Debug, Error)]
pub enum NetError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request did not finish in time
    #[error("timeout: {0}")]
    Timeout(&'static str),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Frame length exceeded the limit
    #[error("message of {0} bytes exceeds limit")]
    MessageTooLarge(usize),

    /// Server answered with an error
    #[error("server error: {0}")]
    Server(String),

    /// Server answered with the wrong kind of response
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}
