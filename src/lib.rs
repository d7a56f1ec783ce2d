//! QuadBlox - falling blocks with lobby versus play
//!
//! The engine (`board`, `piece`, `controller`) is synchronous and driven one
//! frame at a time. The lobby side (`session`, `server`, `transport`, `sync`)
//! runs on tokio.

pub mod bag;
pub mod board;
pub mod controller;
pub mod error;
pub mod input;
pub mod kick;
pub mod leaderboard;
pub mod mode;
pub mod piece;
pub mod protocol;
pub mod score;
pub mod server;
pub mod session;
pub mod settings;
pub mod sync;
pub mod tetromino;
pub mod transport;
