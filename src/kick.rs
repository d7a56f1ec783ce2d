//! Wall kick offsets
//!
//! A simplified kick table rather than full SRS data: after a rotation the
//! piece is tried in place, then shifted one column right, then one column
//! left. The I piece gets one extra candidate two columns left.

use crate::tetromino::TetrominoType;

const STANDARD_KICKS: [i32; 3] = [0, 1, -1];
const I_KICKS: [i32; 4] = [0, 1, -1, -2];

/// Column offsets to try, in order, when rotating a piece
pub fn wall_kicks(piece_type: TetrominoType) -> &'static [i32] {
    match piece_type {
        TetrominoType::I => &I_KICKS,
        _ => &STANDARD_KICKS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_kick_is_identity() {
        for piece in TetrominoType::all() {
            assert_eq!(wall_kicks(piece)[0], 0);
        }
    }

    #[test]
    fn test_only_i_piece_kicks_two_left() {
        for piece in TetrominoType::all() {
            let has_far_kick = wall_kicks(piece).contains(&-2);
            assert_eq!(has_far_kick, piece == TetrominoType::I);
        }
    }
}
