//! Error types for FEN parsing and position validation.

/// Errors from parsing a FEN string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    /// The FEN does not have the four required fields.
    #[error("expected at least 4 FEN fields, found {found}")]
    FieldCount { found: usize },
    /// The placement field does not describe 8 ranks of 8 squares.
    #[error("bad piece placement near rank {rank}")]
    BadPlacement { rank: usize },
    /// An unknown character in the piece placement.
    #[error("invalid piece character '{0}'")]
    InvalidPiece(char),
    /// The side-to-move field is not `w` or `b`.
    #[error("invalid side to move \"{0}\"")]
    InvalidSideToMove(String),
    /// An unknown character in the castling field.
    #[error("invalid castling character '{0}'")]
    InvalidCastling(char),
    /// The en passant field is not `-` or a square.
    #[error("invalid en passant square \"{0}\"")]
    InvalidEnPassant(String),
    /// A move counter is not a number.
    #[error("invalid move counter \"{0}\"")]
    InvalidCounter(String),
    /// The parsed position fails structural validation.
    #[error("invalid position: {0}")]
    InvalidPosition(#[from] PositionError),
}

/// Errors from structural validation of a [`Position`](crate::Position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    /// A side does not have exactly one king.
    #[error("expected exactly 1 king per side, found {kings}")]
    KingCount { kings: u32 },
    /// A pawn stands on rank 1 or rank 8.
    #[error("pawn on a back rank")]
    PawnOnBackRank,
    /// The two sides' occupancy bitboards overlap.
    #[error("white and black occupancy overlap")]
    OverlappingSides,
    /// The side not on move is already in check.
    #[error("side not to move is in check")]
    OpponentInCheck,
}
