//! Core chess types: position representation, move generation, and rules.

mod bitboard;
mod castling;
mod color;
mod error;
mod fen;
mod moves;
mod piece;
mod position;
mod square;
mod zobrist;

pub mod attacks;
pub mod movegen;
pub mod perft;

pub use bitboard::Bitboard;
pub use castling::CastleRights;
pub use color::Color;
pub use error::{FenError, PositionError};
pub use fen::{START_FEN, format_fen, parse_fen};
pub use movegen::{GenClass, MoveList, filter_legal, generate, legal_moves};
pub use moves::{Move, MoveFlag};
pub use piece::{Piece, PieceKind};
pub use position::Position;
pub use square::{File, Rank, Square};
pub use zobrist::{piece_key, side_key};
