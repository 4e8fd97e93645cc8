//! Historical-move repositories.
//!
//! Both implement the async [`HistoricalMovesRepository`] used by the
//! gateway and the synchronous point-in-time [`MoveHistory`] used by the
//! backtest.
//!
//! [`HistoricalMovesRepository`]: crate::provider::HistoricalMovesRepository
//! [`MoveHistory`]: ivcrush_core::traits::MoveHistory

pub mod csv_repo;
pub mod memory_repo;

pub use csv_repo::CsvMoveRepository;
pub use memory_repo::InMemoryMoveRepository;
