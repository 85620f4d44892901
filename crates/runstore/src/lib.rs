//! Run persistence: run directories with append-only JSONL event logs,
//! atomic checkpoints for resume, and the cross-run index.

pub mod checkpoint;
pub mod index;
pub mod repository;

pub use checkpoint::RunCheckpoint;
pub use index::RunIndexEntry;
pub use repository::RunRepository;
