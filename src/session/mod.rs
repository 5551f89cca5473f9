//! Per-connection inbound handling

pub mod read_loop;

pub use read_loop::{ReadLoop, ReadLoopExit};
