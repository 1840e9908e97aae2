pub mod config;
pub mod dedup;
pub mod errors;
pub mod pacer;
pub mod server;

pub use pacer::{PacedStream, paced_stream, paced_stream_with};
