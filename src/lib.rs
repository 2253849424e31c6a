//! Write-path benchmark for time-series stores.
//!
//! The generation phase encodes samples into text commands ([`encoder`]),
//! writing each series' labels only once. The load phase reads that text back
//! ([`load`]) and drives it pipelined over one connection per worker,
//! deriving the ingested metric count from the replies.

pub mod config;
pub mod encoder;
pub mod generate;
pub mod load;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod point;
pub mod registry;
pub mod transport;
pub mod wire;
