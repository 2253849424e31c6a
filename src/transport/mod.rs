//! Transport abstraction: a pipelining-capable command connection and the
//! builder that opens one per engine.

pub mod config;
#[cfg(any(test, feature = "transport-mock"))]
pub mod mock;
#[cfg(feature = "transport-redis")]
pub mod redis;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Redis,
    Mock,
}

#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    pub params: BTreeMap<String, String>,
}

impl ConnectOptions {
    pub fn from_map(params: BTreeMap<String, String>) -> Self {
        Self { params }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("send: {0}")]
    Send(String),
    #[error("flush: {0}")]
    Flush(String),
    #[error("receive: {0}")]
    Receive(String),
    #[error("disconnected")]
    Disconnected,
    #[error("other: {0}")]
    Other(String),
}

/// Shape of one reply, which is all the loader needs to account metrics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Multi-value reply holding this many elements.
    Multi(usize),
    /// Single value (integer, status, string).
    Scalar,
    /// Null reply.
    Nil,
    /// Error reply from the server.
    Error(String),
}

/// A connection that queues commands on `send` and writes them on `flush`.
///
/// Every `send` produces exactly one reply, available through `receive` once
/// the command was flushed. Replies come back in send order.
pub trait Connection: Send {
    fn send(&mut self, command: &str, args: &[&str]) -> Result<(), TransportError>;
    fn flush(&mut self) -> Result<(), TransportError>;
    fn receive(&mut self) -> Result<Reply, TransportError>;
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct TransportBuilder;

impl TransportBuilder {
    pub fn connect(
        engine: Engine,
        opts: ConnectOptions,
    ) -> Result<Box<dyn Connection>, TransportError> {
        match engine {
            Engine::Redis => {
                #[cfg(feature = "transport-redis")]
                {
                    return crate::transport::redis::connect(opts);
                }
                #[cfg(not(feature = "transport-redis"))]
                {
                    let _ = opts;
                    Err(TransportError::Connect("redis feature disabled".into()))
                }
            }
            Engine::Mock => {
                #[cfg(any(test, feature = "transport-mock"))]
                {
                    return crate::transport::mock::connect(opts);
                }
                #[cfg(not(any(test, feature = "transport-mock")))]
                {
                    let _ = opts;
                    Err(TransportError::Connect("mock feature disabled".into()))
                }
            }
        }
    }
}
