//! Redis adapter (feature `transport-redis`).
//!
//! Commands are packed into one buffer on `send` and written in a single
//! call on `flush`; replies are then read one by one off the same socket.
use crate::transport::{ConnectOptions, Connection, Reply, TransportError};
use ::redis::Value;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 6379;

pub struct RedisConnection {
    conn: ::redis::Connection,
    pending: Vec<u8>,
}

/// Opens a connection from `url`, or from `host`/`port` when no url is given.
pub fn connect(opts: ConnectOptions) -> Result<Box<dyn Connection>, TransportError> {
    let url = match opts.params.get("url") {
        Some(url) => url.clone(),
        None => {
            let host = opts.params.get("host").map(String::as_str).unwrap_or(DEFAULT_HOST);
            let port: u16 = opts
                .params
                .get("port")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT);
            format!("redis://{}:{}", host, port)
        }
    };
    let client = ::redis::Client::open(url.as_str())
        .map_err(|e| TransportError::Connect(format!("{}: {}", url, e)))?;
    let conn = client
        .get_connection()
        .map_err(|e| TransportError::Connect(format!("{}: {}", url, e)))?;
    tracing::debug!(%url, "redis connection established");
    Ok(Box::new(RedisConnection {
        conn,
        pending: Vec::with_capacity(64 * 1024),
    }))
}

impl Connection for RedisConnection {
    fn send(&mut self, command: &str, args: &[&str]) -> Result<(), TransportError> {
        let mut cmd = ::redis::cmd(command);
        for arg in args {
            cmd.arg(*arg);
        }
        self.pending.extend_from_slice(&cmd.get_packed_command());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.conn
            .send_packed_command(&self.pending)
            .map_err(|e| TransportError::Flush(e.to_string()))?;
        self.pending.clear();
        Ok(())
    }

    fn receive(&mut self) -> Result<Reply, TransportError> {
        let value = self
            .conn
            .recv_response()
            .map_err(|e| TransportError::Receive(e.to_string()))?;
        Ok(reply_shape(value))
    }
}

fn reply_shape(value: Value) -> Reply {
    match value {
        Value::Nil => Reply::Nil,
        Value::Array(items) => Reply::Multi(items.len()),
        Value::ServerError(err) => Reply::Error(format!("{:?}", err)),
        _ => Reply::Scalar,
    }
}
