//! In-memory connection for tests and dry runs (feature `transport-mock`).
//!
//! Replies are synthesised from the command shape unless scripted: a
//! `TS.MADD` with n triples answers with a multi reply of n, everything else
//! with a scalar. Faults can be injected to exercise the loader's error paths.
use crate::transport::{ConnectOptions, Connection, Reply, TransportError};
use crate::wire;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct MockConnection {
    sent: Vec<(String, Vec<String>)>,
    unflushed: Vec<Reply>,
    ready: VecDeque<Reply>,
    scripted: VecDeque<Reply>,
    drop_replies: usize,
    fail_send: bool,
    fail_flush: bool,
    flushes: usize,
}

/// Recognised options: `drop_replies=<n>`, `fail_send=true`, `fail_flush=true`.
pub fn connect(opts: ConnectOptions) -> Result<Box<dyn Connection>, TransportError> {
    let flag = |name: &str| opts.params.get(name).map(|v| v == "true").unwrap_or(false);
    let drop_replies = match opts.params.get("drop_replies") {
        Some(v) => v
            .parse()
            .map_err(|_| TransportError::Connect(format!("bad drop_replies: {}", v)))?,
        None => 0,
    };
    let mut conn = MockConnection::new().drop_replies(drop_replies);
    conn.fail_send = flag("fail_send");
    conn.fail_flush = flag("fail_flush");
    Ok(Box::new(conn))
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues replies used, in order, before falling back to synthesised ones.
    pub fn with_replies(mut self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.scripted.extend(replies);
        self
    }

    /// Loses the last `n` replies of the next flush.
    pub fn drop_replies(mut self, n: usize) -> Self {
        self.drop_replies = n;
        self
    }

    pub fn fail_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    pub fn fail_flush(mut self) -> Self {
        self.fail_flush = true;
        self
    }

    pub fn sent(&self) -> &[(String, Vec<String>)] {
        &self.sent
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Flushed replies nobody has read yet.
    pub fn unread(&self) -> usize {
        self.ready.len()
    }
}

fn synthesise(command: &str, args: &[&str]) -> Reply {
    if command.eq_ignore_ascii_case(wire::MADD) {
        Reply::Multi(args.len() / 3)
    } else {
        Reply::Scalar
    }
}

impl Connection for MockConnection {
    fn send(&mut self, command: &str, args: &[&str]) -> Result<(), TransportError> {
        if self.fail_send {
            return Err(TransportError::Send("injected send failure".into()));
        }
        self.sent.push((
            command.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
        ));
        let reply = self
            .scripted
            .pop_front()
            .unwrap_or_else(|| synthesise(command, args));
        self.unflushed.push(reply);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        if self.fail_flush {
            return Err(TransportError::Flush("injected flush failure".into()));
        }
        self.flushes += 1;
        let keep = self.unflushed.len().saturating_sub(self.drop_replies);
        self.drop_replies -= self.unflushed.len() - keep;
        self.ready.extend(self.unflushed.drain(..).take(keep));
        Ok(())
    }

    fn receive(&mut self) -> Result<Reply, TransportError> {
        self.ready.pop_front().ok_or(TransportError::Disconnected)
    }
}
