use super::batch::Batch;
use crate::config::DataModel;
use crate::transport::{Connection, Reply, TransportError};
use crate::wire;
use tracing::warn;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("empty command at position {0} of batch")]
    EmptyCommand(usize),
    #[error("send {command} failed: {source}")]
    Send {
        command: String,
        #[source]
        source: TransportError,
    },
    #[error("flush failed: {0}")]
    Flush(#[source] TransportError),
    #[error("protocol desync: sent {sent} commands, received {received} replies: {source}")]
    Desync {
        sent: usize,
        received: usize,
        #[source]
        source: TransportError,
    },
    #[error("command {index} of batch rejected: {message}")]
    Rejected { index: usize, message: String },
}

/// Sends a batch pipelined and accounts the replies.
///
/// The scalar reply weight is fixed when the executor is built, from the data
/// model the target was loaded with.
#[derive(Clone, Copy, Debug)]
pub struct PipelineExecutor {
    per_scalar: u64,
}

impl PipelineExecutor {
    pub fn new(model: DataModel) -> Self {
        Self {
            per_scalar: model.metrics_per_scalar_reply(),
        }
    }

    pub fn metrics_per_scalar_reply(&self) -> u64 {
        self.per_scalar
    }

    /// Sends every unit without waiting, flushes once, then reads back exactly
    /// one reply per command sent. Returns the number of metrics the replies
    /// acknowledge.
    ///
    /// Any failure leaves the connection in an unknown position of the reply
    /// stream, so callers must not reuse it.
    pub fn execute(&self, batch: &Batch, conn: &mut dyn Connection) -> Result<u64, PipelineError> {
        let mut sent = 0usize;
        for (i, unit) in batch.iter().enumerate() {
            let cmd = wire::split_command(unit.as_str()).ok_or(PipelineError::EmptyCommand(i))?;
            conn.send(cmd.name, &cmd.args)
                .map_err(|source| PipelineError::Send {
                    command: cmd.name.to_string(),
                    source,
                })?;
            sent += 1;
        }
        if sent == 0 {
            return Ok(0);
        }
        conn.flush().map_err(PipelineError::Flush)?;

        let mut metrics = 0u64;
        let mut rejected = None;
        for received in 0..sent {
            let reply = conn
                .receive()
                .map_err(|source| PipelineError::Desync {
                    sent,
                    received,
                    source,
                })?;
            match reply {
                Reply::Multi(n) => metrics += n as u64,
                Reply::Scalar => metrics += self.per_scalar,
                Reply::Nil => {
                    warn!(position = received, "unexpected nil reply");
                    metrics += self.per_scalar;
                }
                // Keep draining so the first rejection is reported with the
                // stream fully consumed.
                Reply::Error(message) => {
                    if rejected.is_none() {
                        rejected = Some(PipelineError::Rejected {
                            index: received,
                            message,
                        });
                    }
                }
            }
        }
        match rejected {
            Some(err) => Err(err),
            None => Ok(metrics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::decoder::LoadUnit;
    use crate::transport::mock::MockConnection;

    fn batch_of(lines: &[&str]) -> Batch {
        let mut b = Batch::default();
        for l in lines {
            b.append(LoadUnit::new(*l));
        }
        b
    }

    fn ten_adds() -> Batch {
        let lines: Vec<String> = (0..10)
            .map(|i| format!("TS.ADD cpu_usage_user{{{}}} 1451606400 {} LABELS measurement cpu fieldname usage_user", i, i))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        batch_of(&refs)
    }

    #[test]
    fn reads_exactly_one_reply_per_command() {
        let exec = PipelineExecutor::new(DataModel::RedisTimeSeries);
        let mut conn = MockConnection::new();
        let metrics = exec.execute(&ten_adds(), &mut conn).unwrap();
        assert_eq!(metrics, 10);
        assert_eq!(conn.sent().len(), 10);
        assert_eq!(conn.flushes(), 1);
        assert_eq!(conn.unread(), 0);
    }

    #[test]
    fn missing_reply_is_desync() {
        let exec = PipelineExecutor::new(DataModel::RedisTimeSeries);
        let mut conn = MockConnection::new().drop_replies(1);
        let err = exec.execute(&ten_adds(), &mut conn).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Desync { sent: 10, received: 9, .. }
        ));
    }

    #[test]
    fn arguments_pass_through_verbatim() {
        let exec = PipelineExecutor::new(DataModel::RedisTimeSeries);
        let mut conn = MockConnection::new();
        exec.execute(
            &batch_of(&["TS.MADD cpu_a{-5} 100 2.5 cpu_b{-5} 100 3"]),
            &mut conn,
        )
        .unwrap();
        let (name, args) = &conn.sent()[0];
        assert_eq!(name, "TS.MADD");
        assert_eq!(args, &["cpu_a{-5}", "100", "2.5", "cpu_b{-5}", "100", "3"]);
    }

    #[test]
    fn multi_reply_counts_its_length() {
        let exec = PipelineExecutor::new(DataModel::RedisTimeSeries);
        let mut conn = MockConnection::new();
        let metrics = exec
            .execute(
                &batch_of(&["TS.MADD a{1} 1 1 b{1} 1 2 c{1} 1 3"]),
                &mut conn,
            )
            .unwrap();
        assert_eq!(metrics, 3);
    }

    #[test]
    fn scalar_weight_follows_data_model() {
        let batch = batch_of(&["XADD s * a 1", "XADD s * a 2"]);
        let single = PipelineExecutor::new(DataModel::RedisZsetMetric);
        assert_eq!(single.execute(&batch, &mut MockConnection::new()).unwrap(), 2);
        let packed = PipelineExecutor::new(DataModel::RedisStream);
        assert_eq!(packed.metrics_per_scalar_reply(), 10);
        assert_eq!(packed.execute(&batch, &mut MockConnection::new()).unwrap(), 20);
    }

    #[test]
    fn nil_reply_counts_as_scalar() {
        let exec = PipelineExecutor::new(DataModel::RedisTimeSeries);
        let mut conn = MockConnection::new().with_replies([Reply::Nil, Reply::Multi(2)]);
        let metrics = exec
            .execute(&batch_of(&["TS.ADD a{1} 1 1", "TS.MADD a{1} 2 2 a{1} 3 3"]), &mut conn)
            .unwrap();
        assert_eq!(metrics, 3);
    }

    #[test]
    fn rejected_command_fails_after_draining() {
        let exec = PipelineExecutor::new(DataModel::RedisTimeSeries);
        let mut conn = MockConnection::new().with_replies([
            Reply::Scalar,
            Reply::Error("ERR TSDB: invalid value".into()),
            Reply::Scalar,
        ]);
        let err = exec
            .execute(&batch_of(&["TS.ADD a{1} 1 1", "TS.ADD a{1} 1 x", "TS.ADD a{1} 2 2"]), &mut conn)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Rejected { index: 1, .. }));
        assert_eq!(conn.unread(), 0);
    }

    #[test]
    fn send_and_flush_failures_are_fatal() {
        let exec = PipelineExecutor::new(DataModel::RedisTimeSeries);
        let err = exec
            .execute(&ten_adds(), &mut MockConnection::new().fail_send())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Send { .. }));
        let err = exec
            .execute(&ten_adds(), &mut MockConnection::new().fail_flush())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Flush(_)));
    }

    #[test]
    fn blank_unit_is_rejected_before_sending() {
        let exec = PipelineExecutor::new(DataModel::RedisTimeSeries);
        let mut conn = MockConnection::new();
        let err = exec
            .execute(&batch_of(&["TS.ADD a{1} 1 1", "  "]), &mut conn)
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyCommand(1)));
        assert_eq!(conn.flushes(), 0);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let exec = PipelineExecutor::new(DataModel::RedisTimeSeries);
        let mut conn = MockConnection::new();
        assert_eq!(exec.execute(&Batch::default(), &mut conn).unwrap(), 0);
        assert_eq!(conn.flushes(), 0);
    }
}
