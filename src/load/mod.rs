//! Load phase: decode command lines, batch them, and drive them pipelined
//! over one connection per worker.

pub mod batch;
pub mod decoder;
pub mod executor;

pub use batch::{Batch, BatchPool, PooledBatch};
pub use decoder::{DecodeError, LineDecoder, LoadUnit};
pub use executor::{PipelineError, PipelineExecutor};

use crate::config::{ConfigError, LoadConfig};
use crate::metrics::stats::Stats;
use crate::transport::{ConnectOptions, Connection, Engine, TransportBuilder, TransportError};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncBufRead;
use tracing::{debug, error, info};

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("worker {worker}: {source}")]
    Pipeline {
        worker: usize,
        #[source]
        source: PipelineError,
    },
    #[error("worker {worker}: {source}")]
    Transport {
        worker: usize,
        #[source]
        source: TransportError,
    },
    #[error("worker task failed: {0}")]
    Join(String),
}

#[derive(Debug, Clone)]
pub struct LoadSummary {
    pub rows: u64,
    pub metrics: u64,
    pub batches: u64,
    pub elapsed: Duration,
}

impl LoadSummary {
    pub fn metric_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.metrics as f64 / secs } else { 0.0 }
    }

    pub fn row_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.rows as f64 / secs } else { 0.0 }
    }
}

/// Runs one load: a single decode loop feeds a bounded channel drained by
/// `config.workers` workers, each owning one connection.
///
/// The first worker failure stops the run and is returned; totals reached up
/// to that point remain readable from `stats`.
pub async fn run_load<R>(
    config: &LoadConfig,
    input: R,
    stats: Arc<Stats>,
) -> Result<LoadSummary, LoadError>
where
    R: AsyncBufRead + Unpin,
{
    config.validate()?;
    let start = Instant::now();
    let pool = BatchPool::new(config.batch_size, config.channel_capacity() + config.workers);
    let (tx, rx) = flume::bounded::<PooledBatch>(config.channel_capacity());
    let abort = Arc::new(AtomicBool::new(false));
    let executor = PipelineExecutor::new(config.data_model);

    info!(
        engine = ?config.engine,
        data_model = config.data_model.as_str(),
        workers = config.workers,
        batch_size = config.batch_size,
        do_load = config.do_load,
        "starting load"
    );

    let mut workers = FuturesUnordered::new();
    for id in 0..config.workers {
        let worker = Worker {
            id,
            rx: rx.clone(),
            executor,
            stats: stats.clone(),
            abort: abort.clone(),
            engine: config.engine,
            connect: ConnectOptions::from_map(config.connect.clone()),
            do_load: config.do_load,
        };
        workers.push(tokio::task::spawn_blocking(move || worker.run()));
    }
    drop(rx);

    let feeder = feed(
        LineDecoder::new(input),
        pool,
        tx,
        config.batch_size,
        config.limit,
        abort.clone(),
    );
    tokio::pin!(feeder);

    let mut decoding = true;
    let mut failure: Option<LoadError> = None;
    loop {
        tokio::select! {
            fed = &mut feeder, if decoding => {
                decoding = false;
                match fed {
                    Ok(lines) => debug!(lines, "input exhausted"),
                    Err(e) => {
                        abort.store(true, Ordering::Relaxed);
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                }
            }
            joined = workers.next(), if !workers.is_empty() => {
                let res = match joined {
                    Some(Ok(res)) => res,
                    Some(Err(e)) => Err(LoadError::Join(e.to_string())),
                    None => Ok(()),
                };
                if let Err(e) = res {
                    abort.store(true, Ordering::Relaxed);
                    error!(error = %e, "aborting load");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
            else => break,
        }
        // Once every worker is gone there is nobody left to feed.
        if failure.is_some() && workers.is_empty() {
            break;
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }
    Ok(LoadSummary {
        rows: stats.rows(),
        metrics: stats.total(),
        batches: stats.batches(),
        elapsed: start.elapsed(),
    })
}

/// Decodes the input into pooled batches and hands full ones to the workers.
/// A full channel blocks here, which throttles decoding to the workers' pace.
async fn feed<R>(
    mut decoder: LineDecoder<R>,
    pool: Arc<BatchPool>,
    tx: flume::Sender<PooledBatch>,
    batch_size: usize,
    limit: Option<u64>,
    abort: Arc<AtomicBool>,
) -> Result<u64, LoadError>
where
    R: AsyncBufRead + Unpin,
{
    let mut batch = pool.acquire();
    let mut lines = 0u64;
    while limit.is_none_or(|max| lines < max) {
        if abort.load(Ordering::Relaxed) {
            return Ok(lines);
        }
        let Some(unit) = decoder.next().await? else {
            break;
        };
        batch.append(unit);
        lines += 1;
        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, pool.acquire());
            if tx.send_async(full).await.is_err() {
                // every worker is gone, which only happens on abort
                return Ok(lines);
            }
        }
    }
    if !batch.is_empty() {
        let _ = tx.send_async(batch).await;
    }
    Ok(lines)
}

struct Worker {
    id: usize,
    rx: flume::Receiver<PooledBatch>,
    executor: PipelineExecutor,
    stats: Arc<Stats>,
    abort: Arc<AtomicBool>,
    engine: Engine,
    connect: ConnectOptions,
    do_load: bool,
}

impl Worker {
    fn run(self) -> Result<(), LoadError> {
        let res = self.process();
        if res.is_err() {
            self.abort.store(true, Ordering::Relaxed);
        }
        res
    }

    fn process(&self) -> Result<(), LoadError> {
        let transport_err = |source| LoadError::Transport {
            worker: self.id,
            source,
        };
        let mut conn: Option<Box<dyn Connection>> = if self.do_load {
            Some(TransportBuilder::connect(self.engine, self.connect.clone()).map_err(transport_err)?)
        } else {
            None
        };
        debug!(worker = self.id, "worker started");

        let mut batches = 0u64;
        while let Ok(batch) = self.rx.recv() {
            if self.abort.load(Ordering::Relaxed) {
                break;
            }
            let t0 = Instant::now();
            let metrics = match conn.as_mut() {
                Some(c) => self
                    .executor
                    .execute(&batch, &mut **c)
                    .map_err(|source| LoadError::Pipeline {
                        worker: self.id,
                        source,
                    })?,
                None => 0,
            };
            self.stats
                .record_batch(batch.len() as u64, metrics, t0.elapsed());
            batches += 1;
        }

        if let Some(mut c) = conn {
            c.close().map_err(transport_err)?;
        }
        debug!(worker = self.id, batches, "worker finished");
        Ok(())
    }
}
