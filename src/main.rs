use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tsdb_ingest_bench::config::{ConfigError, LoadConfig};
use tsdb_ingest_bench::encoder::PointEncoder;
use tsdb_ingest_bench::generate::encode_stream;
use tsdb_ingest_bench::load::run_load;
use tsdb_ingest_bench::logging;
use tsdb_ingest_bench::metrics::stats::Stats;
use tsdb_ingest_bench::output::OutputWriter;
use tsdb_ingest_bench::registry::LabelRegistry;
use tsdb_ingest_bench::transport::config::{parse_connect_kv, parse_engine};

#[derive(Parser)]
#[command(name = "tsdb-ingest-bench")]
#[command(about = "Encode time-series samples into write commands and load them pipelined")]
struct Cli {
    /// Run ID for tagging logs (random when empty)
    #[arg(long, default_value = "")]
    run_id: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode JSON-lines samples into command text
    Generate {
        /// Sample file (stdin if omitted)
        #[arg(long)]
        input: Option<String>,

        /// Command text destination (stdout if omitted)
        #[arg(long)]
        output: Option<String>,
    },
    /// Load command text into the target store
    Load {
        /// YAML file with load settings; flags below override it
        #[arg(long)]
        config: Option<String>,

        /// Engine (redis/mock)
        #[arg(long)]
        engine: Option<String>,

        /// Connect options as key=value (e.g. url=redis://127.0.0.1:6379)
        #[arg(long)]
        connect: Vec<String>,

        /// Data model of the loaded file (redistimeseries, rediszsetmetric, rediszsetdevice, redisstream)
        #[arg(long)]
        data_model: Option<String>,

        /// Number of workers, one connection each
        #[arg(long)]
        workers: Option<usize>,

        /// Lines per pipelined batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Stop after this many lines
        #[arg(long)]
        limit: Option<u64>,

        /// Decode and batch only, never connect
        #[arg(long)]
        no_load: bool,

        /// Snapshot interval in seconds
        #[arg(long)]
        snapshot_interval: Option<u64>,

        /// Command text file (stdin if omitted)
        #[arg(long)]
        file: Option<String>,

        /// Optional CSV output file path for snapshots (stdout if omitted)
        #[arg(long)]
        csv: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level)?;

    let run_id = if cli.run_id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        cli.run_id.clone()
    };
    info!(%run_id, "tsdb-ingest-bench starting");

    match cli.command {
        Commands::Generate { input, output } => generate(input, output).await,
        Commands::Load {
            config,
            engine,
            connect,
            data_model,
            workers,
            batch_size,
            limit,
            no_load,
            snapshot_interval,
            file,
            csv,
        } => {
            let mut cfg = match &config {
                Some(path) => LoadConfig::from_yaml_file(path)?,
                None => LoadConfig::default(),
            };
            if let Some(engine) = engine {
                cfg.engine = parse_engine(&engine).ok_or(ConfigError::UnknownEngine(engine))?;
            }
            cfg.connect.extend(parse_connect_kv(&connect).params);
            if let Some(model) = data_model {
                cfg.data_model = model.parse()?;
            }
            if let Some(n) = workers {
                cfg.workers = n;
            }
            if let Some(n) = batch_size {
                cfg.batch_size = n;
            }
            if limit.is_some() {
                cfg.limit = limit;
            }
            if no_load {
                cfg.do_load = false;
            }
            if let Some(secs) = snapshot_interval {
                cfg.snapshot_interval_secs = secs;
            }
            cfg.validate()?;
            load(cfg, file, csv).await
        }
    }
}

async fn generate(input: Option<String>, output: Option<String>) -> Result<()> {
    let summary = tokio::task::spawn_blocking(move || -> Result<_> {
        let reader: Box<dyn BufRead> = match &input {
            Some(path) => Box::new(std::io::BufReader::new(
                std::fs::File::open(path).with_context(|| format!("open {}", path))?,
            )),
            None => Box::new(std::io::stdin().lock()),
        };
        let writer: Box<dyn Write> = match &output {
            Some(path) => Box::new(BufWriter::new(
                std::fs::File::create(path).with_context(|| format!("create {}", path))?,
            )),
            None => Box::new(BufWriter::new(std::io::stdout().lock())),
        };
        let encoder = PointEncoder::new(Arc::new(LabelRegistry::new()));
        Ok(encode_stream(&encoder, reader, writer)?)
    })
    .await??;
    info!(samples = summary.samples, series = summary.series, "generation complete");
    Ok(())
}

async fn load(cfg: LoadConfig, file: Option<String>, csv: Option<String>) -> Result<()> {
    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &file {
        Some(path) => Box::new(tokio::io::BufReader::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("open {}", path))?,
        )),
        None => Box::new(tokio::io::BufReader::new(tokio::io::stdin())),
    };

    let stats = Arc::new(Stats::new());
    let mut output = match csv {
        Some(path) => OutputWriter::new_csv(path).await?,
        None => OutputWriter::new_stdout(),
    };

    // Periodic snapshots until told to stop, then one final snapshot.
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let reporter = {
        let stats = stats.clone();
        let period = Duration::from_secs(cfg.snapshot_interval_secs);
        tokio::spawn(async move {
            let mut t = tokio::time::interval(period);
            t.tick().await;
            loop {
                tokio::select! {
                    _ = t.tick() => {
                        if let Err(e) = output.write_snapshot(&stats.snapshot()).await {
                            warn!(error = %e, "snapshot write failed");
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
            if let Err(e) = output.write_snapshot(&stats.snapshot()).await {
                warn!(error = %e, "final snapshot write failed");
            }
        })
    };

    let result = tokio::select! {
        res = run_load(&cfg, input, stats.clone()) => res.map_err(anyhow::Error::from),
        _ = signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    };

    let _ = stop_tx.send(());
    let _ = reporter.await;

    match result {
        Ok(summary) => {
            println!("\nSummary:");
            println!("  Rows loaded: {}", summary.rows);
            println!("  Metrics loaded: {}", summary.metrics);
            println!("  Batches: {}", summary.batches);
            println!("  Duration: {:.3}s", summary.elapsed.as_secs_f64());
            println!(
                "  Mean rate: {:.2} metrics/sec, {:.2} rows/sec",
                summary.metric_rate(),
                summary.row_rate()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "load aborted after {} metrics, {} rows in {:.3}s",
                stats.total(),
                stats.rows(),
                stats.elapsed().as_secs_f64()
            );
            Err(e)
        }
    }
}
