use crate::metrics::stats::StatsSnapshot;
use anyhow::Result;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Destination of periodic load snapshots.
pub enum OutputWriter {
    Csv(BufWriter<tokio::fs::File>),
    Stdout,
}

impl OutputWriter {
    pub async fn new_csv(path: String) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = File::create(&path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(StatsSnapshot::csv_header().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        tracing::info!(%path, "writing snapshots as csv");
        Ok(Self::Csv(writer))
    }

    pub fn new_stdout() -> Self {
        Self::Stdout
    }

    pub async fn write_snapshot(&mut self, snapshot: &StatsSnapshot) -> Result<()> {
        match self {
            Self::Csv(writer) => {
                writer.write_all(snapshot.to_csv_row().as_bytes()).await?;
                writer.write_all(b"\n").await?;
                // Flush so external tail/readers see progress promptly
                writer.flush().await?;
            }
            Self::Stdout => {
                println!(
                    "[{}] metrics {} ({:.2}/sec, {:.2}/sec overall), rows {} ({:.2}/sec), batch p99 {:.3}ms",
                    snapshot.timestamp,
                    snapshot.metric_count,
                    snapshot.interval_metric_rate(),
                    snapshot.total_metric_rate(),
                    snapshot.row_count,
                    snapshot.interval_row_rate(),
                    snapshot.batch_ns_p99 as f64 / 1e6
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::stats::Stats;
    use std::time::Duration;

    #[tokio::test]
    async fn csv_gets_header_and_rows() {
        let path = std::env::temp_dir()
            .join(format!("ingest-bench-{}", uuid::Uuid::new_v4()))
            .join("snap.csv");
        let path_str = path.display().to_string();
        let stats = Stats::new();
        stats.record_batch(4, 4, Duration::from_millis(1));
        {
            let mut out = OutputWriter::new_csv(path_str.clone()).await.unwrap();
            out.write_snapshot(&stats.snapshot()).await.unwrap();
        }
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(StatsSnapshot::csv_header()));
        assert!(lines.next().unwrap().contains(",4,4,1,"));
        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}
