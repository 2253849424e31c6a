//! Generation phase: turn logical samples (JSON lines) into command text.

use crate::encoder::PointEncoder;
use crate::point::Sample;
use std::io::{BufRead, Write};
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("read input: {0}")]
    Read(#[source] std::io::Error),
    #[error("line {line}: invalid sample: {source}")]
    Parse {
        line: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("write output: {0}")]
    Write(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    pub samples: u64,
    pub series: usize,
}

/// Encodes every sample of `input` into `output`, in input order.
pub fn encode_stream<R, W>(
    encoder: &PointEncoder,
    input: R,
    mut output: W,
) -> Result<GenerateSummary, GenerateError>
where
    R: BufRead,
    W: Write,
{
    let mut samples = 0u64;
    for (idx, line) in input.lines().enumerate() {
        let line = line.map_err(GenerateError::Read)?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: Sample = serde_json::from_str(&line).map_err(|source| GenerateError::Parse {
            line: idx as u64 + 1,
            source,
        })?;
        encoder
            .encode(&sample, &mut output)
            .map_err(GenerateError::Write)?;
        samples += 1;
    }
    output.flush().map_err(GenerateError::Write)?;
    let series = encoder.registry().len();
    debug!(samples, series, "generation finished");
    Ok(GenerateSummary { samples, series })
}
