use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

/// One command line, undecoded until a worker sends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadUnit {
    line: String,
}

impl LoadUnit {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("read error after {lines} lines: {source}")]
    Read {
        lines: u64,
        #[source]
        source: std::io::Error,
    },
}

/// Sequential line reader feeding the batchers. Blank lines are skipped.
pub struct LineDecoder<R> {
    lines: Lines<R>,
    read: u64,
}

impl<R: AsyncBufRead + Unpin> LineDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            read: 0,
        }
    }

    /// Next unit, or `None` at end of input. Any read error is final: a
    /// truncated input cannot produce a meaningful run.
    pub async fn next(&mut self) -> Result<Option<LoadUnit>, DecodeError> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|source| DecodeError::Read {
                    lines: self.read,
                    source,
                })?;
            match line {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    self.read += 1;
                    return Ok(Some(LoadUnit::new(line)));
                }
            }
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.read
    }
}
