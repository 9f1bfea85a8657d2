use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, BufReader};

use crate::config::SourceConfig;

/// Buffered reader over the JSON-lines event stream.
pub type EventReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Opens the configured file, or stdin for "-".
pub async fn open(cfg: &SourceConfig) -> Result<EventReader> {
    if cfg.is_stdin() {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }

    let file = File::open(&cfg.path)
        .await
        .with_context(|| format!("opening event source {}", cfg.path))?;
    Ok(Box::new(BufReader::new(file)))
}
