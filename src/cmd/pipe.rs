//! Pace stdin to stdout — `vibe-pacer pipe`.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use vibe_pacer::config::PacingConfig;
use vibe_pacer::pacer::{RandomJitter, paced_stream_with};

pub async fn cmd_pipe(pacing: &PacingConfig) -> Result<()> {
    pacing.validate()?;

    let upstream = ReaderStream::new(tokio::io::stdin());
    let mut paced = paced_stream_with(upstream, pacing, RandomJitter);
    let mut stdout = tokio::io::stdout();

    while let Some(chunk) = paced.next().await {
        let chunk = chunk.context("Failed to read stdin")?;
        stdout
            .write_all(&chunk)
            .await
            .context("Failed to write to stdout")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }

    Ok(())
}
