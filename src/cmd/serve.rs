//! Relay server command — `vibe-pacer serve`.

use anyhow::Result;

use vibe_pacer::config::PacerConfig;
use vibe_pacer::server::start_server;

pub async fn cmd_serve(
    mut config: PacerConfig,
    port: Option<u16>,
    host: Option<String>,
    dev: bool,
) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    start_server(config, dev).await?;
    Ok(())
}
