//! Single-session playback: resolve, pick a quality, pump bytes into the
//! player until the stream ends or the user interrupts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::info;

use sluice_engine::{ByteSource, relay};
use sluice_plugins::{DirectPlugin, PluginRegistry, StreamMap};

use crate::config::AppConfig;

/// The registry used by every mode: currently only the built-in direct
/// URL handler.
pub fn build_registry(config: &AppConfig) -> Result<Arc<PluginRegistry>> {
    let engine = config.engine_config();
    let client = engine.build_client().context("building HTTP client")?;
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(
        DirectPlugin::new(client, engine).with_rtmp_params(config.rtmp_params()),
    ));
    Ok(Arc::new(registry))
}

async fn discover(registry: &PluginRegistry, url: &str) -> Result<StreamMap> {
    let resolved = registry
        .resolve(url)
        .await
        .with_context(|| format!("resolving {url}"))?;
    let streams = resolved
        .streams()
        .await
        .with_context(|| format!("discovering streams for {url}"))?;
    Ok(streams)
}

pub async fn play(
    config: &AppConfig,
    url: &str,
    quality: Option<&str>,
    player: Option<&str>,
) -> Result<()> {
    let player_command = config.player_command(player)?;
    let registry = build_registry(config)?;
    let streams = discover(&registry, url).await?;
    if streams.is_empty() {
        bail!("no playable streams found for {url}");
    }

    let wanted = config.quality(quality);
    let available = streams.labels().collect::<Vec<_>>().join(", ");
    let Some(label) = streams.resolve_label(wanted).map(str::to_owned) else {
        bail!("quality '{wanted}' not available (have: {available})");
    };
    let Some(mut stream) = streams.select(wanted) else {
        bail!("quality '{wanted}' not available (have: {available})");
    };
    info!(url, quality = %label, "starting playback");

    stream.open().await.context("opening stream")?;
    let mut player = match player_command.spawn() {
        Ok(player) => player,
        Err(err) => {
            stream.close().await;
            return Err(err).context("spawning player");
        }
    };
    let Some(mut stdin) = player.take_stdin() else {
        stream.close().await;
        player.shutdown(Duration::from_secs(2)).await;
        bail!("player has no stdin to write to");
    };

    let token = CancellationToken::new();
    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                token.cancel();
            }
        })
    };

    let engine = config.engine_config();
    let result = relay(&mut stream, &mut stdin, &engine.relay, &token).await;
    // Close the pipe so the player sees end of input.
    drop(stdin);
    interrupt.abort();

    match result {
        Ok(session) => {
            info!(bytes = session.bytes_relayed, "stream ended");
            if token.is_cancelled() {
                player.shutdown(Duration::from_secs(2)).await;
            } else {
                // Let the player drain its buffers and exit on its own.
                player.wait().await;
            }
            Ok(())
        }
        Err(err) => {
            player.shutdown(Duration::from_secs(2)).await;
            Err(err).context("relay failed")
        }
    }
}

/// `streams` subcommand: print the available qualities for a URL.
pub async fn list_streams(config: &AppConfig, url: &str) -> Result<()> {
    let registry = build_registry(config)?;
    let streams = discover(&registry, url).await?;
    if streams.is_empty() {
        println!("no playable streams found for {url}");
        return Ok(());
    }
    let labels = streams.labels().collect::<Vec<_>>().join(", ");
    println!("Available streams: {labels}");
    if let Some(best) = streams.resolve_label("best") {
        println!("  best  -> {best}");
    }
    if let Some(worst) = streams.resolve_label("worst") {
        println!("  worst -> {worst}");
    }
    Ok(())
}
