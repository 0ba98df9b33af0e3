use std::{net::SocketAddr, sync::Arc};

use radiolink::{
    commands::CommandFacade,
    common::{http::HttpClient, logger, types::AnyResult},
    configs::Config,
    metadata::{ArtworkLookup, NowPlayingTracker},
    server::AppState,
    session::SessionRegistry,
    stream::{HttpStreamSource, LicenseResolver},
    transport,
    voice::VoiceBridge,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let (config, config_path) = Config::load()?;
    logger::init(config.logging.as_ref());
    info!("Loaded configuration from {}", config_path);
    info!(
        "Serving {} guild(s): {:?}",
        config.discord.guild_ids.len(),
        config.discord.guild_ids
    );

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let bridge = Arc::new(VoiceBridge::new(events_tx));

    let http = HttpClient::new(config.radio.request_timeout())?;
    let resolver = config
        .radio
        .license_url
        .as_ref()
        .map(|url| Arc::new(LicenseResolver::new(http.clone(), url.clone())));
    let source = Arc::new(HttpStreamSource::from_config(&config.radio, resolver.clone())?);

    let registry = Arc::new(SessionRegistry::new(
        bridge.clone(),
        source,
        config.session.clone(),
    ));
    registry.spawn_event_loop(events_rx);
    registry.spawn_idle_reaper(
        config.session.reaper_interval(),
        config.session.idle_timeout(),
    );

    let now_playing = match resolver {
        Some(resolver) => {
            let artwork = config
                .radio
                .artwork_lookup
                .then(|| ArtworkLookup::new(http.clone()));
            let tracker = Arc::new(NowPlayingTracker::new(
                http.clone(),
                resolver,
                config.radio.text_base_url.as_deref(),
                artwork,
            )?);
            tracker.spawn(config.radio.metadata_poll_interval());
            Some(tracker)
        }
        None => {
            warn!("No radio.license_url configured; track titles are unavailable");
            None
        }
    };

    let facade = Arc::new(CommandFacade::new(
        registry.clone(),
        config.discord.guild_ids.clone(),
        now_playing,
    ));

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let shared_state = Arc::new(AppState {
        facade,
        bridge,
        config,
    });

    let app = transport::http_server::router(shared_state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    info!("Radiolink listening on {}", address);
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
