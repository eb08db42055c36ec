//! casa hub
//!
//! Home backend tying the layers together: DNS filter overrides, smart
//! lights, weather, and the standing schedules, all behind one HTTP API.

mod api;
mod config;
mod filters_api;
mod lights_api;
mod schedule;
mod weather_api;

use std::sync::Arc;

use anyhow::Result;
use casa_filter::{NextDnsClient, OverrideEngine};
use casa_lights::{DeviceRegistry, LightsConfig};
use casa_net::RestClient;
use casa_weather::WeatherClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::HubConfig;
use crate::schedule::ScheduleTimes;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "casa_hub=debug,casa_filter=debug,casa_lights=debug,\
                 casa_weather=debug,casa_net=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    // Load and validate configuration
    let config = HubConfig::load()?;
    let bind_addr = config.socket_addr()?;
    let times = ScheduleTimes::from_config(&config.schedules)?;

    // Shared REST client behind both remote integrations
    let rest = Arc::new(RestClient::with_defaults());
    let policy = Arc::new(NextDnsClient::new(rest.clone(), &config.nextdns_api_key)?);
    let engine = Arc::new(OverrideEngine::new(policy));
    let lights = Arc::new(DeviceRegistry::new(LightsConfig {
        data_dir: config.data_dir.clone(),
        ..LightsConfig::default()
    }));
    let weather = Arc::new(WeatherClient::new(rest, config.default_location.clone()));

    // Warmups are best effort; the hub serves with a cold cache if they fail
    lights.ensure_fresh(false).await;
    if let Err(err) = engine.cache().get(false).await {
        tracing::warn!("initial profile load failed: {}", err);
    }

    let state = Arc::new(AppState {
        config,
        engine,
        lights,
        weather,
    });

    // Standing jobs: morning/night scenes and the sunset fade
    schedule::spawn(state.clone(), times);

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("casa hub listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
