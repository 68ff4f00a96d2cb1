//! Measure one roof against the live Google services and print the result
//! as JSON.
//!
//! ```text
//! GOOGLE_API_KEY=... cargo run -p roofdsm-pipeline --example measure_address -- "10220 104 Ave NW, Edmonton"
//! ```
//!
//! Set `ROOFDSM_CONFIG` to a YAML file to override the defaults, and
//! `RUST_LOG` to change the log filter.

use roofdsm_pipeline::telemetry::{init_tracing, DEFAULT_FILTER};
use roofdsm_pipeline::{
    Capabilities, GoogleGeocoder, Pipeline, PipelineConfig, SolarBuildingInsights,
    SolarDataLayers,
};
use roofdsm_raster::{CredentialProvider, HttpRasterFetcher, StaticApiKey};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(DEFAULT_FILTER);
    roofdsm_metrics::describe_metrics();

    let address = std::env::args()
        .nth(1)
        .ok_or("usage: measure_address <address>")?;
    let api_key = std::env::var("GOOGLE_API_KEY").map_err(|_| "GOOGLE_API_KEY is not set")?;

    let config = match std::env::var("ROOFDSM_CONFIG") {
        Ok(path) => PipelineConfig::from_yaml_file(path)?,
        Err(_) => PipelineConfig::default(),
    };

    let key: Arc<dyn CredentialProvider> = Arc::new(StaticApiKey::new(api_key.clone()));
    let capabilities = Capabilities {
        geocoder: Arc::new(GoogleGeocoder::new(&config, key.clone())?),
        footprints: Arc::new(SolarBuildingInsights::new(&config, key.clone())?),
        layers: Arc::new(SolarDataLayers::new(&config, key.clone())?),
        rasters: Arc::new(
            HttpRasterFetcher::with_timeout(config.http_timeout())?.with_credentials(key),
        ),
    };

    let pipeline = Pipeline::new(config, capabilities).with_imagery_key(api_key);
    let measurement = pipeline.measure(&address)?;

    println!("{}", serde_json::to_string_pretty(&measurement)?);
    Ok(())
}
