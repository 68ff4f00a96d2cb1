//! Satellite and street-view image URLs for the measured property.

use crate::capabilities::Coordinates;
use crate::config::{ConfigError, ImageryConfig};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Street-view headings: north, east, south, west.
pub const STREET_VIEW_HEADINGS: [(u16, &str); 4] = [(0, "N"), (90, "E"), (180, "S"), (270, "W")];

/// One street-view image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetViewUrl {
    pub heading: u16,
    pub direction: String,
    pub url: String,
}

/// Image URLs for a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageryUrls {
    pub satellite: String,
    pub street_views: Vec<StreetViewUrl>,
}

impl ImageryUrls {
    /// Build the static satellite map URL and four street-view URLs.
    ///
    /// `key` is appended to every URL when given; without it the URLs are
    /// safe to persist but must be signed before use.
    pub fn assemble(
        at: Coordinates,
        config: &ImageryConfig,
        key: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let location = at.to_string();
        let size = config.size.as_str();

        let mut params = vec![
            ("center", location.clone()),
            ("zoom", config.zoom.to_string()),
            ("size", size.to_string()),
            ("maptype", "satellite".to_string()),
        ];
        params.extend(key.map(|k| ("key", k.to_string())));
        let satellite = with_params(&config.static_map_url, &params)?;

        let street_views = STREET_VIEW_HEADINGS
            .iter()
            .map(|&(heading, direction)| -> Result<StreetViewUrl, ConfigError> {
                let mut params = vec![
                    ("size", size.to_string()),
                    ("location", location.clone()),
                    ("heading", heading.to_string()),
                    ("pitch", config.street_view_pitch.to_string()),
                    ("fov", config.street_view_fov.to_string()),
                ];
                params.extend(key.map(|k| ("key", k.to_string())));
                Ok(StreetViewUrl {
                    heading,
                    direction: direction.to_string(),
                    url: with_params(&config.street_view_url, &params)?,
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            satellite,
            street_views,
        })
    }
}

fn with_params(base: &str, params: &[(&str, String)]) -> Result<String, ConfigError> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| ConfigError::Invalid(format!("imagery URL {:?}: {}", base, e)))
}
