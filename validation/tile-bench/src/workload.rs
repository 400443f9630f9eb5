//! Tile request URL generation.
//!
//! Producers are stateless request factories indexed by iteration number, so the
//! coordinator can treat the geo and image workloads interchangeably.

use rand::prelude::*;
use std::ops::Range;

use crate::config::BenchConfig;
use crate::transport::RequestDescriptor;

/// Canonical tile hit repeatedly by the image workload.
pub const FIXED_TILE_PATH: &str = "14/8471/5564.png";

/// Generates the request for each logical request of a batch.
pub trait Workload: Send + Sync {
    /// Short label used in report headers (e.g. "URL", "IMG").
    fn name(&self) -> &str;

    /// Request descriptor for iteration `index`.
    fn request(&self, index: u64) -> RequestDescriptor;

    /// Sub-requests issued per logical client-request.
    fn expansion(&self) -> u64 {
        1
    }
}

/// Geographic bounding box for random spots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl GeoBounds {
    /// Luxembourg bounding box.
    pub const LUXEMBOURG: GeoBounds = GeoBounds {
        min_lat: 49.4426671413,
        max_lat: 50.1280516628,
        min_lng: 5.67405195478,
        max_lng: 6.24275109216,
    };
}

/// A random map position: zoom level plus centre coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoSpot {
    pub zoom: u32,
    pub lat: f64,
    pub lng: f64,
}

/// Random map positions inside a bounding box, addressed as `{base}/#{zoom}/{lat}/{lng}`.
#[derive(Debug, Clone)]
pub struct RandomGeoTile {
    base_url: String,
    zoom_range: Range<u32>,
    bounds: GeoBounds,
    seed: Option<u64>,
}

impl RandomGeoTile {
    /// Zoom levels 14 to 21 over Luxembourg.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            zoom_range: 14..22,
            bounds: GeoBounds::LUXEMBOURG,
            seed: None,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        let mut producer = Self::new(config.trimmed_base_url());
        producer.seed = config.seed;
        producer
    }

    /// Derive every spot from `seed` and the iteration index instead of thread entropy.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_zoom_range(mut self, zoom_range: Range<u32>) -> Self {
        self.zoom_range = zoom_range;
        self
    }

    pub fn with_bounds(mut self, bounds: GeoBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Draw the spot for iteration `index`.
    pub fn spot(&self, index: u64) -> GeoSpot {
        match self.seed {
            // One RNG per index keeps seeded runs reproducible no matter which task asks
            Some(seed) => {
                let mixed = seed ^ index.wrapping_mul(0x9E37_79B9_7F4A_7C15);
                self.sample(&mut StdRng::seed_from_u64(mixed))
            }
            None => self.sample(&mut thread_rng()),
        }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> GeoSpot {
        let zoom = if self.zoom_range.is_empty() {
            self.zoom_range.start
        } else {
            rng.gen_range(self.zoom_range.clone())
        };
        let lat = uniform(rng, self.bounds.min_lat, self.bounds.max_lat);
        let lng = uniform(rng, self.bounds.min_lng, self.bounds.max_lng);

        GeoSpot { zoom, lat, lng }
    }
}

fn uniform<R: Rng>(rng: &mut R, min: f64, max: f64) -> f64 {
    min + rng.gen::<f64>() * (max - min)
}

impl Workload for RandomGeoTile {
    fn name(&self) -> &str {
        "URL"
    }

    fn request(&self, index: u64) -> RequestDescriptor {
        let spot = self.spot(index);
        RequestDescriptor::get(format!(
            "{}/#{}/{}/{}",
            self.base_url, spot.zoom, spot.lat, spot.lng
        ))
    }
}

/// The same rendered tile over and over, expanded per client-request.
#[derive(Debug, Clone)]
pub struct FixedImageTile {
    url: String,
    expansion: u64,
}

impl FixedImageTile {
    pub fn new(base_url: &str, expansion: u64) -> Self {
        Self {
            url: format!("{}/{}", base_url.trim_end_matches('/'), FIXED_TILE_PATH),
            expansion,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(config.trimmed_base_url(), config.image_expansion)
    }
}

impl Workload for FixedImageTile {
    fn name(&self) -> &str {
        "IMG"
    }

    fn request(&self, _index: u64) -> RequestDescriptor {
        RequestDescriptor::get(self.url.clone())
    }

    fn expansion(&self) -> u64 {
        self.expansion
    }
}
