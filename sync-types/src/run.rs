//! The run record and its measurement payload.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{RunId, UserId};

/// Geographic coordinate where a run started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub long: f64,
}

impl Location {
    /// Create a new location.
    pub fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }
}

/// A completed run.
///
/// Measurements are immutable once recorded. The only mutation a run ever
/// sees is the replacement of its local id by the remote-issued one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Local id until the remote service confirms the run, remote id after.
    pub id: RunId,
    /// User that recorded the run.
    pub owner_id: UserId,
    /// Start time as unix milliseconds (UTC).
    pub started_at: i64,
    /// Elapsed time in milliseconds.
    pub duration_ms: u64,
    /// Distance covered in meters.
    pub distance_meters: u32,
    /// Where the run started.
    pub location: Location,
    /// Highest speed reached, km/h.
    pub max_speed_kmh: f64,
    /// Accumulated elevation gain, meters.
    pub total_elevation_meters: u32,
    /// URL of the rendered map snapshot, once the remote service hosts it.
    pub map_picture_url: Option<String>,
}

impl Run {
    /// Elapsed time as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Average speed in km/h (0 for a zero-length run).
    pub fn avg_speed_kmh(&self) -> f64 {
        let hours = self.duration().as_secs_f64() / 3600.0;
        if hours <= 0.0 {
            return 0.0;
        }
        (f64::from(self.distance_meters) / 1000.0) / hours
    }

    /// Average pace per kilometer, `None` when no distance was covered.
    pub fn pace(&self) -> Option<Duration> {
        if self.distance_meters == 0 {
            return None;
        }
        let km = f64::from(self.distance_meters) / 1000.0;
        Duration::try_from_secs_f64(self.duration().as_secs_f64() / km).ok()
    }

    /// Copy of this run under a different id.
    pub fn with_id(&self, id: RunId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }
}
