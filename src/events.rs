use crate::analyzer::grid::GridSnapshot;
use crate::analyzer::Intensity;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One logged motion occurrence at a grid coordinate.
///
/// Immutable once created; emission order is non-decreasing in `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionEvent {
    /// Grid label: row letter plus 1-based column, e.g. "A1"
    pub coordinate: String,
    pub intensity: Intensity,
    /// Motion ratio that triggered the event
    pub level: f64,
    pub timestamp: DateTime<Utc>,
}

impl MotionEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        format!(
            "{} {} ({:.1}%)",
            self.coordinate,
            self.intensity,
            self.level * 100.0
        )
    }
}

/// Payloads handed to the network sink for the remote peer.
///
/// Wire shape matches the peer protocol: a `type` tag of `grid-motion` or
/// `motion-toggle` with camelCase fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NetworkPayload {
    #[serde(rename_all = "camelCase")]
    GridMotion {
        events: Vec<MotionEvent>,
        grid_data: GridSnapshot,
        timestamp: DateTime<Utc>,
    },
    MotionToggle { enabled: bool },
}
