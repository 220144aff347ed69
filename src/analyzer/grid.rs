use crate::analyzer::cell::{classify, motion_ratio, GridGeometry, Intensity};
use crate::config::AnalyzerConfig;
use crate::events::MotionEvent;
use crate::raster::Raster;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

/// Motion state of one grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    /// Fraction of sampled pixels that differed on the last computed tick
    pub motion_level: f64,
    pub intensity: Intensity,
    /// Hysteresis flag: true while motion is ongoing, cleared on expiry
    pub active: bool,
    /// Set when the cell last transitioned to active
    pub last_motion_time: Option<DateTime<Utc>>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            motion_level: 0.0,
            intensity: Intensity::None,
            active: false,
            last_motion_time: None,
        }
    }
}

/// Read-only copy of the whole grid, safe to hand to renderers and transports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub rows: u32,
    pub cols: u32,
    /// Row-major cell states
    pub cells: Vec<Cell>,
}

impl GridSnapshot {
    /// Shape validation for remote-originated snapshots
    pub fn matches_shape(&self, rows: u32, cols: u32) -> bool {
        self.rows == rows && self.cols == cols && self.cells.len() == (rows * cols) as usize
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get((row * self.cols + col) as usize)
    }

    /// Number of currently active cells
    pub fn active_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.active).count()
    }
}

/// Result of analyzing one raster pair
#[derive(Debug)]
pub struct TickStats {
    /// Events emitted this tick (one per cell newly turned active)
    pub events: Vec<MotionEvent>,
    /// Fraction of cells classified High, fed to the pause controller
    pub high_fraction: f64,
}

/// Human-readable grid label for a cell, row letter first ("A1")
pub fn cell_label(row: u32, col: u32) -> String {
    debug_assert!(row < 26);
    format!("{}{}", (b'A' + row as u8) as char, col + 1)
}

/// Owns the rows x cols matrix of cell state and drives per-cell hysteresis.
///
/// Expiry is tracked as explicit deadlines checked against a monotonic clock;
/// nothing outside this struct mutates cell state.
pub struct GridStateMachine {
    rows: u32,
    cols: u32,
    cells: Vec<Cell>,
    /// Pending expiry deadline per cell, parallel to `cells`
    expiries: Vec<Option<Instant>>,
}

impl GridStateMachine {
    pub fn new(rows: u32, cols: u32) -> Self {
        let count = (rows * cols) as usize;
        Self {
            rows,
            cols,
            cells: vec![Cell::default(); count],
            expiries: vec![None; count],
        }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn cell(&self, row: u32, col: u32) -> &Cell {
        &self.cells[self.index(row, col)]
    }

    fn index(&self, row: u32, col: u32) -> usize {
        (row * self.cols + col) as usize
    }

    /// Analyze one raster pair and update every cell.
    ///
    /// `now` drives expiry scheduling; `wall` stamps emitted events so all
    /// events from one tick share a timestamp.
    pub fn tick(
        &mut self,
        prev: &Raster,
        curr: &Raster,
        config: &AnalyzerConfig,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> TickStats {
        let geometry = GridGeometry::new(self.rows, self.cols, curr.width, curr.height);
        let mut events = Vec::new();
        let mut high_cells = 0u32;

        for row in 0..self.rows {
            for col in 0..self.cols {
                let level = motion_ratio(
                    prev,
                    curr,
                    geometry.cell_bounds(row, col),
                    config.sample_stride,
                    config.delta_threshold,
                );

                let index = self.index(row, col);
                let cell = &mut self.cells[index];
                cell.motion_level = level;
                cell.intensity = classify(level, config);

                if cell.intensity == Intensity::High {
                    high_cells += 1;
                }

                if level > config.detection_threshold {
                    if !cell.active {
                        cell.active = true;
                        cell.last_motion_time = Some(wall);
                        let event = MotionEvent {
                            coordinate: cell_label(row, col),
                            intensity: cell.intensity,
                            level,
                            timestamp: wall,
                        };
                        debug!("Motion event: {}", event.description());
                        events.push(event);
                    }
                    // active cells get their expiry refreshed, no new event
                    self.expiries[index] = Some(now + config.cell_expiry());
                }
            }
        }

        let total = (self.rows * self.cols) as f64;
        TickStats {
            events,
            high_fraction: high_cells as f64 / total,
        }
    }

    /// Settle cells whose expiry deadline has elapsed without a refresh.
    ///
    /// Level and intensity are left as last observed; only the hysteresis
    /// flag clears. Returns the number of cells settled.
    pub fn expire_stale(&mut self, now: Instant) -> usize {
        let mut settled = 0;
        for (index, deadline) in self.expiries.iter_mut().enumerate() {
            if let Some(when) = *deadline {
                if when <= now {
                    self.cells[index].active = false;
                    *deadline = None;
                    settled += 1;
                }
            }
        }
        if settled > 0 {
            trace!("{} cell(s) settled after expiry", settled);
        }
        settled
    }

    /// Reinitialize every cell and cancel pending expiries. Idempotent.
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::default();
        }
        for deadline in &mut self.expiries {
            *deadline = None;
        }
    }

    /// Whether any expiry deadline is pending
    pub fn has_pending_expiries(&self) -> bool {
        self.expiries.iter().any(|deadline| deadline.is_some())
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.clone(),
        }
    }
}
