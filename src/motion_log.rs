use crate::error::Result;
use crate::events::MotionEvent;

use std::path::Path;
use tracing::{debug, info};

/// Append-only history of motion events.
///
/// The underlying history is unbounded; only the display surface is windowed
/// via `recent_window`. The log survives engine resets within a session and
/// is cleared explicitly.
#[derive(Debug, Default)]
pub struct MotionLog {
    events: Vec<MotionEvent>,
}

impl MotionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: MotionEvent) {
        debug!("Logged motion event: {}", event.description());
        self.events.push(event);
    }

    pub fn clear(&mut self) {
        info!("Motion log cleared ({} events dropped)", self.events.len());
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Last `n` events for display, oldest first. Non-destructive.
    pub fn recent_window(&self, n: usize) -> &[MotionEvent] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    /// Full history serialized as a JSON array
    pub fn export_all(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.events)?)
    }

    /// Write the full history to a file as JSON
    pub fn export_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let rendered = self.export_all()?;
        std::fs::write(path.as_ref(), rendered)?;
        info!(
            "Exported {} motion events to {}",
            self.events.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}
