use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GridwatchConfig {
    pub grid: GridConfig,
    pub sampler: SamplerConfig,
    pub analyzer: AnalyzerConfig,
    pub pause: PauseConfig,
    pub driver: DriverConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GridConfig {
    /// Number of grid rows (1-26, one letter label per row)
    #[serde(default = "default_grid_rows")]
    pub rows: u32,

    /// Number of grid columns
    #[serde(default = "default_grid_cols")]
    pub cols: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SamplerConfig {
    /// Working raster downscale factor (1=full, 2=1/2, 4=1/4)
    #[serde(default = "default_downscale")]
    pub downscale: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalyzerConfig {
    /// Per-pixel luminance delta (0-255 scale) counted as a difference
    #[serde(default = "default_delta_threshold")]
    pub delta_threshold: f64,

    /// Sample every Nth pixel in each axis inside a cell
    #[serde(default = "default_sample_stride")]
    pub sample_stride: u32,

    /// Motion ratio above which a cell becomes active
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,

    /// Motion ratio for low intensity
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,

    /// Motion ratio for medium intensity
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,

    /// Motion ratio for high intensity
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,

    /// Time without a refresh before an active cell settles
    #[serde(default = "default_cell_expiry_ms")]
    pub cell_expiry_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PauseConfig {
    /// Fraction of high-intensity cells that triggers auto-pause
    #[serde(default = "default_pause_threshold")]
    pub pause_threshold: f64,

    /// Delay before a scheduled resume fires
    #[serde(default = "default_resume_delay_ms")]
    pub resume_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DriverConfig {
    /// Minimum time between executed detection ticks
    #[serde(default = "default_min_tick_interval_ms")]
    pub min_tick_interval_ms: u64,

    /// Minimum time between grid overlay renders (local and remote)
    #[serde(default = "default_render_interval_ms")]
    pub render_interval_ms: u64,

    /// Minimum time between outbound motion messages
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    /// Number of recent events shown on the display surface
    #[serde(default = "default_display_window")]
    pub display_window: usize,
}

impl GridwatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("gridwatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("grid.rows", default_grid_rows())?
            .set_default("grid.cols", default_grid_cols())?
            .set_default("sampler.downscale", default_downscale())?
            .set_default("analyzer.delta_threshold", default_delta_threshold())?
            .set_default("analyzer.sample_stride", default_sample_stride())?
            .set_default(
                "analyzer.detection_threshold",
                default_detection_threshold(),
            )?
            .set_default("analyzer.low_threshold", default_low_threshold())?
            .set_default("analyzer.medium_threshold", default_medium_threshold())?
            .set_default("analyzer.high_threshold", default_high_threshold())?
            .set_default("analyzer.cell_expiry_ms", default_cell_expiry_ms() as i64)?
            .set_default("pause.pause_threshold", default_pause_threshold())?
            .set_default("pause.resume_delay_ms", default_resume_delay_ms() as i64)?
            .set_default(
                "driver.min_tick_interval_ms",
                default_min_tick_interval_ms() as i64,
            )?
            .set_default(
                "driver.render_interval_ms",
                default_render_interval_ms() as i64,
            )?
            .set_default("driver.send_interval_ms", default_send_interval_ms() as i64)?
            .set_default("log.display_window", default_display_window() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with GRIDWATCH_ prefix
            .add_source(Environment::with_prefix("GRIDWATCH").separator("_"))
            .build()?;

        let config: GridwatchConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.rows == 0 || self.grid.cols == 0 {
            return Err(ConfigError::Message(
                "Grid rows and cols must be greater than 0".to_string(),
            ));
        }

        if self.grid.rows > 26 {
            return Err(ConfigError::Message(
                "Grid rows must be at most 26 (one letter label per row)".to_string(),
            ));
        }

        if self.sampler.downscale == 0 {
            return Err(ConfigError::Message(
                "Sampler downscale must be greater than 0".to_string(),
            ));
        }

        if self.analyzer.sample_stride == 0 {
            return Err(ConfigError::Message(
                "Analyzer sample_stride must be greater than 0".to_string(),
            ));
        }

        if self.analyzer.low_threshold > self.analyzer.medium_threshold
            || self.analyzer.medium_threshold > self.analyzer.high_threshold
        {
            return Err(ConfigError::Message(
                "Intensity thresholds must be ascending (low <= medium <= high)".to_string(),
            ));
        }

        if self.pause.pause_threshold <= 0.0 || self.pause.pause_threshold > 1.0 {
            return Err(ConfigError::Message(
                "Pause threshold must be within (0, 1]".to_string(),
            ));
        }

        Ok(())
    }

    /// Serialize the configuration to TOML
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl PauseConfig {
    /// Fraction below which a paused engine resumes immediately
    pub fn resume_threshold(&self) -> f64 {
        self.pause_threshold * 0.5
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }
}

impl AnalyzerConfig {
    pub fn cell_expiry(&self) -> Duration {
        Duration::from_millis(self.cell_expiry_ms)
    }
}

impl DriverConfig {
    pub fn min_tick_interval(&self) -> Duration {
        Duration::from_millis(self.min_tick_interval_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

impl Default for GridwatchConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig {
                rows: default_grid_rows(),
                cols: default_grid_cols(),
            },
            sampler: SamplerConfig {
                downscale: default_downscale(),
            },
            analyzer: AnalyzerConfig {
                delta_threshold: default_delta_threshold(),
                sample_stride: default_sample_stride(),
                detection_threshold: default_detection_threshold(),
                low_threshold: default_low_threshold(),
                medium_threshold: default_medium_threshold(),
                high_threshold: default_high_threshold(),
                cell_expiry_ms: default_cell_expiry_ms(),
            },
            pause: PauseConfig {
                pause_threshold: default_pause_threshold(),
                resume_delay_ms: default_resume_delay_ms(),
            },
            driver: DriverConfig {
                min_tick_interval_ms: default_min_tick_interval_ms(),
                render_interval_ms: default_render_interval_ms(),
                send_interval_ms: default_send_interval_ms(),
            },
            log: LogConfig {
                display_window: default_display_window(),
            },
        }
    }
}

// Default value functions
fn default_grid_rows() -> u32 {
    6
}
fn default_grid_cols() -> u32 {
    6
}

fn default_downscale() -> u32 {
    2
} // Default to 1/2 resolution for efficiency

fn default_delta_threshold() -> f64 {
    25.0
}
fn default_sample_stride() -> u32 {
    2
}
fn default_detection_threshold() -> f64 {
    0.02
}
fn default_low_threshold() -> f64 {
    0.02
}
fn default_medium_threshold() -> f64 {
    0.06
}
fn default_high_threshold() -> f64 {
    0.12
}
fn default_cell_expiry_ms() -> u64 {
    200
}

fn default_pause_threshold() -> f64 {
    0.85
}
fn default_resume_delay_ms() -> u64 {
    2000
}

fn default_min_tick_interval_ms() -> u64 {
    50
}
fn default_render_interval_ms() -> u64 {
    33
} // ~30 fps overlay updates
fn default_send_interval_ms() -> u64 {
    100
}

fn default_display_window() -> usize {
    10
}
