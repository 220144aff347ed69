use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::{debug, error, info};

use gridwatch::raster::RASTER_BPP;
use gridwatch::{
    DetectionEngine, FrameSource, GridSnapshot, GridwatchConfig, NetworkPayload, NetworkSink,
    Raster, RenderSink, TickStatus,
};

#[derive(Parser, Debug)]
#[command(name = "gridwatch")]
#[command(about = "Grid-based motion detection engine for video call streams")]
#[command(version)]
#[command(long_about = "Runs the grid motion detection engine against a synthetic \
video source and reports detected motion events. The engine segments each frame \
into a grid, classifies per-cell motion intensity, auto-pauses under excessive \
movement and logs every motion event for export.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "gridwatch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without running")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// How long to run the synthetic detection demo
    #[arg(long, default_value_t = 5, value_name = "SECONDS", help = "Demo run duration in seconds")]
    duration: u64,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

/// Frame source producing a bright block orbiting over a dark background,
/// so the demo exercises localized motion without a camera.
struct SyntheticSource {
    width: u32,
    height: u32,
    block: u32,
    frame: u64,
}

impl SyntheticSource {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            block: 32,
            frame: 0,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn is_ready(&self) -> bool {
        true
    }

    fn current_frame(&mut self) -> Option<Raster> {
        let mut data = vec![16u8; (self.width * self.height * RASTER_BPP) as usize];

        let x_range = self.width - self.block;
        let y_range = self.height - self.block;
        let x0 = ((self.frame * 7) % x_range as u64) as u32;
        let y0 = ((self.frame * 5) % y_range as u64) as u32;

        for y in y0..y0 + self.block {
            for x in x0..x0 + self.block {
                let index = ((y * self.width + x) * RASTER_BPP) as usize;
                data[index] = 230;
                data[index + 1] = 230;
                data[index + 2] = 230;
                data[index + 3] = 255;
            }
        }

        self.frame += 1;
        Some(Raster::new(self.width, self.height, data))
    }
}

/// Render sink that reports overlay state through tracing
struct OverlayLogSink;

impl RenderSink for OverlayLogSink {
    fn render_local(&mut self, snapshot: &GridSnapshot) {
        debug!(
            "Local overlay: {}/{} cells active",
            snapshot.active_count(),
            snapshot.cells.len()
        );
    }

    fn render_remote(&mut self, snapshot: &GridSnapshot) {
        debug!(
            "Remote overlay: {}/{} cells active",
            snapshot.active_count(),
            snapshot.cells.len()
        );
    }
}

/// Network sink that reports outbound payloads through tracing
struct WireLogSink;

impl NetworkSink for WireLogSink {
    fn send(&mut self, payload: NetworkPayload) {
        match payload {
            NetworkPayload::GridMotion { events, .. } => {
                info!("Outbound grid-motion message with {} event(s)", events.len());
            }
            NetworkPayload::MotionToggle { enabled } => {
                info!("Outbound motion-toggle message (enabled: {})", enabled);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        println!("{}", GridwatchConfig::default().to_toml()?);
        return Ok(());
    }

    // Initialize logging
    init_logging(&args)?;

    info!("Starting Gridwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Load and validate configuration
    let config = match GridwatchConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut engine = DetectionEngine::builder()
        .config(config)
        .render_sink(OverlayLogSink)
        .network_sink(WireLogSink)
        .build()
        .map_err(|e| {
            error!("Failed to create detection engine: {}", e);
            e
        })?;

    let mut source = SyntheticSource::new(320, 240);
    engine.enable();

    info!("Running synthetic detection demo for {}s", args.duration);

    // one invocation per simulated display refresh; the engine applies its
    // own tick-rate limit on top
    let mut refresh = tokio::time::interval(Duration::from_millis(16));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.duration);

    while tokio::time::Instant::now() < deadline {
        refresh.tick().await;
        match engine.drive(&mut source) {
            TickStatus::Analyzed { events } if events > 0 => {
                debug!("Tick emitted {} event(s)", events);
            }
            TickStatus::Paused | TickStatus::Resumed => {
                info!("Engine pause state: {:?}", engine.is_paused());
            }
            _ => {}
        }
    }

    engine.disable();

    info!(
        "Demo finished: {} motion event(s) logged",
        engine.log().len()
    );
    println!("{}", engine.log().export_all()?);

    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gridwatch={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        }
        Some("compact") => {
            fmt::layer()
                .compact()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .boxed()
        }
        Some("pretty") | None => {
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}
