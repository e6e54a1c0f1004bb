//! Configuration parsing for the route viewer.
//!
//! Owns translation of CLI arguments into a validated `ViewerConfig` which the
//! viewer and the control server use without re-parsing flags.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Args;
use ml_core::DetectionModel;

use crate::{
    route::{LatLng, RouteDraft, format_coordinate},
    scheduler::DEFAULT_TICK_INTERVAL,
    viewer::ViewerOptions,
};

/// Time without a frame before an active stream is reported as stalled.
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, PartialEq)]
/// Where frames come from.
pub enum BackendSource {
    /// Streaming backend reached over HTTP.
    Http { base_url: String },
    /// In-process generator; no network needed.
    Simulated { frame_delay: Duration },
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing and runtime inspection.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing viewer spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Enable the Tokio console subscriber for live task inspection.
    pub enable_tokio_console: bool,
}

#[derive(Clone, Debug)]
/// Canonical configuration shared by the viewer loop and the control server.
pub struct ViewerConfig {
    pub backend: BackendSource,
    pub viewer: ViewerOptions,
    /// Address the control server binds to.
    pub http_host: String,
    pub http_port: u16,
    pub telemetry: TelemetryOptions,
}

/// CLI arguments accepted by the `view` and `simulate` subcommands.
#[derive(Debug, Args)]
pub struct ViewerCliArgs {
    /// Streaming backend root URL.
    #[arg(
        long = "backend",
        env = "ROUTE_STREAM_BACKEND",
        value_name = "URL",
        default_value = "http://localhost:8000"
    )]
    pub backend: String,
    /// Generate frames locally instead of contacting the backend.
    #[arg(long = "simulate", action = clap::ArgAction::SetTrue)]
    pub simulate: bool,
    /// Delay between simulated frame events.
    #[arg(long = "frame-delay-ms", value_name = "MS", default_value_t = 250)]
    pub frame_delay_ms: u64,
    /// Identity sent with every begin-session command.
    #[arg(long = "user-id", env = "ROUTE_VIEWER_USER_ID", default_value = "1")]
    pub user_id: String,
    /// Playback cadence.
    #[arg(long = "tick-ms", value_name = "MS")]
    pub tick_ms: Option<u64>,
    /// Report a stall after this long without frames.
    #[arg(long = "stall-timeout-ms", value_name = "MS")]
    pub stall_timeout_ms: Option<u64>,
    /// Initial rendered frame width, until the client reports one.
    #[arg(long = "render-width", value_name = "PX")]
    pub render_width: Option<f32>,
    /// Initial rendered frame height, until the client reports one.
    #[arg(long = "render-height", value_name = "PX")]
    pub render_height: Option<f32>,
    /// Prefill the route start as `LAT,LNG`.
    #[arg(long = "start", value_name = "LAT,LNG", allow_hyphen_values = true)]
    pub start: Option<String>,
    /// Prefill the route end as `LAT,LNG`.
    #[arg(long = "end", value_name = "LAT,LNG", allow_hyphen_values = true)]
    pub end: Option<String>,
    /// Prefill the number of sampled points.
    #[arg(long = "points", value_name = "N")]
    pub points: Option<u32>,
    /// Detection model (dino, owlvit, yolo).
    #[arg(long = "model", value_name = "MODEL")]
    pub model: Option<String>,
    /// Submit the prefilled route on launch.
    #[arg(long = "autostart", action = clap::ArgAction::SetTrue)]
    pub autostart: bool,
    /// Control server bind host.
    #[arg(long = "host", default_value = "127.0.0.1")]
    pub host: String,
    /// Control server bind port.
    #[arg(long = "port", default_value_t = 8080)]
    pub port: u16,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Enable the Tokio console instrumentation server.
    #[arg(long = "tokio-console", action = clap::ArgAction::SetTrue)]
    pub tokio_console: bool,
}

impl TryFrom<ViewerCliArgs> for ViewerConfig {
    type Error = anyhow::Error;

    fn try_from(args: ViewerCliArgs) -> Result<Self> {
        let backend = if args.simulate {
            BackendSource::Simulated {
                frame_delay: Duration::from_millis(args.frame_delay_ms),
            }
        } else {
            let base_url = args.backend.trim().trim_end_matches('/').to_string();
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                bail!("--backend must be an http(s) URL, got {:?}", args.backend);
            }
            BackendSource::Http { base_url }
        };

        let tick_interval = match args.tick_ms {
            Some(0) => bail!("--tick-ms must be at least 1"),
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_TICK_INTERVAL,
        };
        let stall_threshold = match args.stall_timeout_ms {
            Some(0) => bail!("--stall-timeout-ms must be at least 1"),
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_STALL_THRESHOLD,
        };

        if args.user_id.trim().is_empty() {
            bail!("--user-id must not be empty");
        }
        if args.port == 0 {
            bail!("--port must be a non-zero port number");
        }

        let mut route = RouteDraft::default();
        if let Some(start) = args.start.as_deref() {
            let point = parse_point(start).context("Invalid --start")?;
            route.start_lat = format_coordinate(point.lat);
            route.start_lng = format_coordinate(point.lng);
        }
        if let Some(end) = args.end.as_deref() {
            route.set_end(parse_point(end).context("Invalid --end")?);
        }
        if let Some(points) = args.points {
            route.num_points = points.to_string();
        }
        if let Some(model) = args.model.as_deref() {
            route.model = model.parse::<DetectionModel>()?;
        }
        if args.autostart {
            route
                .to_request()
                .context("--autostart needs a complete --start, --end and --points")?;
        }

        let viewer = ViewerOptions {
            user_id: args.user_id.trim().to_string(),
            tick_interval,
            stall_threshold,
            render_width: args.render_width.unwrap_or(0.0),
            render_height: args.render_height.unwrap_or(0.0),
            route,
            autostart: args.autostart,
        };

        let telemetry = TelemetryOptions {
            chrome_trace_path: args.chrome_trace,
            enable_tokio_console: args.tokio_console,
        };

        Ok(Self {
            backend,
            viewer,
            http_host: args.host,
            http_port: args.port,
            telemetry,
        })
    }
}

/// Parse `LAT,LNG`.
pub fn parse_point(raw: &str) -> Result<LatLng> {
    let (lat, lng) = raw
        .split_once(',')
        .with_context(|| format!("expected LAT,LNG, got {raw:?}"))?;
    let lat = lat
        .trim()
        .parse::<f64>()
        .with_context(|| format!("latitude {lat:?} is not a number"))?;
    let lng = lng
        .trim()
        .parse::<f64>()
        .with_context(|| format!("longitude {lng:?} is not a number"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        bail!("coordinate {raw:?} is out of range");
    }
    Ok(LatLng::new(lat, lng))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ViewerCliArgs,
    }

    fn parse(extra: &[&str]) -> Result<ViewerConfig> {
        let argv = std::iter::once("route-viewer").chain(extra.iter().copied());
        let harness = Harness::try_parse_from(argv)?;
        ViewerConfig::try_from(harness.args)
    }

    #[test]
    fn defaults_to_http_backend() {
        let config = parse(&["--backend", "https://stream.example.com/"]).unwrap();
        assert_eq!(
            config.backend,
            BackendSource::Http {
                base_url: "https://stream.example.com".into()
            }
        );
        assert_eq!(config.viewer.tick_interval, DEFAULT_TICK_INTERVAL);
        assert_eq!(config.viewer.stall_threshold, DEFAULT_STALL_THRESHOLD);
        assert_eq!(config.http_port, 8080);
        assert!(!config.viewer.autostart);
    }

    #[test]
    fn simulate_ignores_backend_url() {
        let config = parse(&["--simulate", "--frame-delay-ms", "5", "--backend", "nope"]).unwrap();
        assert_eq!(
            config.backend,
            BackendSource::Simulated {
                frame_delay: Duration::from_millis(5)
            }
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["--backend", "ftp://x"]).is_err());
        assert!(parse(&["--backend", "http://x", "--tick-ms", "0"]).is_err());
        assert!(parse(&["--backend", "http://x", "--port", "0"]).is_err());
        assert!(parse(&["--backend", "http://x", "--model", "sam"]).is_err());
        assert!(parse(&["--backend", "http://x", "--autostart", "--start", "1,2"]).is_err());
    }

    #[test]
    fn prefills_route_draft() {
        let config = parse(&[
            "--simulate",
            "--start",
            "37.7749,-122.4194",
            "--end",
            "37.8049,-122.2711",
            "--points",
            "4",
            "--model",
            "yolo",
            "--autostart",
        ])
        .unwrap();
        let route = &config.viewer.route;
        assert_eq!(route.start_lat, "37.774900");
        assert_eq!(route.end_lng, "-122.271100");
        assert_eq!(route.num_points, "4");
        assert_eq!(route.model, DetectionModel::Yolo);
        assert!(config.viewer.autostart);
    }

    #[test]
    fn parses_points() {
        assert_eq!(parse_point(" 1.5 , -2 ").unwrap(), LatLng::new(1.5, -2.0));
        assert!(parse_point("1.5").is_err());
        assert!(parse_point("91,0").is_err());
    }
}
