use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use frame_ingest::{Direction, route_points, simulate::HEADING_ORDER, streetview_url};
use playback::{ViewerCliArgs, ViewerConfig, runtime::config::parse_point};
use serde::Serialize;

use crate::viewer;

#[derive(Debug, Parser)]
#[command(
    name = "route-viewer",
    about = "Synchronized four-direction playback of streamed route captures"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream frames from the backend and serve the control surface.
    View(ViewerCliArgs),
    /// Same as `view`, with frames generated locally.
    Simulate(ViewerCliArgs),
    /// Print the sampled points (and Street View URLs) for a route.
    Coords(CoordsArgs),
}

#[derive(Debug, Args)]
pub struct CoordsArgs {
    /// Route start as `LAT,LNG`.
    #[arg(long, value_name = "LAT,LNG", allow_hyphen_values = true)]
    pub start: String,
    /// Route end as `LAT,LNG`.
    #[arg(long, value_name = "LAT,LNG", allow_hyphen_values = true)]
    pub end: String,
    /// Number of evenly spaced points, including both ends.
    #[arg(long, value_name = "N")]
    pub points: u32,
    /// Include per-direction image URLs.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub urls: bool,
}

pub fn handle_command(command: Command) -> Result<()> {
    match command {
        Command::View(args) => viewer::run(ViewerConfig::try_from(args)?),
        Command::Simulate(mut args) => {
            args.simulate = true;
            viewer::run(ViewerConfig::try_from(args)?)
        }
        Command::Coords(args) => print_coordinates(&args, &mut io::stdout().lock()),
    }
}

#[derive(Serialize)]
struct SampledPoint {
    index: usize,
    lat: f64,
    lng: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<DirectionImage>,
}

#[derive(Serialize)]
struct DirectionImage {
    direction: Direction,
    heading: u16,
    url: String,
}

fn print_coordinates(args: &CoordsArgs, out: &mut impl Write) -> Result<()> {
    let start = parse_point(&args.start).context("Invalid --start")?;
    let end = parse_point(&args.end).context("Invalid --end")?;
    if args.points == 0 {
        anyhow::bail!("--points must be at least 1");
    }

    let points = route_points((start.lat, start.lng), (end.lat, end.lng), args.points);
    for (index, (lat, lng)) in points.enumerate() {
        let images = if args.urls {
            HEADING_ORDER
                .into_iter()
                .map(|direction| DirectionImage {
                    direction,
                    heading: direction.heading_degrees(),
                    url: streetview_url(lat, lng, direction),
                })
                .collect()
        } else {
            Vec::new()
        };
        let line = serde_json::to_string(&SampledPoint {
            index,
            lat,
            lng,
            images,
        })?;
        writeln!(out, "{line}")?;
    }
    Ok(())
}
