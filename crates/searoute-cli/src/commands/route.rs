use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use searoute_lib::{plan_route, PortId, SqliteGateway, TaskRequest};

use searoute_cli::output::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Departure port id.
    #[arg(long = "from")]
    pub from: PortId,
    /// Destination port id.
    #[arg(long = "to")]
    pub to: PortId,
    /// Vessel speed in knots. Adds per-waypoint travel times.
    #[arg(long, allow_negative_numbers = true)]
    pub speed: Option<f64>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub fn run(database: &Path, args: &RouteArgs) -> Result<()> {
    if !database.is_file() {
        bail!("port database {} not found", database.display());
    }

    let gateway = SqliteGateway::open(database);
    let mut request = TaskRequest::new("cli", args.from, args.to);
    request.vessel_speed_knots = args.speed;

    let planned = plan_route(&gateway, &request).with_context(|| {
        format!(
            "failed to plan route from port {} to port {}",
            args.from, args.to
        )
    })?;

    let rendered = output::render(&planned, args.format).context("failed to render route")?;
    println!("{}", rendered.trim_end());
    Ok(())
}
