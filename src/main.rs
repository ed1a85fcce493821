// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Parser;
use routecalc::calc::{self, DriverPref, ListKind, OrigDest, RouteRequest, SubRouteList};
use routecalc::{distance, map, vehicle};

#[derive(Debug, thiserror::Error)]
#[error("{0}: {1}")]
struct MapLoadError(PathBuf, #[source] map::ReadError);

#[derive(Debug, thiserror::Error)]
#[error("no route found between {0:#x} and {1:#x}")]
struct NoRouteError(u32, u32);

#[derive(Parser)]
struct Cli {
    /// The path to the map tile (XML, optionally gzip or bzip2 compressed)
    map_file: PathBuf,

    /// Item id of the start node
    #[arg(value_parser = parse_u32)]
    start: u32,

    /// Item id of the end node
    #[arg(value_parser = parse_u32)]
    end: u32,

    /// Route from the end node towards the start node
    #[arg(long)]
    backward: bool,

    /// Allowed vehicles mask, with optional avoidance flags
    #[arg(long, value_parser = parse_u32, default_value_t = vehicle::PASSENGER_CAR)]
    vehicle: u32,

    /// Weights of the distance, time, disturbed time and per-connection costs
    #[arg(long, num_args = 4, value_names = ["A", "B", "C", "D"], default_values_t = [0, 1, 0, 0])]
    costs: Vec<u32>,

    /// Item ids of nodes whose outgoing connections are blocked for this route
    #[arg(long = "block", value_parser = parse_u32)]
    blocked: Vec<u32>,

    /// Print the cost sums of the route
    #[arg(long)]
    sums: bool,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("{}: {}", s, e))
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    colog::default_builder().filter_level(level).init();

    let tile = load_map(&cli.map_file)?;
    let map_id = tile.map_id();

    let options = routecalc::Options {
        background_reset: false,
    };
    let mut calculator = routecalc::RouteCalculator::with_options(tile, options);

    calculator.with_map(|m| -> Result<(), map::MapError> {
        for &node in &cli.blocked {
            m.avoid_node(node, false)?;
        }
        Ok(())
    })??;

    let pref = DriverPref::new(cli.vehicle).with_costs(cli.costs[0], cli.costs[1], cli.costs[2], cli.costs[3]);
    let kind = if pref.only_walking() {
        ListKind::LowerLevelWalk
    } else {
        ListKind::LowerLevel
    };

    let req = RouteRequest {
        origins: vec![OrigDest::new(map_id, cli.start, 0)],
        destinations: vec![OrigDest::new(map_id, cli.end, calc::MAX_OFFSET)],
        pref,
        original_request: true,
        calc_cost_sums: cli.sums,
        ..Default::default()
    };

    let incoming = SubRouteList::new(kind, !cli.backward);
    let mut result = SubRouteList::new(kind, !cli.backward);
    calculator.route(&req, &incoming, &mut result)?;

    let route = result
        .cheapest_complete()
        .ok_or(NoRouteError(cli.start, cli.end))?;

    let coordinates = calculator.with_map(|m| {
        route
            .route_nodes()
            .filter_map(|id| m.graph().node_by_id(id))
            .map(|n| (distance::mc2_to_deg(n.lon), distance::mc2_to_deg(n.lat)))
            .collect::<Vec<_>>()
    })?;

    println!("{{");
    println!("  \"type\": \"FeatureCollection\",");
    println!("  \"features\": [");
    println!("    {{");
    println!("      \"type\": \"Feature\",");
    println!("      \"properties\": {{");
    println!("        \"cost\": {},", route.cost());
    if let (true, Some(e)) = (cli.sums, route.externals.first()) {
        println!("        \"distance\": {},", e.sums.a);
        println!("        \"time\": {},", e.sums.b);
        println!("        \"disturbed_time\": {},", e.sums.c);
    }
    println!(
        "        \"nodes\": [{}]",
        route
            .nodes
            .iter()
            .map(|id| format!("\"{:#x}\"", id))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("      }},");

    println!("      \"geometry\": {{");
    println!("        \"type\": \"LineString\",");
    println!("        \"coordinates\": [");

    let mut points = coordinates.iter().peekable();
    while let Some((lon, lat)) = points.next() {
        let suffix = if points.peek().is_some() { "," } else { "" };
        println!("          [{}, {}]{}", lon, lat, suffix);
    }

    println!("        ]");
    println!("      }}");
    println!("    }}");
    println!("  ]");
    println!("}}");

    Ok(())
}

fn load_map<P: AsRef<Path>>(path: P) -> Result<map::RoutingMap, MapLoadError> {
    map::load_from_file(path.as_ref(), map::FileFormat::Unknown)
        .map_err(|e| MapLoadError(PathBuf::from(path.as_ref()), e))
}
