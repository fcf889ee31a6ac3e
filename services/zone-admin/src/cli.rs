use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "zone-admin", version, about = "Inspect and edit the zone store")]
pub struct Cli {
    /// SQLite URL; overrides ZONE_SQLITE_URL and the data dir default.
    #[arg(long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an empty zone.
    AddZone { label: String },
    DeleteZone { zone: i64 },
    /// Change a zone's label, refusing labels already in use.
    Rename { zone: i64, label: String },
    /// Append a vertex; it gets its place in the ring on the next `commit`.
    AddPoint {
        zone: i64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
    },
    /// Drop a vertex from the ring and rewrite the zone.
    RemovePoint { zone: i64, point: i64 },
    /// Rewrite the zone's ring from its current points.
    Commit { zone: i64 },
    Show { zone: i64 },
    Point { point: i64 },
    List,
    Bounds { zone: i64 },
    /// Zones strictly containing the position, smallest first.
    Containing {
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
    },
    /// Zones overlapping the given zone, largest first.
    Intersecting { zone: i64 },
    /// Metres to one zone (`--zone`) or to the closest zone.
    Distance {
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(long)]
        zone: Option<i64>,
    },
    Occupy {
        zone: i64,
        #[arg(long)]
        off: bool,
    },
    Occupied,
    Select {
        zone: i64,
        #[arg(long)]
        off: bool,
    },
    Selected,
    ClearSelection,
    IsSelected { zone: i64 },
}
