//! Command-line argument parsing for the Cadenza console.

use clap::Parser;


/// Cadenza - a console harness for the playback session engine.
#[derive( Parser, Debug )]
#[command( name = "cadenza" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Channel to join on startup.
    #[arg( short, long )]
    pub channel: Option<u64>,

    /// Simulated playback speedup. 60 means a 3-minute track
    /// "plays" for 3 seconds.
    #[arg( long )]
    pub time_scale: Option<u32>,

    /// Log filter, overriding RUST_LOG (e.g. "cadenza_core=debug").
    #[arg( long )]
    pub log: Option<String>,
}
