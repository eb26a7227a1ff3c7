//! Cadenza console - interactive harness for the session engine.
//!
//! Stands in for a chat frontend: you "join" a channel, type the same
//! commands a bot would accept, and watch simulated playback on a
//! scaled clock. Useful for poking at queue and loop behavior without
//! a voice connection.

mod cli;
mod handlers;
mod lyrics_ovh;
mod settings;
mod sim;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::{ AsyncBufReadExt, AsyncWriteExt, BufReader };
use tracing_subscriber::EnvFilter;

use cadenza_core::{ Command, SessionConfig, SessionKey, SessionStore };

use cli::Args;
use lyrics_ovh::LyricsOvh;
use settings::Settings;
use sim::{ SimExtractor, TimerBackend };


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some( spec ) => EnvFilter::new( spec ),
        None => EnvFilter::try_from_default_env().unwrap_or_else( |_| EnvFilter::new( "info" ) ),
    };
    tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_target( false )
        .init();

    let settings = Settings::load();
    let time_scale = args.time_scale.unwrap_or( settings.time_scale );

    let config = SessionConfig {
        default_volume: ( settings.default_volume.min( 100 ) as f32 ) / 100.0,
        extract_timeout: Duration::from_secs( settings.extract_timeout_secs ),
    };

    let store = SessionStore::new(
        Arc::new( SimExtractor::new() ),
        Arc::new( TimerBackend::new( time_scale ) ),
        config,
    );
    let lyrics = LyricsOvh::new();

    let mut channel: Option<SessionKey> = args.channel.map( SessionKey );
    if let Some( key ) = channel {
        println!( "Joined channel {}.", key.0 );
    }

    println!( "Cadenza console (time scale {}x). Type 'help' for commands, 'quit' to exit.", time_scale );

    let mut lines = BufReader::new( tokio::io::stdin() ).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all( b"> " ).await?;
        stdout.flush().await?;

        let line = match lines.next_line().await? {
            Some( line ) => line,
            None => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        // Console-only verbs, everything else is a bot command
        let ( verb, rest ) = match input.split_once( ' ' ) {
            Some(( v, r )) => ( v, r.trim() ),
            None => ( input, "" ),
        };

        match verb {
            "quit" | "exit" => break,

            "join" => match rest.parse::<u64>() {
                Ok( id ) => {
                    channel = Some( SessionKey( id ) );
                    println!( "Joined channel {}.", id );
                }
                Err( _ ) => println!( "Usage: join <channel id>" ),
            },

            // Simulates everyone else leaving the channel
            "listeners" => match ( channel, rest.parse::<usize>() ) {
                ( Some( key ), Ok( count ) ) => {
                    if handlers::voice_occupancy_changed( &store, key, count ).await {
                        println!( "Left channel {} (empty).", key.0 );
                    }
                }
                ( None, _ ) => println!( "You need to be in a voice channel." ),
                ( _, Err( _ ) ) => println!( "Usage: listeners <count>" ),
            },

            _ => match Command::parse( input ) {
                Ok( cmd ) => {
                    let reply = handlers::dispatch( &store, &lyrics, channel, cmd ).await;
                    println!( "{}", reply );
                }
                Err( e ) => println!( "{}", e ),
            },
        }
    }

    // Drop every live session so timers stop cleanly
    store.teardown_all().await;

    Ok(())
}
