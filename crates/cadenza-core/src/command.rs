//! Command parsing.
//!
//! Thin translation layer from user intent to session operations.
//! Commands are parsed from chat-style input; execution lives with the
//! frontend's handlers.

use std::str::FromStr;

use thiserror::Error;

use crate::session::LoopMode;


/// Errors that can occur during command parsing.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),

    #[error( "Invalid timestamp: {0}" )]
    InvalidTimestamp( String ),
}


/// Parsed user command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Playback commands
    Play { query: String },
    Pause,
    Resume,
    Skip,
    Stop,
    Seek { seconds: u64 },

    // Queue commands
    Queue,
    NowPlaying,
    Shuffle,
    Loop { mode: Option<LoopModeArg> },
    Clear,
    Remove { index: usize },

    // Misc
    Volume { level: Option<u32> },
    Lyrics { query: Option<String> },
    Help,
}


/// Loop mode argument for parsing.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum LoopModeArg {
    Off,
    Track,
    Queue,
}


impl From<LoopModeArg> for LoopMode {
    fn from( arg: LoopModeArg ) -> Self {
        match arg {
            LoopModeArg::Off => LoopMode::Off,
            LoopModeArg::Track => LoopMode::Track,
            LoopModeArg::Queue => LoopMode::Queue,
        }
    }
}


impl FromStr for LoopModeArg {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok( LoopModeArg::Off ),
            "track" => Ok( LoopModeArg::Track ),
            "queue" => Ok( LoopModeArg::Queue ),
            _ => Err( CommandError::InvalidArgument(
                format!( "Invalid loop mode: '{}'. Use 'off', 'track', or 'queue'", s )
            )),
        }
    }
}


impl Command {
    /// Parses a command line (without any prefix character).
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() );

        match cmd.as_str() {
            // Playback commands
            "play" | "p" => {
                let query = args
                    .ok_or_else( || CommandError::MissingArgument( "query".into() ) )?;
                Ok( Command::Play { query: query.to_string() } )
            }
            "pause" => Ok( Command::Pause ),
            "resume" | "unpause" => Ok( Command::Resume ),
            "skip" | "s" | "next" => Ok( Command::Skip ),
            "stop" | "leave" => Ok( Command::Stop ),
            "seek" => {
                let timestamp = args
                    .ok_or_else( || CommandError::MissingArgument( "timestamp".into() ) )?;
                let seconds = parse_timestamp( timestamp )?;
                Ok( Command::Seek { seconds } )
            }

            // Queue commands
            "queue" | "q" => Ok( Command::Queue ),
            "nowplaying" | "np" => Ok( Command::NowPlaying ),
            "shuffle" => Ok( Command::Shuffle ),
            "loop" | "repeat" => {
                let mode = args.map( |s| s.parse() ).transpose()?;
                Ok( Command::Loop { mode } )
            }
            "clear" => Ok( Command::Clear ),
            "remove" | "rm" => {
                let arg = args
                    .ok_or_else( || CommandError::MissingArgument( "queue position".into() ) )?;
                let index = arg.parse().map_err( |_| {
                    CommandError::InvalidArgument( format!( "Invalid queue position: {}", arg ) )
                })?;
                Ok( Command::Remove { index } )
            }

            // Misc
            "volume" | "vol" => {
                let level = args.map( |s| {
                    s.parse().map_err( |_| {
                        CommandError::InvalidArgument( format!( "Invalid volume: {}", s ) )
                    })
                }).transpose()?;
                Ok( Command::Volume { level } )
            }
            "lyrics" => Ok( Command::Lyrics { query: args.map( str::to_string ) } ),
            "help" | "h" => Ok( Command::Help ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


/// Parses a timestamp like "90", "1:30", or "1:02:05" into seconds.
pub fn parse_timestamp( s: &str ) -> Result<u64, CommandError> {
    let s = s.trim();
    let parts: Vec<&str> = s.split( ':' ).collect();

    if parts.is_empty() || parts.len() > 3 {
        return Err( CommandError::InvalidTimestamp( s.to_string() ) );
    }

    let mut values = Vec::with_capacity( parts.len() );
    for part in &parts {
        let value: u64 = part
            .parse()
            .map_err( |_| CommandError::InvalidTimestamp( s.to_string() ) )?;
        values.push( value );
    }

    let seconds = match values.as_slice() {
        [ s ] => *s,
        [ m, s ] => m * 60 + s,
        [ h, m, s ] => h * 3600 + m * 60 + s,
        _ => unreachable!(),
    };

    Ok( seconds )
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Playback Commands:
  play <query>     Play a URL, search term, or playlist
  pause            Pause the current track
  resume           Resume a paused track
  skip             Skip to the next track
  stop             Stop, clear the queue, and leave
  seek <time>      Seek to a position (e.g. 1:30)

Queue Commands:
  queue            Show the queue
  nowplaying       Show the current track
  shuffle          Shuffle the queue
  loop [mode]      Loop mode (off/track/queue, cycles if omitted)
  clear            Clear the queue
  remove <n>       Remove queue entry n

Other Commands:
  volume [0-100]   Show or set the volume
  lyrics [query]   Lyrics for the current track or a search
  help             Show this help"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_play() {
        let cmd = Command::parse( "play never gonna give you up" ).unwrap();
        assert_eq!( cmd, Command::Play { query: "never gonna give you up".to_string() } );
    }


    #[test]
    fn test_parse_play_missing_query() {
        let result = Command::parse( "play" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_loop_with_mode() {
        let cmd = Command::parse( "loop queue" ).unwrap();
        assert_eq!( cmd, Command::Loop { mode: Some( LoopModeArg::Queue ) } );
    }


    #[test]
    fn test_parse_loop_cycle() {
        let cmd = Command::parse( "loop" ).unwrap();
        assert_eq!( cmd, Command::Loop { mode: None } );
    }


    #[test]
    fn test_parse_loop_invalid_mode() {
        let result = Command::parse( "loop forever" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "vol" ).unwrap(), Command::Volume { level: None } );
        assert_eq!( Command::parse( "volume 70" ).unwrap(), Command::Volume { level: Some( 70 ) } );
    }


    #[test]
    fn test_parse_remove() {
        assert_eq!( Command::parse( "remove 3" ).unwrap(), Command::Remove { index: 3 } );
        assert!( matches!(
            Command::parse( "remove x" ),
            Err( CommandError::InvalidArgument( _ ) )
        ));
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_timestamp_seconds() {
        assert_eq!( parse_timestamp( "90" ).unwrap(), 90 );
    }


    #[test]
    fn test_timestamp_minutes() {
        assert_eq!( parse_timestamp( "1:30" ).unwrap(), 90 );
    }


    #[test]
    fn test_timestamp_hours() {
        assert_eq!( parse_timestamp( "1:02:05" ).unwrap(), 3725 );
    }


    #[test]
    fn test_timestamp_invalid() {
        assert!( matches!( parse_timestamp( "abc" ), Err( CommandError::InvalidTimestamp( _ ) ) ) );
        assert!( matches!( parse_timestamp( "1:2:3:4" ), Err( CommandError::InvalidTimestamp( _ ) ) ) );
        assert!( matches!( parse_timestamp( "1:xx" ), Err( CommandError::InvalidTimestamp( _ ) ) ) );
    }
}
