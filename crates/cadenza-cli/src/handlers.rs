//! Maps parsed commands onto session operations and renders replies.
//!
//! Reply text is what a chat frontend would send back; the console
//! prints it verbatim. Session errors that correspond to ordinary user
//! mistakes become friendly messages, anything else is reported as-is.

use cadenza_core::lyrics::split_query;
use cadenza_core::{
    command, format_duration, Command, Enqueued, ExtractError, LyricsError, LyricsSource,
    LoopMode, SessionError, SessionKey, SessionStore, Shuffled, Track,
};


fn track_line( track: &Track ) -> String {
    format!( "**{}** [{}]", track.title, format_duration( track.duration_secs ) )
}


fn timestamp( seconds: u64 ) -> String {
    format!( "{}:{:02}", seconds / 60, seconds % 60 )
}


fn loop_label( mode: LoopMode ) -> &'static str {
    match mode {
        LoopMode::Off => "Looping disabled.",
        LoopMode::Track => "Looping current track.",
        LoopMode::Queue => "Looping entire queue.",
    }
}


/// Runs one command against the joined channel's session and returns
/// the reply to print.
pub async fn dispatch(
    store: &SessionStore,
    lyrics: &dyn LyricsSource,
    channel: Option<SessionKey>,
    cmd: Command,
) -> String {
    // Help needs no session
    if let Command::Help = cmd {
        return command::help_text().to_string();
    }

    let key = match channel {
        Some( key ) => key,
        None => {
            return match cmd {
                Command::Stop => "Not connected to voice.".to_string(),
                _ => "You need to be in a voice channel.".to_string(),
            };
        }
    };

    match cmd {
        Command::Play { query } => {
            let session = store.get_or_create( key ).await;
            match session.play( &query ).await {
                Ok( Enqueued::Started( track ) ) => {
                    format!( "Now playing: {}", track_line( &track ) )
                }
                Ok( Enqueued::Queued { track, position } ) => {
                    format!( "Added to queue (#{}): {}", position, track_line( &track ) )
                }
                Ok( Enqueued::Playlist { added: 0, .. } ) => {
                    "No tracks found in that playlist.".to_string()
                }
                Ok( Enqueued::Playlist { added, started } ) => {
                    let mut reply =
                        format!( "Added **{}** tracks from playlist to the queue.", added );
                    if let Some( track ) = started {
                        reply.push_str( &format!( "\nNow playing: {}", track_line( &track ) ) );
                    }
                    reply
                }
                Err( SessionError::Extract( ExtractError::UnsupportedSource( msg ) ) ) => msg,
                Err( SessionError::Extract( e ) ) => format!( "Failed to extract audio: {}", e ),
                Err( e ) => format!( "Error: {}", e ),
            }
        }

        Command::Pause => match session_for( store, key ).await {
            Some( session ) => match session.pause().await {
                Ok(()) => "Paused.".to_string(),
                Err( SessionError::NotPlaying ) => "Nothing is playing.".to_string(),
                Err( e ) => format!( "Error: {}", e ),
            },
            None => "Nothing is playing.".to_string(),
        },

        Command::Resume => match session_for( store, key ).await {
            Some( session ) => match session.resume().await {
                Ok(()) => "Resumed.".to_string(),
                Err( SessionError::NotPaused ) => "Nothing is paused.".to_string(),
                Err( e ) => format!( "Error: {}", e ),
            },
            None => "Nothing is paused.".to_string(),
        },

        Command::Skip => match session_for( store, key ).await {
            Some( session ) => match session.skip().await {
                Ok(()) => "Skipped.".to_string(),
                Err( SessionError::NotPlaying ) => "Nothing is playing.".to_string(),
                Err( e ) => format!( "Error: {}", e ),
            },
            None => "Nothing is playing.".to_string(),
        },

        Command::Stop => {
            if store.teardown( key ).await {
                "Stopped and disconnected.".to_string()
            } else {
                "Not connected to voice.".to_string()
            }
        }

        Command::Seek { seconds } => match session_for( store, key ).await {
            Some( session ) => match session.seek( seconds ).await {
                Ok(()) => format!( "Seeked to **{}**.", timestamp( seconds ) ),
                Err( SessionError::NotPlaying ) => "Nothing is playing.".to_string(),
                Err( e ) => format!( "Error: {}", e ),
            },
            None => "Nothing is playing.".to_string(),
        },

        Command::Queue => match session_for( store, key ).await {
            Some( session ) => {
                let ( current, queued ) = session.queue_snapshot().await;
                if current.is_none() && queued.is_empty() {
                    return "The queue is empty.".to_string();
                }

                let mut lines = Vec::new();
                if let Some( ref track ) = current {
                    lines.push( format!(
                        "**Now playing:** {} [{}]",
                        track.title,
                        format_duration( track.duration_secs ),
                    ));
                }
                for ( i, track ) in queued.iter().enumerate() {
                    lines.push( format!(
                        "`{}.` {} [{}]",
                        i + 1,
                        track.title,
                        format_duration( track.duration_secs ),
                    ));
                }
                if queued.is_empty() && current.is_some() {
                    lines.push( "*No more songs in queue.*".to_string() );
                }
                lines.join( "\n" )
            }
            None => "The queue is empty.".to_string(),
        },

        Command::NowPlaying => match session_for( store, key ).await {
            Some( session ) => match session.now_playing().await {
                Some( track ) => format!(
                    "Now playing: {}\n{}",
                    track_line( &track ),
                    track.page_url,
                ),
                None => "Nothing is playing right now.".to_string(),
            },
            None => "Nothing is playing right now.".to_string(),
        },

        Command::Shuffle => match session_for( store, key ).await {
            Some( session ) => match session.shuffle().await {
                Shuffled::Ok( n ) => format!( "Shuffled **{}** songs.", n ),
                Shuffled::TooFew => "Not enough songs in the queue to shuffle.".to_string(),
            },
            None => "Not enough songs in the queue to shuffle.".to_string(),
        },

        Command::Loop { mode } => {
            let session = store.get_or_create( key ).await;
            let new_mode = session.set_loop( mode.map( Into::into ) ).await;
            loop_label( new_mode ).to_string()
        }

        Command::Clear => match session_for( store, key ).await {
            Some( session ) => {
                let count = session.clear_queue().await;
                format!( "Cleared **{}** song(s) from the queue.", count )
            }
            None => "Cleared **0** song(s) from the queue.".to_string(),
        },

        Command::Remove { index } => match session_for( store, key ).await {
            Some( session ) => match session.remove_at( index ).await {
                Ok( track ) => format!( "Removed **{}** from the queue.", track.title ),
                Err( SessionError::IndexOutOfRange { len, .. } ) => {
                    format!( "Invalid index. Queue has {} song(s).", len )
                }
                Err( e ) => format!( "Error: {}", e ),
            },
            None => "Invalid index. Queue has 0 song(s).".to_string(),
        },

        Command::Volume { level } => {
            let session = store.get_or_create( key ).await;
            match level {
                None => format!( "Volume: **{}%**", session.volume_percent().await ),
                Some( level ) => match session.set_volume( level ).await {
                    Ok( _ ) => format!( "Volume set to **{}%**.", level ),
                    Err( SessionError::InvalidVolume( _ ) ) => {
                        "Volume must be between 0 and 100.".to_string()
                    }
                    Err( e ) => format!( "Error: {}", e ),
                },
            }
        }

        Command::Lyrics { query } => {
            let query = match query {
                Some( q ) => q,
                None => {
                    let current = match session_for( store, key ).await {
                        Some( session ) => session.now_playing().await,
                        None => None,
                    };
                    match current {
                        Some( track ) => track.title,
                        None => {
                            return "Nothing is playing. Provide a song name to search."
                                .to_string();
                        }
                    }
                }
            };

            let ( artist, title ) = split_query( &query );
            match lyrics.lookup( artist, title ).await {
                Ok( text ) => format!( "**Lyrics for: {}**\n{}", query, text ),
                Err( LyricsError::NotFound ) => format!( "No lyrics found for **{}**.", query ),
                Err( LyricsError::Failed( _ ) ) => {
                    format!( "Could not find lyrics for **{}**.", query )
                }
            }
        }

        Command::Help => unreachable!( "handled above" ),
    }
}


/// The listener roster of a channel changed. Tears the session down
/// when the bot is the only one left.
pub async fn voice_occupancy_changed(
    store: &SessionStore,
    key: SessionKey,
    listeners: usize,
) -> bool {
    if listeners > 0 {
        return false;
    }

    let left = store.teardown( key ).await;
    if left {
        tracing::info!( channel = key.0, "channel empty, leaving" );
    }
    left
}


async fn session_for( store: &SessionStore, key: SessionKey ) -> Option<cadenza_core::SessionHandle> {
    store.get( key ).await
}


#[cfg( test )]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sim::{ SimExtractor, TimerBackend };
    use cadenza_core::SessionConfig;


    struct NoLyrics;


    #[async_trait::async_trait]
    impl LyricsSource for NoLyrics {
        async fn lookup( &self, _artist: &str, _title: &str ) -> Result<String, LyricsError> {
            Err( LyricsError::NotFound )
        }
    }


    fn test_store() -> SessionStore {
        SessionStore::new(
            Arc::new( SimExtractor::new() ),
            Arc::new( TimerBackend::new( 1 ) ),
            SessionConfig::default(),
        )
    }


    #[tokio::test]
    async fn test_playlist_reply_announces_first_track() {
        let store = test_store();
        let key = SessionKey( 1 );

        let cmd = Command::parse( "play https://sim.example/mix?list=3" ).unwrap();
        let reply = dispatch( &store, &NoLyrics, Some( key ), cmd ).await;

        assert!( reply.contains( "Added **3** tracks from playlist to the queue." ) );
        assert!( reply.contains( "\nNow playing: **" ) );
    }


    #[tokio::test]
    async fn test_playlist_reply_while_playing_adds_only() {
        let store = test_store();
        let key = SessionKey( 1 );

        let play = Command::parse( "play some song" ).unwrap();
        dispatch( &store, &NoLyrics, Some( key ), play ).await;
        tokio::time::sleep( std::time::Duration::from_millis( 50 ) ).await;

        let cmd = Command::parse( "play https://sim.example/mix?list=2" ).unwrap();
        let reply = dispatch( &store, &NoLyrics, Some( key ), cmd ).await;

        assert!( reply.contains( "Added **2** tracks from playlist to the queue." ) );
        assert!( !reply.contains( "Now playing" ) );
    }


    #[tokio::test]
    async fn test_commands_without_channel() {
        let store = test_store();

        let reply = dispatch( &store, &NoLyrics, None, Command::Pause ).await;
        assert_eq!( reply, "You need to be in a voice channel." );

        let reply = dispatch( &store, &NoLyrics, None, Command::Stop ).await;
        assert_eq!( reply, "Not connected to voice." );
    }
}
