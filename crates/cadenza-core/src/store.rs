//! Session registry and command-level session operations.
//!
//! The store owns the channel-id -> session mapping with an atomic
//! get-or-create; each session gets its own driver task at creation.
//! [`SessionHandle`] exposes the operations command handlers call.
//! Discipline for every operation: take the session mutex, mutate,
//! drop it - extractor and backend calls are never awaited while the
//! lock is held, and the map lock is never held across an await.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{ mpsc, Mutex, RwLock };

use crate::driver::{ self, SessionEvent };
use crate::extract::{ self, ExtractError, Extractor, SourceKind };
use crate::player::{ AudioBackend, Completion };
use crate::queue::Shuffled;
use crate::session::{ LoopMode, PlaybackState, SessionError, SessionState };
use crate::track::Track;


/// Channel identifier a session is keyed by.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub struct SessionKey( pub u64 );


/// Knobs shared by every session.
#[derive( Debug, Clone )]
pub struct SessionConfig {
    /// Gain applied to invocations until a volume command changes it.
    pub default_volume: f32,

    /// Deadline for a single extractor call.
    pub extract_timeout: Duration,
}


impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_volume: 0.5,
            extract_timeout: Duration::from_secs( 20 ),
        }
    }
}


/// What a play command did with the extraction result.
#[derive( Debug )]
pub enum Enqueued {
    /// The session was idle; playback starts with this track.
    Started( Track ),

    /// Appended behind the current track at a 1-based position.
    Queued { track: Track, position: usize },

    /// Playlist entries appended. `started` carries the first entry
    /// when the session was idle and playback was kicked off from it.
    Playlist { added: usize, started: Option<Track> },
}


pub( crate ) struct SessionCtx {
    pub( crate ) key: SessionKey,
    pub( crate ) state: Mutex<SessionState>,
    pub( crate ) events: mpsc::UnboundedSender<SessionEvent>,
    pub( crate ) extractor: Arc<dyn Extractor>,
    pub( crate ) backend: Arc<dyn AudioBackend>,
    pub( crate ) extract_timeout: Duration,
}


/// Cheap-to-clone handle to one session.
#[derive( Clone )]
pub struct SessionHandle {
    pub( crate ) ctx: Arc<SessionCtx>,
}


/// Registry of all sessions in the process.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionKey, SessionHandle>>,
    extractor: Arc<dyn Extractor>,
    backend: Arc<dyn AudioBackend>,
    config: SessionConfig,
}


impl SessionStore {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        backend: Arc<dyn AudioBackend>,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new( HashMap::new() ),
            extractor,
            backend,
            config,
        }
    }


    /// Looks a session up, creating it (and its driver task) if absent.
    pub async fn get_or_create( &self, key: SessionKey ) -> SessionHandle {
        if let Some( handle ) = self.sessions.read().await.get( &key ) {
            return handle.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry( key )
            .or_insert_with( || {
                tracing::debug!( key = key.0, "creating session" );
                SessionHandle::spawn(
                    key,
                    Arc::clone( &self.extractor ),
                    Arc::clone( &self.backend ),
                    &self.config,
                )
            })
            .clone()
    }


    pub async fn get( &self, key: SessionKey ) -> Option<SessionHandle> {
        self.sessions.read().await.get( &key ).cloned()
    }


    /// Stops and fully removes a session (bot left the channel).
    /// Returns false if no session existed.
    pub async fn teardown( &self, key: SessionKey ) -> bool {
        let removed = self.sessions.write().await.remove( &key );

        match removed {
            Some( handle ) => {
                let _ = handle.stop().await;
                let _ = handle.ctx.events.send( SessionEvent::Shutdown );
                true
            }
            None => false,
        }
    }


    /// Stops and removes every session. For process shutdown.
    pub async fn teardown_all( &self ) {
        let removed: Vec<SessionHandle> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map( |( _, handle )| handle ).collect()
        };

        for handle in removed {
            let _ = handle.stop().await;
            let _ = handle.ctx.events.send( SessionEvent::Shutdown );
        }
    }
}


impl SessionHandle {
    pub( crate ) fn spawn(
        key: SessionKey,
        extractor: Arc<dyn Extractor>,
        backend: Arc<dyn AudioBackend>,
        config: &SessionConfig,
    ) -> Self {
        let ( events, rx ) = mpsc::unbounded_channel();
        let ctx = Arc::new( SessionCtx {
            key,
            state: Mutex::new( SessionState::new( config.default_volume ) ),
            events,
            extractor,
            backend,
            extract_timeout: config.extract_timeout,
        });

        tokio::spawn( driver::run( Arc::clone( &ctx ), rx ) );

        Self { ctx }
    }


    pub fn key( &self ) -> SessionKey {
        self.ctx.key
    }


    /// Resolves a query and enqueues the result. Single tracks and
    /// playlists both auto-start when the session is idle - unless a
    /// stop interleaved with the resolution, in which case the result
    /// is applied to the queue but the session stays idle.
    pub async fn play( &self, query: &str ) -> Result<Enqueued, SessionError> {
        let epoch_before = {
            let state = self.ctx.state.lock().await;
            state.epoch
        };

        // Classification is cheap and happens before any slow call
        match SourceKind::classify( query ) {
            SourceKind::SpotifyCollection => {
                return Err( ExtractError::UnsupportedSource(
                    "Only Spotify track links are supported. Album and playlist links \
                     require Spotify API credentials."
                        .to_string(),
                ).into() );
            }
            SourceKind::Playlist => {
                let entries = extract::resolve_playlist_with_timeout(
                    self.ctx.extractor.as_ref(),
                    query,
                    self.ctx.extract_timeout,
                ).await?;

                let mut state = self.ctx.state.lock().await;
                let was_empty = state.queue.is_empty();
                let added = state.enqueue_many( entries );

                let started = if added > 0
                    && state.playback_state() == PlaybackState::Idle
                    && state.epoch == epoch_before
                {
                    let _ = self.ctx.events.send( SessionEvent::Kick {
                        generation: state.generation,
                    });
                    if was_empty {
                        state.queue.iter().next().cloned()
                    } else {
                        None
                    }
                } else {
                    None
                };

                Ok( Enqueued::Playlist { added, started } )
            }
            _ => {
                let track = extract::resolve_with_timeout(
                    self.ctx.extractor.as_ref(),
                    query,
                    self.ctx.extract_timeout,
                ).await?;

                let mut state = self.ctx.state.lock().await;
                let was_empty = state.queue.is_empty();
                let position = state.enqueue( track.clone() );

                if state.playback_state() == PlaybackState::Idle && state.epoch == epoch_before {
                    let _ = self.ctx.events.send( SessionEvent::Kick {
                        generation: state.generation,
                    });
                    // A kick racing an earlier one is deduped by the
                    // generation tag; only the front of an empty queue
                    // reports as started.
                    if was_empty {
                        return Ok( Enqueued::Started( track ) );
                    }
                }

                Ok( Enqueued::Queued { track, position } )
            }
        }
    }


    pub async fn pause( &self ) -> Result<(), SessionError> {
        let handle = {
            let state = self.ctx.state.lock().await;
            if state.playback_state() != PlaybackState::Playing {
                return Err( SessionError::NotPlaying );
            }
            state.handle.ok_or( SessionError::NotPlaying )?
        };

        self.ctx.backend.pause( self.ctx.key, handle ).await?;

        let mut state = self.ctx.state.lock().await;
        if state.handle == Some( handle ) {
            state.paused = true;
        }
        Ok(())
    }


    pub async fn resume( &self ) -> Result<(), SessionError> {
        let handle = {
            let state = self.ctx.state.lock().await;
            if state.playback_state() != PlaybackState::Paused {
                return Err( SessionError::NotPaused );
            }
            state.handle.ok_or( SessionError::NotPaused )?
        };

        self.ctx.backend.resume( self.ctx.key, handle ).await?;

        let mut state = self.ctx.state.lock().await;
        if state.handle == Some( handle ) {
            state.paused = false;
        }
        Ok(())
    }


    /// Stops the transport and lets the resulting completion signal
    /// drive the advance - skip and natural end of track share that
    /// one code path.
    pub async fn skip( &self ) -> Result<(), SessionError> {
        let handle = {
            let state = self.ctx.state.lock().await;
            if state.playback_state() != PlaybackState::Playing {
                return Err( SessionError::NotPlaying );
            }
            state.handle.ok_or( SessionError::NotPlaying )?
        };

        self.ctx.backend.stop( self.ctx.key, handle ).await?;
        Ok(())
    }


    /// Stops playback, clears the queue, and disconnects. Returns
    /// whether a track was actually playing.
    pub async fn stop( &self ) -> Result<bool, SessionError> {
        let ( was_active, handle ) = {
            let mut state = self.ctx.state.lock().await;
            let was_active = state.current.is_some();
            ( was_active, state.mark_stopped() )
        };

        if let Some( handle ) = handle {
            // Its completion now carries a stale generation
            let _ = self.ctx.backend.stop( self.ctx.key, handle ).await;
        }
        self.ctx.backend.disconnect( self.ctx.key ).await;

        Ok( was_active )
    }


    /// Re-invokes the player on the current track at an offset. A
    /// fresh invocation with a fresh generation, never a resume.
    pub async fn seek( &self, position_secs: u64 ) -> Result<(), SessionError> {
        let ( track, volume, generation, old_handle ) = {
            let mut state = self.ctx.state.lock().await;
            if state.playback_state() != PlaybackState::Playing {
                return Err( SessionError::NotPlaying );
            }
            let track = state.current.clone().ok_or( SessionError::NotPlaying )?;
            let old_handle = state.handle.take().ok_or( SessionError::NotPlaying )?;
            state.generation += 1;
            ( track, state.volume, state.generation, old_handle )
        };

        // The old invocation's completion is stale from here on
        let _ = self.ctx.backend.stop( self.ctx.key, old_handle ).await;

        let completion = Completion::new( generation, self.ctx.events.clone() );
        let started = self.ctx.backend.start(
            self.ctx.key,
            &track,
            volume,
            Duration::from_secs( position_secs ),
            completion,
        ).await;

        let mut state = self.ctx.state.lock().await;
        match started {
            Ok( handle ) => {
                if state.generation == generation {
                    state.attach( handle );
                    Ok(())
                } else {
                    drop( state );
                    // Superseded mid-seek; orphan invocation
                    let _ = self.ctx.backend.stop( self.ctx.key, handle ).await;
                    Ok(())
                }
            }
            Err( e ) => {
                if state.generation == generation {
                    state.release_claim();
                }
                Err( e.into() )
            }
        }
    }


    pub async fn now_playing( &self ) -> Option<Track> {
        self.ctx.state.lock().await.current.clone()
    }


    /// Current track plus queued tracks in order, for display.
    pub async fn queue_snapshot( &self ) -> ( Option<Track>, Vec<Track> ) {
        let state = self.ctx.state.lock().await;
        ( state.current.clone(), state.queue.snapshot() )
    }


    pub async fn playback_state( &self ) -> PlaybackState {
        self.ctx.state.lock().await.playback_state()
    }


    /// Current gain as a 0-100 percentage.
    pub async fn volume_percent( &self ) -> u32 {
        ( self.ctx.state.lock().await.volume * 100.0 ).round() as u32
    }


    /// Validates and applies a 0-100 volume. Applies to the live
    /// invocation too, best effort.
    pub async fn set_volume( &self, percent: u32 ) -> Result<f32, SessionError> {
        let ( gain, handle ) = {
            let mut state = self.ctx.state.lock().await;
            let gain = state.set_volume_percent( percent )?;
            ( gain, state.handle )
        };

        if let Some( handle ) = handle {
            if let Err( e ) = self.ctx.backend.set_volume( self.ctx.key, handle, gain ).await {
                tracing::warn!( key = self.ctx.key.0, error = %e, "failed to apply live volume" );
            }
        }

        Ok( gain )
    }


    pub async fn shuffle( &self ) -> Shuffled {
        self.ctx.state.lock().await.shuffle_queue()
    }


    /// Sets the loop mode, cycling to the next one when `None`.
    pub async fn set_loop( &self, mode: Option<LoopMode> ) -> LoopMode {
        self.ctx.state.lock().await.set_loop( mode )
    }


    pub async fn clear_queue( &self ) -> usize {
        self.ctx.state.lock().await.clear_queue()
    }


    /// Removes the queue entry at a 1-based index.
    pub async fn remove_at( &self, index: usize ) -> Result<Track, SessionError> {
        self.ctx.state.lock().await.remove_at( index )
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::testutil::{ harness, settle, test_config, MockBackend, MockExtractor };


    #[tokio::test]
    async fn test_play_queue_skip_end_cycle() {
        let ( session, _extractor, backend ) = harness();

        let first = session.play( "song a" ).await.unwrap();
        assert!( matches!( first, Enqueued::Started( ref t ) if t.title == "song a" ) );
        settle().await;
        assert_eq!( session.playback_state().await, PlaybackState::Playing );

        let second = session.play( "song b" ).await.unwrap();
        assert!( matches!( second, Enqueued::Queued { position: 1, .. } ) );

        session.skip().await.unwrap();
        settle().await;
        assert_eq!( session.now_playing().await.unwrap().title, "song b" );

        backend.complete( backend.last_handle().unwrap() );
        settle().await;
        assert_eq!( session.playback_state().await, PlaybackState::Idle );
        assert!( session.now_playing().await.is_none() );
        assert_eq!( backend.disconnects(), 1 );
    }


    #[tokio::test]
    async fn test_pause_resume_guards() {
        let ( session, _extractor, _backend ) = harness();

        assert!( matches!( session.pause().await, Err( SessionError::NotPlaying ) ) );
        assert!( matches!( session.resume().await, Err( SessionError::NotPaused ) ) );

        session.play( "song a" ).await.unwrap();
        settle().await;

        session.pause().await.unwrap();
        assert_eq!( session.playback_state().await, PlaybackState::Paused );
        assert!( matches!( session.pause().await, Err( SessionError::NotPlaying ) ) );
        assert!( matches!( session.skip().await, Err( SessionError::NotPlaying ) ) );

        session.resume().await.unwrap();
        assert_eq!( session.playback_state().await, PlaybackState::Playing );
        assert!( matches!( session.resume().await, Err( SessionError::NotPaused ) ) );
    }


    #[tokio::test]
    async fn test_stop_clears_everything() {
        let ( session, _extractor, backend ) = harness();

        session.play( "song a" ).await.unwrap();
        session.play( "song b" ).await.unwrap();
        settle().await;

        assert!( session.stop().await.unwrap() );
        assert_eq!( session.playback_state().await, PlaybackState::Idle );
        let ( current, queue ) = session.queue_snapshot().await;
        assert!( current.is_none() );
        assert!( queue.is_empty() );
        assert_eq!( backend.disconnects(), 1 );

        // The stopped invocation's completion is stale: no restart
        settle().await;
        assert_eq!( backend.started_titles(), vec![ "song a" ] );

        // Stopping an idle session reports nothing was playing
        assert!( !session.stop().await.unwrap() );
    }


    #[tokio::test]
    async fn test_volume_validation_and_application() {
        let ( session, _extractor, backend ) = harness();

        assert!( matches!(
            session.set_volume( 150 ).await,
            Err( SessionError::InvalidVolume( 150 ) )
        ));
        assert_eq!( session.volume_percent().await, 50 );

        assert_eq!( session.set_volume( 25 ).await.unwrap(), 0.25 );
        assert_eq!( session.volume_percent().await, 25 );

        session.play( "song a" ).await.unwrap();
        settle().await;
        assert_eq!( backend.started()[ 0 ].volume, 0.25 );
    }


    #[tokio::test]
    async fn test_shuffle_reports() {
        let ( session, _extractor, _backend ) = harness();

        assert!( matches!( session.shuffle().await, Shuffled::TooFew ) );

        session.play( "song a" ).await.unwrap();
        settle().await;
        for title in [ "song b", "song c", "song d" ] {
            session.play( title ).await.unwrap();
        }

        assert!( matches!( session.shuffle().await, Shuffled::Ok( 3 ) ) );
        let ( _, queue ) = session.queue_snapshot().await;
        assert_eq!( queue.len(), 3 );
    }


    #[tokio::test]
    async fn test_store_get_or_create_and_teardown() {
        let store = SessionStore::new(
            Arc::new( MockExtractor::new() ),
            Arc::new( MockBackend::new() ),
            test_config(),
        );

        let a = store.get_or_create( SessionKey( 7 ) ).await;
        let b = store.get_or_create( SessionKey( 7 ) ).await;
        assert!( Arc::ptr_eq( &a.ctx, &b.ctx ) );

        let other = store.get_or_create( SessionKey( 8 ) ).await;
        assert!( !Arc::ptr_eq( &a.ctx, &other.ctx ) );

        assert!( store.teardown( SessionKey( 7 ) ).await );
        assert!( store.get( SessionKey( 7 ) ).await.is_none() );
        assert!( !store.teardown( SessionKey( 7 ) ).await );
    }


    #[tokio::test]
    async fn test_teardown_all_stops_every_session() {
        let backend = Arc::new( MockBackend::new() );
        let store = SessionStore::new(
            Arc::new( MockExtractor::new() ),
            Arc::clone( &backend ) as Arc<dyn AudioBackend>,
            test_config(),
        );

        let a = store.get_or_create( SessionKey( 1 ) ).await;
        let b = store.get_or_create( SessionKey( 2 ) ).await;
        a.play( "song a" ).await.unwrap();
        b.play( "song b" ).await.unwrap();
        settle().await;

        store.teardown_all().await;

        assert!( store.get( SessionKey( 1 ) ).await.is_none() );
        assert!( store.get( SessionKey( 2 ) ).await.is_none() );
        // Both transports were stopped and both channels left
        assert_eq!( backend.stopped().len(), 2 );
        assert_eq!( backend.disconnects(), 2 );
    }


    #[tokio::test]
    async fn test_spotify_collections_are_rejected() {
        let ( session, _extractor, backend ) = harness();

        let result = session.play( "https://open.spotify.com/album/abc123" ).await;
        assert!( matches!(
            result,
            Err( SessionError::Extract( ExtractError::UnsupportedSource( _ ) ) )
        ));
        settle().await;
        assert!( backend.started_titles().is_empty() );
    }


    #[tokio::test]
    async fn test_playlist_enqueues_in_order() {
        let ( session, _extractor, backend ) = harness();

        let result = session.play( "https://example.com/watch?list=3" ).await.unwrap();
        assert!( matches!(
            result,
            Enqueued::Playlist { added: 3, started: Some( ref t ) } if t.title == "entry 1"
        ));
        settle().await;

        // First entry resolved and playing, the rest still flat
        let started = backend.started();
        assert_eq!( started[ 0 ].title, "entry 1" );
        assert!( started[ 0 ].locator.is_some() );

        let ( current, queue ) = session.queue_snapshot().await;
        assert_eq!( current.unwrap().title, "entry 1" );
        assert_eq!(
            queue.iter().map( |t| t.title.as_str() ).collect::<Vec<_>>(),
            vec![ "entry 2", "entry 3" ],
        );
        assert!( queue.iter().all( Track::is_flat ) );
    }


    #[tokio::test]
    async fn test_extraction_timeout() {
        let extractor = Arc::new( MockExtractor::with_delay( Duration::from_millis( 500 ) ) );
        let backend = Arc::new( MockBackend::new() );
        let session = SessionHandle::spawn(
            SessionKey( 1 ),
            extractor as Arc<dyn Extractor>,
            Arc::clone( &backend ) as Arc<dyn AudioBackend>,
            &test_config(),
        );

        let result = session.play( "slow query" ).await;
        assert!( matches!(
            result,
            Err( SessionError::Extract( ExtractError::Timeout( _ ) ) )
        ));
        assert!( backend.started_titles().is_empty() );
    }


    #[tokio::test]
    async fn test_seek_restarts_at_offset() {
        let ( session, _extractor, backend ) = harness();

        assert!( matches!( session.seek( 30 ).await, Err( SessionError::NotPlaying ) ) );

        session.play( "song a" ).await.unwrap();
        settle().await;
        let old_handle = backend.last_handle().unwrap();

        session.seek( 90 ).await.unwrap();
        settle().await;

        // Fresh invocation of the same track, old one stopped and stale
        let started = backend.started();
        assert_eq!( started.len(), 2 );
        assert_eq!( started[ 1 ].title, "song a" );
        assert_eq!( started[ 1 ].start_at, Duration::from_secs( 90 ) );
        assert!( backend.stopped().contains( &old_handle.0 ) );
        assert_eq!( session.now_playing().await.unwrap().title, "song a" );
        assert_eq!( session.playback_state().await, PlaybackState::Playing );
    }


    #[tokio::test]
    async fn test_stop_during_resolution_stays_idle() {
        let extractor = Arc::new( MockExtractor::with_delay( Duration::from_millis( 100 ) ) );
        let backend = Arc::new( MockBackend::new() );
        let session = SessionHandle::spawn(
            SessionKey( 1 ),
            extractor as Arc<dyn Extractor>,
            Arc::clone( &backend ) as Arc<dyn AudioBackend>,
            &test_config(),
        );

        let pending = {
            let session = session.clone();
            tokio::spawn( async move { session.play( "song a" ).await } )
        };
        tokio::time::sleep( Duration::from_millis( 20 ) ).await;
        session.stop().await.unwrap();

        // The result lands in the queue but playback is not kicked off
        let result = pending.await.unwrap().unwrap();
        assert!( matches!( result, Enqueued::Queued { position: 1, .. } ) );
        settle().await;
        assert_eq!( session.playback_state().await, PlaybackState::Idle );
        assert!( backend.started_titles().is_empty() );
        let ( _, queue ) = session.queue_snapshot().await;
        assert_eq!( queue.len(), 1 );
    }
}
