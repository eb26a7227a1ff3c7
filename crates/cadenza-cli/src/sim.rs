//! Simulated media source and audio transport.
//!
//! The console has no real voice connection, so playback is a timer: a
//! track "plays" for its duration divided by the configured time
//! scale, then its completion fires exactly as a real transport's
//! would. Pause freezes the remaining time, stop fires the pending
//! completion early. The extractor fabricates deterministic metadata
//! from the query so queue views look plausible.

use std::collections::HashMap;
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use cadenza_core::player::{ AudioBackend, Completion, PlaybackOutcome, PlayerError, PlayerHandle };
use cadenza_core::{ ExtractError, Extractor, SessionKey, Track };


/// Deterministic fake extractor. Every query resolves; durations are
/// hashed from the title so repeated lookups agree.
pub struct SimExtractor {
    latency: Duration,
}


impl SimExtractor {
    pub fn new() -> Self {
        Self { latency: Duration::from_millis( 150 ) }
    }


    fn title_for( query: &str ) -> String {
        let stripped = query
            .strip_prefix( "sim://" )
            .or_else( || query.rsplit( '/' ).next().filter( |_| query.starts_with( "http" ) ) )
            .unwrap_or( query );
        stripped.trim().to_string()
    }


    /// Stable pseudo-duration between 2 and 7 minutes.
    fn duration_for( title: &str ) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in title.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul( 0x100000001b3 );
        }
        120 + hash % 300
    }
}


#[async_trait]
impl Extractor for SimExtractor {
    async fn resolve( &self, query: &str ) -> Result<Track, ExtractError> {
        tokio::time::sleep( self.latency ).await;

        if query.contains( "unavailable" ) {
            return Err( ExtractError::Failed( format!( "Video unavailable: {}", query ) ) );
        }

        let title = Self::title_for( query );
        if title.is_empty() {
            return Err( ExtractError::Failed( "empty query".to_string() ) );
        }

        let slug = title.replace( ' ', "-" ).to_lowercase();
        Ok( Track::resolved(
            &title,
            format!( "sim://stream/{}", slug ),
            format!( "https://sim.example/watch/{}", slug ),
            Self::duration_for( &title ),
        ))
    }


    async fn resolve_playlist( &self, url: &str ) -> Result<Vec<Track>, ExtractError> {
        tokio::time::sleep( self.latency ).await;

        // Entry count encoded in the URL, e.g. "...list=8"
        let count: usize = url
            .rsplit( "list=" )
            .next()
            .and_then( |s| s.split( &[ '&', '/' ] ).next() )
            .and_then( |s| s.parse().ok() )
            .unwrap_or( 5 );

        if count == 0 {
            return Err( ExtractError::Failed( format!( "no entries in {}", url ) ) );
        }

        let base = Self::title_for( url );
        Ok(( 1..=count )
            .map( |i| {
                let title = format!( "{} - part {}", base, i );
                let slug = title.replace( ' ', "-" ).to_lowercase();
                Track::flat( &title, format!( "https://sim.example/watch/{}", slug ), Self::duration_for( &title ) )
            })
            .collect())
    }
}


enum TimerCtl {
    Pause,
    Resume,
    Stop,
}


#[derive( Default )]
struct TimerInner {
    next_handle: u64,
    running: HashMap<u64, mpsc::UnboundedSender<TimerCtl>>,
}


/// Transport that plays tracks on a scaled wall clock.
pub struct TimerBackend {
    time_scale: u32,
    inner: Arc<Mutex<TimerInner>>,
}


impl TimerBackend {
    pub fn new( time_scale: u32 ) -> Self {
        Self {
            time_scale: time_scale.max( 1 ),
            inner: Arc::new( Mutex::new( TimerInner::default() ) ),
        }
    }


    /// Invocations whose timer task is still alive.
    #[cfg( test )]
    fn active_invocations( &self ) -> usize {
        self.inner.lock().unwrap().running.len()
    }


    fn scaled( &self, track: &Track, start_at: Duration ) -> Duration {
        // Live streams report no duration; pretend three minutes
        let secs = if track.duration_secs == 0 { 180 } else { track.duration_secs };
        let remaining = secs.saturating_sub( start_at.as_secs() );
        Duration::from_millis( remaining * 1000 / self.time_scale as u64 )
    }
}


/// Owns the completion for one invocation. Fires it exactly once: on
/// timer expiry, on stop, or when the backend is dropped and the
/// control channel closes. Unregisters itself from the running map on
/// the way out so naturally finished tracks do not accumulate there.
async fn run_timer(
    inner: Arc<Mutex<TimerInner>>,
    id: u64,
    mut remaining: Duration,
    completion: Completion,
    mut ctl: mpsc::UnboundedReceiver<TimerCtl>,
) {
    let finish = move |completion: Completion| {
        inner.lock().unwrap().running.remove( &id );
        completion.finish( PlaybackOutcome::Finished );
    };
    let mut paused = false;

    loop {
        if paused {
            match ctl.recv().await {
                Some( TimerCtl::Resume ) => paused = false,
                Some( TimerCtl::Pause ) => {}
                Some( TimerCtl::Stop ) | None => {
                    finish( completion );
                    return;
                }
            }
        } else {
            let resumed_at = Instant::now();
            tokio::select! {
                _ = tokio::time::sleep( remaining ) => {
                    finish( completion );
                    return;
                }
                msg = ctl.recv() => {
                    remaining = remaining.saturating_sub( resumed_at.elapsed() );
                    match msg {
                        Some( TimerCtl::Pause ) => paused = true,
                        Some( TimerCtl::Resume ) => {}
                        Some( TimerCtl::Stop ) | None => {
                            finish( completion );
                            return;
                        }
                    }
                }
            }
        }
    }
}


#[async_trait]
impl AudioBackend for TimerBackend {
    async fn start(
        &self,
        key: SessionKey,
        track: &Track,
        volume: f32,
        start_at: Duration,
        completion: Completion,
    ) -> Result<PlayerHandle, PlayerError> {
        let remaining = self.scaled( track, start_at );
        let ( tx, rx ) = mpsc::unbounded_channel();

        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_handle;
            inner.next_handle += 1;
            inner.running.insert( id, tx );
            id
        };

        tracing::info!(
            channel = key.0,
            title = %track.title,
            volume,
            secs = remaining.as_secs_f32(),
            "timer playback started"
        );
        tokio::spawn( run_timer( Arc::clone( &self.inner ), id, remaining, completion, rx ) );

        Ok( PlayerHandle( id ) )
    }


    async fn stop( &self, _key: SessionKey, handle: PlayerHandle ) -> Result<(), PlayerError> {
        let ctl = self.inner.lock().unwrap().running.remove( &handle.0 );
        match ctl {
            Some( ctl ) => {
                let _ = ctl.send( TimerCtl::Stop );
                Ok(())
            }
            None => Ok(()),
        }
    }


    async fn pause( &self, _key: SessionKey, handle: PlayerHandle ) -> Result<(), PlayerError> {
        let inner = self.inner.lock().unwrap();
        match inner.running.get( &handle.0 ) {
            Some( ctl ) => {
                let _ = ctl.send( TimerCtl::Pause );
                Ok(())
            }
            None => Err( PlayerError::NoInvocation ),
        }
    }


    async fn resume( &self, _key: SessionKey, handle: PlayerHandle ) -> Result<(), PlayerError> {
        let inner = self.inner.lock().unwrap();
        match inner.running.get( &handle.0 ) {
            Some( ctl ) => {
                let _ = ctl.send( TimerCtl::Resume );
                Ok(())
            }
            None => Err( PlayerError::NoInvocation ),
        }
    }


    async fn set_volume( &self, key: SessionKey, _handle: PlayerHandle, volume: f32 ) -> Result<(), PlayerError> {
        tracing::debug!( channel = key.0, volume, "timer volume changed" );
        Ok(())
    }


    async fn disconnect( &self, key: SessionKey ) {
        tracing::info!( channel = key.0, "left channel" );
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_titles_and_durations_are_stable() {
        assert_eq!( SimExtractor::title_for( "  never gonna give you up " ), "never gonna give you up" );
        assert_eq!( SimExtractor::title_for( "https://sim.example/watch/abc" ), "abc" );
        assert_eq!(
            SimExtractor::duration_for( "a song" ),
            SimExtractor::duration_for( "a song" ),
        );
        let d = SimExtractor::duration_for( "a song" );
        assert!( ( 120..420 ).contains( &( d as i64 ) ) );
    }


    #[tokio::test]
    async fn test_playlist_count_from_url() {
        let extractor = SimExtractor::new();
        let entries = extractor.resolve_playlist( "https://sim.example/mix?list=4" ).await.unwrap();
        assert_eq!( entries.len(), 4 );
        assert!( entries.iter().all( |t| t.is_flat() ) );
    }


    #[tokio::test]
    async fn test_finished_timers_unregister_themselves() {
        use cadenza_core::{ SessionConfig, SessionStore };

        // Tracks expire near-instantly at this scale, so every
        // invocation ends naturally rather than via stop
        let backend = Arc::new( TimerBackend::new( 1_000_000 ) );
        let store = SessionStore::new(
            Arc::new( SimExtractor::new() ),
            Arc::clone( &backend ) as Arc<dyn AudioBackend>,
            SessionConfig::default(),
        );

        let session = store.get_or_create( SessionKey( 1 ) ).await;
        for i in 0..5 {
            session.play( &format!( "short track {}", i ) ).await.unwrap();
            tokio::time::sleep( Duration::from_millis( 20 ) ).await;
        }
        tokio::time::sleep( Duration::from_millis( 100 ) ).await;

        assert_eq!( backend.active_invocations(), 0 );
    }
}
