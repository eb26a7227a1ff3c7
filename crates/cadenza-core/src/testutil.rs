//! Mock collaborators for driver and session tests.

use std::collections::HashMap;
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use async_trait::async_trait;

use crate::extract::{ ExtractError, Extractor };
use crate::player::{ AudioBackend, Completion, PlaybackOutcome, PlayerError, PlayerHandle };
use crate::store::{ SessionConfig, SessionHandle, SessionKey };
use crate::track::Track;


/// Lets spawned driver tasks process queued events.
pub( crate ) async fn settle() {
    tokio::time::sleep( Duration::from_millis( 50 ) ).await;
}


pub( crate ) fn test_config() -> SessionConfig {
    SessionConfig {
        default_volume: 0.5,
        extract_timeout: Duration::from_millis( 200 ),
    }
}


pub( crate ) fn harness() -> ( SessionHandle, Arc<MockExtractor>, Arc<MockBackend> ) {
    let extractor = Arc::new( MockExtractor::new() );
    let backend = Arc::new( MockBackend::new() );
    let handle = SessionHandle::spawn(
        SessionKey( 1 ),
        Arc::clone( &extractor ) as Arc<dyn Extractor>,
        Arc::clone( &backend ) as Arc<dyn AudioBackend>,
        &test_config(),
    );
    ( handle, extractor, backend )
}


/// Deterministic fake extractor. Queries containing "!fail" fail;
/// everything else resolves to a synthetic track whose title is the
/// query (with any `page://` prefix stripped, so flat entries resolve
/// back to their own title).
pub( crate ) struct MockExtractor {
    /// Artificial latency per call, for timeout and interleaving tests.
    pub delay: Option<Duration>,
}


impl MockExtractor {
    pub fn new() -> Self {
        Self { delay: None }
    }


    pub fn with_delay( delay: Duration ) -> Self {
        Self { delay: Some( delay ) }
    }
}


#[async_trait]
impl Extractor for MockExtractor {
    async fn resolve( &self, query: &str ) -> Result<Track, ExtractError> {
        if let Some( delay ) = self.delay {
            tokio::time::sleep( delay ).await;
        }

        if query.contains( "!fail" ) {
            return Err( ExtractError::Failed( format!( "no source for '{}'", query ) ) );
        }

        let title = query.strip_prefix( "page://" ).unwrap_or( query );
        Ok( Track::resolved(
            title,
            format!( "stream://{}", title ),
            format!( "page://{}", title ),
            180,
        ))
    }


    async fn resolve_playlist( &self, url: &str ) -> Result<Vec<Track>, ExtractError> {
        if let Some( delay ) = self.delay {
            tokio::time::sleep( delay ).await;
        }

        if url.contains( "!fail" ) {
            return Err( ExtractError::Failed( format!( "no entries for '{}'", url ) ) );
        }

        let count: usize = url
            .rsplit( "list=" )
            .next()
            .and_then( |s| s.parse().ok() )
            .unwrap_or( 3 );

        Ok(( 1..=count )
            .map( |i| Track::flat( format!( "entry {}", i ), format!( "page://entry {}", i ), 60 ) )
            .collect())
    }
}


#[derive( Debug, Clone )]
pub( crate ) struct StartRecord {
    pub title: String,
    pub locator: Option<String>,
    pub volume: f32,
    pub start_at: Duration,
}


#[derive( Default )]
struct BackendInner {
    next_handle: u64,
    pending: HashMap<u64, Completion>,
    started: Vec<StartRecord>,
    stopped: Vec<u64>,
    disconnects: usize,
    fail_starts: usize,
}


/// Records every transport call and parks completions so tests can
/// fire natural track ends explicitly. `stop` fires the parked
/// completion, matching the real backend contract.
pub( crate ) struct MockBackend {
    inner: Mutex<BackendInner>,
}


impl MockBackend {
    pub fn new() -> Self {
        Self { inner: Mutex::new( BackendInner::default() ) }
    }


    /// Makes the next `n` start calls fail.
    pub fn fail_next_starts( &self, n: usize ) {
        self.inner.lock().unwrap().fail_starts = n;
    }


    /// Fires the parked completion for `handle` as a natural end.
    /// Returns false if it already fired.
    pub fn complete( &self, handle: PlayerHandle ) -> bool {
        let completion = self.inner.lock().unwrap().pending.remove( &handle.0 );
        match completion {
            Some( c ) => {
                c.finish( PlaybackOutcome::Finished );
                true
            }
            None => false,
        }
    }


    /// Fires the parked completion for `handle` as a transport error.
    pub fn fail_playback( &self, handle: PlayerHandle ) -> bool {
        let completion = self.inner.lock().unwrap().pending.remove( &handle.0 );
        match completion {
            Some( c ) => {
                c.finish( PlaybackOutcome::Failed( PlayerError::Transport( "mock".into() ) ) );
                true
            }
            None => false,
        }
    }


    /// Handle of the most recent start.
    pub fn last_handle( &self ) -> Option<PlayerHandle> {
        let inner = self.inner.lock().unwrap();
        inner.next_handle.checked_sub( 1 ).map( PlayerHandle )
    }


    pub fn started( &self ) -> Vec<StartRecord> {
        self.inner.lock().unwrap().started.clone()
    }


    pub fn started_titles( &self ) -> Vec<String> {
        self.inner.lock().unwrap().started.iter().map( |r| r.title.clone() ).collect()
    }


    pub fn disconnects( &self ) -> usize {
        self.inner.lock().unwrap().disconnects
    }


    pub fn stopped( &self ) -> Vec<u64> {
        self.inner.lock().unwrap().stopped.clone()
    }
}


#[async_trait]
impl AudioBackend for MockBackend {
    async fn start(
        &self,
        _key: SessionKey,
        track: &Track,
        volume: f32,
        start_at: Duration,
        completion: Completion,
    ) -> Result<PlayerHandle, PlayerError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.fail_starts > 0 {
            inner.fail_starts -= 1;
            // Contract: a failed start drops the completion unfired
            drop( completion );
            return Err( PlayerError::Start( "mock start failure".into() ) );
        }

        let id = inner.next_handle;
        inner.next_handle += 1;
        inner.pending.insert( id, completion );
        inner.started.push( StartRecord {
            title: track.title.clone(),
            locator: track.locator.clone(),
            volume,
            start_at,
        });

        Ok( PlayerHandle( id ) )
    }


    async fn stop( &self, _key: SessionKey, handle: PlayerHandle ) -> Result<(), PlayerError> {
        let completion = {
            let mut inner = self.inner.lock().unwrap();
            inner.stopped.push( handle.0 );
            inner.pending.remove( &handle.0 )
        };

        if let Some( completion ) = completion {
            completion.finish( PlaybackOutcome::Finished );
        }
        Ok(())
    }


    async fn pause( &self, _key: SessionKey, _handle: PlayerHandle ) -> Result<(), PlayerError> {
        Ok(())
    }


    async fn resume( &self, _key: SessionKey, _handle: PlayerHandle ) -> Result<(), PlayerError> {
        Ok(())
    }


    async fn set_volume( &self, _key: SessionKey, _handle: PlayerHandle, _volume: f32 ) -> Result<(), PlayerError> {
        Ok(())
    }


    async fn disconnect( &self, _key: SessionKey ) {
        self.inner.lock().unwrap().disconnects += 1;
    }
}
