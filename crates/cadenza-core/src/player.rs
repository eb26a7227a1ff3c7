//! Audio backend contract.
//!
//! The core never touches audio itself; it sequences *when* playback
//! starts and stops. Everything below is the seam to the transport
//! that does the actual work (voice connection, encoding, sending).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::driver::SessionEvent;
use crate::store::SessionKey;
use crate::track::Track;


/// Errors reported by the audio backend.
#[derive( Debug, Error )]
pub enum PlayerError {
    #[error( "failed to start playback: {0}" )]
    Start( String ),

    #[error( "audio transport failure: {0}" )]
    Transport( String ),

    #[error( "no active invocation" )]
    NoInvocation,
}


/// Opaque identifier for one player invocation.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub struct PlayerHandle( pub u64 );


/// How an invocation ended.
#[derive( Debug )]
pub enum PlaybackOutcome {
    /// The track played to its end, or was stopped.
    Finished,

    /// The transport failed mid-playback. Treated as a completion and
    /// logged; never surfaced to the user.
    Failed( PlayerError ),
}


/// Consume-once completion callback for a single invocation.
///
/// The backend receives one of these per `start` and must call
/// [`Completion::finish`] exactly once, from whatever execution context
/// it likes. The event lands on the session's owning task, tagged with
/// the generation that was active when the invocation started, so a
/// stale signal is discarded rather than double-advancing the queue.
#[derive( Debug )]
pub struct Completion {
    generation: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
}


impl Completion {
    pub( crate ) fn new( generation: u64, events: mpsc::UnboundedSender<SessionEvent> ) -> Self {
        Self { generation, events }
    }


    /// The generation this invocation was started under.
    pub fn generation( &self ) -> u64 {
        self.generation
    }


    /// Reports the end of the invocation. Consumes the callback, so a
    /// backend cannot signal the same invocation twice.
    pub fn finish( self, outcome: PlaybackOutcome ) {
        // The receiver is gone during teardown; nothing left to advance.
        let _ = self.events.send( SessionEvent::Completed {
            generation: self.generation,
            outcome,
        });
    }
}


/// The audio transport, as seen from the core.
///
/// Contract:
/// - At most one invocation is active per session key; the core
///   guarantees this, the backend may assume it.
/// - `start` returns a handle for the new invocation and must
///   eventually fire the [`Completion`] exactly once - on natural end,
///   on transport failure, or as a consequence of `stop`. On an `Err`
///   return the invocation never existed and the completion must be
///   dropped unfired.
/// - `stop` causes the pending completion of that invocation to fire.
///   Skip relies on this: stopping the transport and letting the
///   completion drive the advance keeps skip and natural end of track
///   on one code path.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Starts playing `track` (which must be resolved) at `start_at`
    /// into the stream.
    async fn start(
        &self,
        key: SessionKey,
        track: &Track,
        volume: f32,
        start_at: Duration,
        completion: Completion,
    ) -> Result<PlayerHandle, PlayerError>;

    /// Stops the invocation, firing its completion.
    async fn stop( &self, key: SessionKey, handle: PlayerHandle ) -> Result<(), PlayerError>;

    async fn pause( &self, key: SessionKey, handle: PlayerHandle ) -> Result<(), PlayerError>;

    async fn resume( &self, key: SessionKey, handle: PlayerHandle ) -> Result<(), PlayerError>;

    /// Applies a new gain to the live invocation.
    async fn set_volume( &self, key: SessionKey, handle: PlayerHandle, volume: f32 ) -> Result<(), PlayerError>;

    /// Tears down the session's transport (leaves the channel).
    async fn disconnect( &self, key: SessionKey );
}
