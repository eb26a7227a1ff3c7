//! Per-channel session state machine.
//!
//! [`SessionState`] is the single-writer-guarded heart of a session:
//! the queue, the current track, loop mode, volume, and the generation
//! counter that distinguishes successive player invocations. All
//! mutation happens under the session's mutex; nothing here blocks.

use thiserror::Error;

use crate::extract::ExtractError;
use crate::player::{ PlayerError, PlayerHandle };
use crate::queue::{ Shuffled, TrackQueue };
use crate::track::Track;


/// Errors from session operations.
#[derive( Debug, Error )]
pub enum SessionError {
    #[error( "nothing is playing" )]
    NotPlaying,

    #[error( "nothing is paused" )]
    NotPaused,

    #[error( "index {index} is out of range, queue has {len} entries" )]
    IndexOutOfRange { index: usize, len: usize },

    #[error( "volume must be between 0 and 100, got {0}" )]
    InvalidVolume( u32 ),

    #[error( transparent )]
    Player( #[from] PlayerError ),

    #[error( transparent )]
    Extract( #[from] ExtractError ),
}


/// Loop mode for the session.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}


impl LoopMode {
    /// Cycles off -> track -> queue -> off, the behavior of the bare
    /// loop command.
    pub fn cycle( self ) -> Self {
        match self {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Off,
        }
    }
}


/// Observable playback state, derived from session fields.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}


/// Mutable state of one session.
///
/// Invariants:
/// - `current` is `Some` exactly while a player invocation is active
///   (claimed or started) for this session.
/// - `handle` is `Some` only while `current` is `Some`; it is `None`
///   for the short window between claiming an invocation and the
///   backend returning its handle.
/// - the queue never holds placeholder entries.
pub struct SessionState {
    pub( crate ) queue: TrackQueue,
    pub( crate ) current: Option<Track>,
    pub( crate ) handle: Option<PlayerHandle>,
    pub( crate ) paused: bool,
    pub( crate ) loop_mode: LoopMode,
    pub( crate ) volume: f32,

    /// Bumped on every transition that starts a new player invocation,
    /// and on stop. Completion signals tagged with an older value are
    /// stale and get discarded.
    pub( crate ) generation: u64,

    /// Bumped on stop/teardown only. A play command that was resolving
    /// while a stop happened compares epochs to decide whether it may
    /// still auto-start.
    pub( crate ) epoch: u64,
}


impl SessionState {
    pub( crate ) fn new( volume: f32 ) -> Self {
        Self {
            queue: TrackQueue::new(),
            current: None,
            handle: None,
            paused: false,
            loop_mode: LoopMode::Off,
            volume,
            generation: 0,
            epoch: 0,
        }
    }


    pub fn playback_state( &self ) -> PlaybackState {
        if self.current.is_none() {
            PlaybackState::Idle
        } else if self.paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }


    /// Appends a track; returns its 1-based queue position.
    pub( crate ) fn enqueue( &mut self, track: Track ) -> usize {
        self.queue.push_back( track )
    }


    /// Appends playlist entries in source order; returns the count.
    pub( crate ) fn enqueue_many( &mut self, tracks: Vec<Track> ) -> usize {
        self.queue.extend( tracks )
    }


    /// Removes the entry at a 1-based user-facing index.
    pub( crate ) fn remove_at( &mut self, index: usize ) -> Result<Track, SessionError> {
        let len = self.queue.len();
        if index == 0 || index > len {
            return Err( SessionError::IndexOutOfRange { index, len } );
        }

        // Checked above, remove cannot fail
        Ok( self.queue.remove( index - 1 ).expect( "index validated" ) )
    }


    pub( crate ) fn clear_queue( &mut self ) -> usize {
        self.queue.clear()
    }


    pub( crate ) fn shuffle_queue( &mut self ) -> Shuffled {
        self.queue.shuffle()
    }


    /// Sets the loop mode, or cycles to the next one when `None`.
    pub( crate ) fn set_loop( &mut self, mode: Option<LoopMode> ) -> LoopMode {
        self.loop_mode = mode.unwrap_or_else( || self.loop_mode.cycle() );
        self.loop_mode
    }


    /// Validates and applies a 0-100 volume; returns the 0.0-1.0 gain.
    pub( crate ) fn set_volume_percent( &mut self, percent: u32 ) -> Result<f32, SessionError> {
        if percent > 100 {
            return Err( SessionError::InvalidVolume( percent ) );
        }

        self.volume = percent as f32 / 100.0;
        Ok( self.volume )
    }


    /// Applies the loop-mode advance policy after `ended` finished:
    /// replay it, rotate it to the tail, or drop it and pop the front.
    pub( crate ) fn plan_next( &mut self, ended: Track ) -> Option<Track> {
        match self.loop_mode {
            LoopMode::Track => Some( ended ),
            LoopMode::Queue => {
                self.queue.push_back( ended );
                self.queue.pop_front()
            }
            LoopMode::Off => self.queue.pop_front(),
        }
    }


    /// Takes the finished invocation out of the session. Returns the
    /// track that was playing, or `None` when the session already went
    /// idle (a stale signal after stop).
    pub( crate ) fn finish_current( &mut self ) -> Option<Track> {
        self.handle = None;
        self.paused = false;
        self.current.take()
    }


    /// Claims a fresh invocation for `track`: installs it as current
    /// and bumps the generation. The backend handle is attached once
    /// `start` returns.
    pub( crate ) fn claim( &mut self, track: Track ) -> u64 {
        self.current = Some( track );
        self.handle = None;
        self.paused = false;
        self.generation += 1;
        self.generation
    }


    pub( crate ) fn attach( &mut self, handle: PlayerHandle ) {
        self.handle = Some( handle );
    }


    /// Rolls back a claim whose backend start failed.
    pub( crate ) fn release_claim( &mut self ) {
        self.current = None;
        self.handle = None;
        self.paused = false;
    }


    /// Stop: clears the queue, drops the current invocation, and
    /// invalidates both in-flight completions (generation) and pending
    /// resolutions (epoch). Returns the old handle so the caller can
    /// stop the transport outside the lock.
    pub( crate ) fn mark_stopped( &mut self ) -> Option<PlayerHandle> {
        self.queue.clear();
        self.current = None;
        self.paused = false;
        self.generation += 1;
        self.epoch += 1;
        self.handle.take()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn track( title: &str ) -> Track {
        Track::resolved( title, format!( "stream://{}", title ), format!( "page://{}", title ), 60 )
    }


    fn state_with_queue( titles: &[&str] ) -> SessionState {
        let mut state = SessionState::new( 0.5 );
        for title in titles {
            state.enqueue( track( title ) );
        }
        state
    }


    #[test]
    fn test_loop_cycle() {
        assert_eq!( LoopMode::Off.cycle(), LoopMode::Track );
        assert_eq!( LoopMode::Track.cycle(), LoopMode::Queue );
        assert_eq!( LoopMode::Queue.cycle(), LoopMode::Off );
    }


    #[test]
    fn test_remove_at_is_one_based() {
        let mut state = state_with_queue( &[ "a", "b", "c" ] );

        let removed = state.remove_at( 2 ).unwrap();
        assert_eq!( removed.title, "b" );

        assert!( matches!(
            state.remove_at( 0 ),
            Err( SessionError::IndexOutOfRange { index: 0, len: 2 } )
        ));
        assert!( matches!(
            state.remove_at( 3 ),
            Err( SessionError::IndexOutOfRange { index: 3, len: 2 } )
        ));
    }


    #[test]
    fn test_volume_validation() {
        let mut state = SessionState::new( 0.5 );

        assert!( matches!(
            state.set_volume_percent( 150 ),
            Err( SessionError::InvalidVolume( 150 ) )
        ));
        assert_eq!( state.volume, 0.5 );

        assert_eq!( state.set_volume_percent( 50 ).unwrap(), 0.5 );
        assert_eq!( state.set_volume_percent( 0 ).unwrap(), 0.0 );
        assert_eq!( state.set_volume_percent( 100 ).unwrap(), 1.0 );
    }


    #[test]
    fn test_plan_next_loop_track_replays_and_keeps_queue() {
        let mut state = state_with_queue( &[ "b", "c" ] );
        state.set_loop( Some( LoopMode::Track ) );

        // N completions in a row: current unchanged, queue untouched
        let mut current = track( "a" );
        for _ in 0..5 {
            current = state.plan_next( current ).unwrap();
            assert_eq!( current.title, "a" );
        }
        assert_eq!( state.queue.len(), 2 );
    }


    #[test]
    fn test_plan_next_loop_queue_full_cycle_restores_order() {
        let mut state = state_with_queue( &[ "b", "c" ] );
        state.set_loop( Some( LoopMode::Queue ) );

        // One full rotation of a 3-track cycle
        let mut current = track( "a" );
        let mut seen = Vec::new();
        for _ in 0..3 {
            current = state.plan_next( current ).unwrap();
            seen.push( current.title.clone() );
        }

        assert_eq!( seen, vec![ "b", "c", "a" ] );
        assert_eq!( current.title, "a" );
        let titles: Vec<_> = state.queue.iter().map( |t| t.title.as_str() ).collect();
        assert_eq!( titles, vec![ "b", "c" ] );
    }


    #[test]
    fn test_plan_next_loop_off_pops_front() {
        let mut state = state_with_queue( &[ "b" ] );

        let next = state.plan_next( track( "a" ) ).unwrap();
        assert_eq!( next.title, "b" );
        assert!( state.plan_next( next ).is_none() );
    }


    #[test]
    fn test_claim_bumps_generation() {
        let mut state = SessionState::new( 0.5 );
        assert_eq!( state.generation, 0 );

        let generation = state.claim( track( "a" ) );
        assert_eq!( generation, 1 );
        assert_eq!( state.playback_state(), PlaybackState::Playing );
        assert!( state.handle.is_none() );

        state.attach( PlayerHandle( 7 ) );
        assert_eq!( state.handle, Some( PlayerHandle( 7 ) ) );
    }


    #[test]
    fn test_mark_stopped_invalidates_everything() {
        let mut state = state_with_queue( &[ "b", "c" ] );
        state.claim( track( "a" ) );
        state.attach( PlayerHandle( 1 ) );

        let old_generation = state.generation;
        let old_epoch = state.epoch;
        let handle = state.mark_stopped();

        assert_eq!( handle, Some( PlayerHandle( 1 ) ) );
        assert_eq!( state.playback_state(), PlaybackState::Idle );
        assert!( state.queue.is_empty() );
        assert!( state.generation > old_generation );
        assert!( state.epoch > old_epoch );
    }
}
