//! Continuation driver.
//!
//! Player completion signals fire on whatever execution context the
//! audio transport runs on. They are posted here as tagged events and
//! consumed by one task per session, so the logic that decides and
//! starts the next track is serialized with everything else that
//! mutates the session. A single consumer also means at most one
//! advance is ever in flight per session: a second completion cannot
//! be processed until the first one's resulting invocation (or idle
//! transition) is fully installed.
//!
//! Staleness is decided by the generation counter: an event tagged
//! with an older generation belongs to an invocation that was already
//! superseded by a skip, a stop, or a seek, and is silently dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::extract;
use crate::player::{ Completion, PlaybackOutcome };
use crate::store::SessionCtx;
use crate::track::Track;


/// Events marshaled onto a session's owning task.
#[derive( Debug )]
pub enum SessionEvent {
    /// The invocation started under `generation` ended - naturally,
    /// via stop, or with a transport error.
    Completed {
        generation: u64,
        outcome: PlaybackOutcome,
    },

    /// Start request for an idle session (auto-start on enqueue).
    /// Discarded if anything changed since it was issued.
    Kick { generation: u64 },

    /// Tears the driver task down. Sent by the store on session
    /// removal.
    Shutdown,
}


/// Per-session event loop. Exits on [`SessionEvent::Shutdown`] or when
/// every sender is gone.
pub( crate ) async fn run( ctx: Arc<SessionCtx>, mut events: mpsc::UnboundedReceiver<SessionEvent> ) {
    while let Some( event ) = events.recv().await {
        match event {
            SessionEvent::Completed { generation, outcome } => {
                advance( &ctx, generation, outcome ).await;
            }
            SessionEvent::Kick { generation } => {
                kick( &ctx, generation ).await;
            }
            SessionEvent::Shutdown => break,
        }
    }

    tracing::debug!( key = ctx.key.0, "session driver exiting" );
}


/// Folds a completion signal into session state and starts whatever
/// the loop-mode policy picks next.
async fn advance( ctx: &SessionCtx, generation: u64, outcome: PlaybackOutcome ) {
    let ( candidate, expected ) = {
        let mut state = ctx.state.lock().await;

        if generation != state.generation {
            tracing::debug!(
                key = ctx.key.0,
                tagged = generation,
                current = state.generation,
                "discarding stale completion"
            );
            return;
        }

        let Some( ended ) = state.finish_current() else {
            // Arrives after stop already went idle
            tracing::debug!( key = ctx.key.0, "completion for idle session, ignoring" );
            return;
        };

        if let PlaybackOutcome::Failed( e ) = &outcome {
            tracing::warn!(
                key = ctx.key.0,
                title = %ended.title,
                error = %e,
                "player reported an error, advancing"
            );
        }

        ( state.plan_next( ended ), state.generation )
    };

    start_next( ctx, candidate, expected ).await;
}


/// Handles an auto-start request from an idle session.
async fn kick( ctx: &SessionCtx, generation: u64 ) {
    let ( candidate, expected ) = {
        let mut state = ctx.state.lock().await;

        if generation != state.generation {
            tracing::debug!( key = ctx.key.0, "discarding stale start request" );
            return;
        }
        if state.current.is_some() {
            return;
        }

        ( state.queue.pop_front(), state.generation )
    };

    if candidate.is_none() {
        // Queue emptied between enqueue and kick; nothing to do
        return;
    }

    start_next( ctx, candidate, expected ).await;
}


/// Resolves and starts the next track.
///
/// Flat entries get their locator resolved here, outside the session
/// lock; a failure skips to the following entry. The attempt counter
/// bounds the walk so an all-failing queue terminates in the idle
/// state instead of looping. Every re-acquisition of the lock
/// re-validates the generation, so a skip/stop/seek that interleaved
/// with the resolution wins and this walk abandons itself.
async fn start_next( ctx: &SessionCtx, mut candidate: Option<Track>, mut expected: u64 ) {
    let mut attempts = {
        let state = ctx.state.lock().await;
        state.queue.len() + 1
    };

    loop {
        let Some( track ) = candidate.take() else {
            go_idle( ctx, expected ).await;
            return;
        };

        // Lazy resolution for flat playlist entries
        let track = if track.is_flat() {
            match extract::resolve_with_timeout(
                ctx.extractor.as_ref(),
                &track.page_url,
                ctx.extract_timeout,
            ).await {
                Ok( resolved ) => resolved,
                Err( e ) => {
                    tracing::warn!(
                        key = ctx.key.0,
                        title = %track.title,
                        error = %e,
                        "skipping unresolvable entry"
                    );

                    attempts = attempts.saturating_sub( 1 );
                    let mut state = ctx.state.lock().await;
                    if state.generation != expected {
                        return;
                    }
                    if attempts == 0 {
                        drop( state );
                        go_idle( ctx, expected ).await;
                        return;
                    }
                    candidate = state.queue.pop_front();
                    continue;
                }
            }
        } else {
            track
        };

        // Claim the invocation, then start the transport outside the
        // lock. The claim bumps the generation, which is what makes a
        // racing duplicate completion stale.
        let ( generation, volume ) = {
            let mut state = ctx.state.lock().await;
            if state.generation != expected {
                return;
            }
            ( state.claim( track.clone() ), state.volume )
        };

        let completion = Completion::new( generation, ctx.events.clone() );
        match ctx.backend.start( ctx.key, &track, volume, Duration::ZERO, completion ).await {
            Ok( handle ) => {
                let superseded = {
                    let mut state = ctx.state.lock().await;
                    if state.generation == generation {
                        state.attach( handle );
                        false
                    } else {
                        true
                    }
                };

                if superseded {
                    // A stop or seek won while the transport was
                    // spinning up; this invocation is an orphan.
                    let _ = ctx.backend.stop( ctx.key, handle ).await;
                } else {
                    tracing::info!( key = ctx.key.0, title = %track.title, "now playing" );
                }
                return;
            }
            Err( e ) => {
                tracing::warn!(
                    key = ctx.key.0,
                    title = %track.title,
                    error = %e,
                    "player failed to start, skipping"
                );

                attempts = attempts.saturating_sub( 1 );
                let mut state = ctx.state.lock().await;
                if state.generation != generation {
                    return;
                }
                state.release_claim();
                expected = generation;
                if attempts == 0 {
                    drop( state );
                    go_idle( ctx, expected ).await;
                    return;
                }
                candidate = state.queue.pop_front();
            }
        }
    }
}


/// Nothing left to play: stay idle and leave the channel.
async fn go_idle( ctx: &SessionCtx, expected: u64 ) {
    {
        let state = ctx.state.lock().await;
        if state.generation != expected {
            return;
        }
    }

    tracing::info!( key = ctx.key.0, "queue exhausted, disconnecting" );
    ctx.backend.disconnect( ctx.key ).await;
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::player::PlaybackOutcome;
    use crate::session::{ LoopMode, PlaybackState };
    use crate::testutil::{ harness, settle };


    #[tokio::test]
    async fn test_stale_completion_is_ignored() {
        let ( session, _extractor, backend ) = harness();

        session.play( "song a" ).await.unwrap();
        settle().await;
        assert_eq!( session.now_playing().await.unwrap().title, "song a" );

        // Completion tagged with a generation that never matched
        let _ = session.ctx.events.send( SessionEvent::Completed {
            generation: 0,
            outcome: PlaybackOutcome::Finished,
        });
        settle().await;

        assert_eq!( session.now_playing().await.unwrap().title, "song a" );
        assert_eq!( backend.started_titles(), vec![ "song a" ] );
    }


    #[tokio::test]
    async fn test_duplicate_completion_advances_once() {
        let ( session, _extractor, backend ) = harness();

        session.play( "song a" ).await.unwrap();
        session.play( "song b" ).await.unwrap();
        settle().await;

        let generation = session.ctx.state.lock().await.generation;
        let handle = backend.last_handle().unwrap();

        // The real completion plus a duplicate of the same signal
        backend.complete( handle );
        let _ = session.ctx.events.send( SessionEvent::Completed {
            generation,
            outcome: PlaybackOutcome::Finished,
        });
        settle().await;

        // One advance: a then b, never a double-pop past b
        assert_eq!( backend.started_titles(), vec![ "song a", "song b" ] );
        assert_eq!( session.now_playing().await.unwrap().title, "song b" );
        let ( _, queue ) = session.queue_snapshot().await;
        assert!( queue.is_empty() );
    }


    #[tokio::test]
    async fn test_skip_racing_natural_end_advances_once() {
        let ( session, _extractor, backend ) = harness();

        session.play( "song a" ).await.unwrap();
        session.play( "song b" ).await.unwrap();
        settle().await;

        let handle = backend.last_handle().unwrap();

        // Natural end fires while a skip is in flight
        let racing = {
            let session = session.clone();
            tokio::spawn( async move { session.skip().await } )
        };
        backend.complete( handle );
        let _ = racing.await.unwrap();
        settle().await;

        assert_eq!( backend.started_titles(), vec![ "song a", "song b" ] );
        assert_eq!( session.now_playing().await.unwrap().title, "song b" );
    }


    #[tokio::test]
    async fn test_loop_track_replays_current() {
        let ( session, _extractor, backend ) = harness();

        session.play( "song a" ).await.unwrap();
        settle().await;
        session.set_loop( Some( LoopMode::Track ) ).await;

        for _ in 0..3 {
            backend.complete( backend.last_handle().unwrap() );
            settle().await;
        }

        assert_eq!( backend.started_titles(), vec![ "song a"; 4 ] );
        assert_eq!( session.now_playing().await.unwrap().title, "song a" );
    }


    #[tokio::test]
    async fn test_loop_queue_rotates() {
        let ( session, _extractor, backend ) = harness();

        session.play( "song a" ).await.unwrap();
        session.play( "song b" ).await.unwrap();
        settle().await;
        session.set_loop( Some( LoopMode::Queue ) ).await;

        backend.complete( backend.last_handle().unwrap() );
        settle().await;
        assert_eq!( session.now_playing().await.unwrap().title, "song b" );
        let ( _, queue ) = session.queue_snapshot().await;
        assert_eq!( queue[ 0 ].title, "song a" );

        backend.complete( backend.last_handle().unwrap() );
        settle().await;
        assert_eq!( session.now_playing().await.unwrap().title, "song a" );
        let ( _, queue ) = session.queue_snapshot().await;
        assert_eq!( queue[ 0 ].title, "song b" );
    }


    #[tokio::test]
    async fn test_flat_entry_resolves_before_invocation() {
        let ( session, _extractor, backend ) = harness();

        session.play( "https://example.com/watch?list=2" ).await.unwrap();
        settle().await;

        let started = backend.started();
        assert_eq!( started.len(), 1 );
        assert_eq!( started[ 0 ].title, "entry 1" );
        // The backend never sees a flat entry
        assert!( started[ 0 ].locator.is_some() );

        let ( current, queue ) = session.queue_snapshot().await;
        assert_eq!( current.unwrap().title, "entry 1" );
        assert_eq!( queue.len(), 1 );
        assert!( queue[ 0 ].is_flat() );
    }


    #[tokio::test]
    async fn test_unresolvable_entries_are_skipped() {
        let ( session, _extractor, backend ) = harness();

        {
            let mut state = session.ctx.state.lock().await;
            state.enqueue( Track::flat( "broken 1", "page://!fail 1", 0 ) );
            state.enqueue( Track::flat( "broken 2", "page://!fail 2", 0 ) );
            state.enqueue( Track::flat( "good", "page://good", 0 ) );
            let _ = session.ctx.events.send( SessionEvent::Kick {
                generation: state.generation,
            });
        }
        settle().await;

        assert_eq!( backend.started_titles(), vec![ "good" ] );
        assert_eq!( session.now_playing().await.unwrap().title, "good" );
    }


    #[tokio::test]
    async fn test_all_failing_queue_terminates_idle() {
        let ( session, _extractor, backend ) = harness();

        {
            let mut state = session.ctx.state.lock().await;
            for i in 0..4 {
                state.enqueue( Track::flat( format!( "broken {}", i ), "page://!fail", 0 ) );
            }
            let _ = session.ctx.events.send( SessionEvent::Kick {
                generation: state.generation,
            });
        }
        settle().await;

        assert!( backend.started_titles().is_empty() );
        assert_eq!( session.playback_state().await, PlaybackState::Idle );
        assert_eq!( backend.disconnects(), 1 );
    }


    #[tokio::test]
    async fn test_player_error_advances_like_completion() {
        let ( session, _extractor, backend ) = harness();

        session.play( "song a" ).await.unwrap();
        session.play( "song b" ).await.unwrap();
        settle().await;

        backend.fail_playback( backend.last_handle().unwrap() );
        settle().await;

        assert_eq!( session.now_playing().await.unwrap().title, "song b" );
    }


    #[tokio::test]
    async fn test_failed_start_falls_through_to_next() {
        let ( session, _extractor, backend ) = harness();

        backend.fail_next_starts( 1 );
        session.play( "song a" ).await.unwrap();
        session.play( "song b" ).await.unwrap();
        settle().await;

        assert_eq!( backend.started_titles(), vec![ "song b" ] );
        assert_eq!( session.now_playing().await.unwrap().title, "song b" );
    }
}
