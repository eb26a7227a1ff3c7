//! Cadenza Core - playback session engine
//!
//! This crate provides the per-channel playback sessions of a music
//! bot: queue management, loop modes, the session registry, and the
//! continuation driver that turns player completion signals into the
//! next track. Audio transport, metadata extraction, and lyrics lookup
//! are external collaborators behind traits.

pub mod command;
pub mod driver;
pub mod extract;
pub mod lyrics;
pub mod player;
pub mod queue;
pub mod session;
pub mod store;
pub mod track;

#[cfg( test )]
pub( crate ) mod testutil;

pub use command::{ Command, CommandError, LoopModeArg };
pub use extract::{ ExtractError, Extractor, SourceKind };
pub use lyrics::{ LyricsError, LyricsSource };
pub use player::{ AudioBackend, Completion, PlaybackOutcome, PlayerError, PlayerHandle };
pub use queue::Shuffled;
pub use session::{ LoopMode, PlaybackState, SessionError };
pub use store::{ Enqueued, SessionConfig, SessionHandle, SessionKey, SessionStore };
pub use track::{ format_duration, Track };
