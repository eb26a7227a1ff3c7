//! Session queue.
//!
//! Plain FIFO of tracks: insertion order is playback order, except for
//! the explicit remove/shuffle/clear commands.

use std::collections::VecDeque;

use rand::seq::SliceRandom;

use crate::track::Track;


/// Outcome of a shuffle request.
///
/// Shuffling fewer than two entries is reported as a no-op condition,
/// not an error.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Shuffled {
    /// The queue was shuffled; carries the number of entries.
    Ok( usize ),

    /// Queue had fewer than two entries, nothing to do.
    TooFew,
}


/// Ordered track queue for one session.
#[derive( Debug, Default, Clone )]
pub struct TrackQueue {
    tracks: VecDeque<Track>,
}


impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }


    /// Appends a track; returns its 1-based queue position.
    pub fn push_back( &mut self, track: Track ) -> usize {
        self.tracks.push_back( track );
        self.tracks.len()
    }


    /// Appends many tracks in order; returns the number added.
    pub fn extend( &mut self, tracks: impl IntoIterator<Item = Track> ) -> usize {
        let before = self.tracks.len();
        self.tracks.extend( tracks );
        self.tracks.len() - before
    }


    /// Removes and returns the front entry.
    pub fn pop_front( &mut self ) -> Option<Track> {
        self.tracks.pop_front()
    }


    /// Removes the entry at a 0-based index.
    pub fn remove( &mut self, index: usize ) -> Option<Track> {
        self.tracks.remove( index )
    }


    /// Clears the queue; returns the number of entries dropped.
    pub fn clear( &mut self ) -> usize {
        let count = self.tracks.len();
        self.tracks.clear();
        count
    }


    /// Shuffles the queue in place (Fisher-Yates via `rand`).
    pub fn shuffle( &mut self ) -> Shuffled {
        if self.tracks.len() < 2 {
            return Shuffled::TooFew;
        }

        self.tracks.make_contiguous().shuffle( &mut rand::thread_rng() );
        Shuffled::Ok( self.tracks.len() )
    }


    pub fn iter( &self ) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }


    /// Clones the queue contents in order, for display.
    pub fn snapshot( &self ) -> Vec<Track> {
        self.tracks.iter().cloned().collect()
    }


    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn track( title: &str ) -> Track {
        Track::resolved( title, format!( "stream://{}", title ), format!( "page://{}", title ), 180 )
    }


    #[test]
    fn test_insertion_order_is_playback_order() {
        let mut queue = TrackQueue::new();
        assert_eq!( queue.push_back( track( "a" ) ), 1 );
        assert_eq!( queue.push_back( track( "b" ) ), 2 );
        assert_eq!( queue.push_back( track( "c" ) ), 3 );

        assert_eq!( queue.len(), 3 );
        assert_eq!( queue.pop_front().unwrap().title, "a" );
        assert_eq!( queue.pop_front().unwrap().title, "b" );
        assert_eq!( queue.pop_front().unwrap().title, "c" );
        assert!( queue.pop_front().is_none() );
    }


    #[test]
    fn test_remove_shifts_later_entries_left() {
        let mut queue = TrackQueue::new();
        for title in [ "a", "b", "c", "d" ] {
            queue.push_back( track( title ) );
        }

        let removed = queue.remove( 1 ).unwrap();
        assert_eq!( removed.title, "b" );

        let titles: Vec<_> = queue.iter().map( |t| t.title.as_str() ).collect();
        assert_eq!( titles, vec![ "a", "c", "d" ] );
    }


    #[test]
    fn test_remove_out_of_range() {
        let mut queue = TrackQueue::new();
        queue.push_back( track( "a" ) );
        assert!( queue.remove( 1 ).is_none() );
    }


    #[test]
    fn test_shuffle_too_few() {
        let mut queue = TrackQueue::new();
        assert_eq!( queue.shuffle(), Shuffled::TooFew );

        queue.push_back( track( "a" ) );
        assert_eq!( queue.shuffle(), Shuffled::TooFew );
    }


    #[test]
    fn test_shuffle_keeps_entries() {
        let mut queue = TrackQueue::new();
        for i in 0..8 {
            queue.push_back( track( &format!( "t{}", i ) ) );
        }

        assert_eq!( queue.shuffle(), Shuffled::Ok( 8 ) );
        assert_eq!( queue.len(), 8 );

        let mut titles: Vec<_> = queue.iter().map( |t| t.title.clone() ).collect();
        titles.sort();
        let expected: Vec<_> = ( 0..8 ).map( |i| format!( "t{}", i ) ).collect();
        assert_eq!( titles, expected );
    }


    #[test]
    fn test_clear_reports_count() {
        let mut queue = TrackQueue::new();
        queue.push_back( track( "a" ) );
        queue.push_back( track( "b" ) );

        assert_eq!( queue.clear(), 2 );
        assert!( queue.is_empty() );
        assert_eq!( queue.clear(), 0 );
    }
}
