//! Lyrics lookup contract.

use async_trait::async_trait;
use thiserror::Error;


#[derive( Debug, Error )]
pub enum LyricsError {
    #[error( "no lyrics found" )]
    NotFound,

    #[error( "lyrics lookup failed: {0}" )]
    Failed( String ),
}


/// External lyrics provider.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    async fn lookup( &self, artist: &str, title: &str ) -> Result<String, LyricsError>;
}


/// Splits a query into (artist, title). "Artist - Title" splits on the
/// first " - "; anything else searches with a wildcard artist.
pub fn split_query( query: &str ) -> ( &str, &str ) {
    match query.split_once( " - " ) {
        Some(( artist, title )) => ( artist.trim(), title.trim() ),
        None => ( "_", query.trim() ),
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_split_artist_title() {
        assert_eq!( split_query( "Rick Astley - Never Gonna Give You Up" ),
            ( "Rick Astley", "Never Gonna Give You Up" ) );
    }


    #[test]
    fn test_split_bare_title() {
        assert_eq!( split_query( "Never Gonna Give You Up" ),
            ( "_", "Never Gonna Give You Up" ) );
    }


    #[test]
    fn test_split_only_first_separator() {
        assert_eq!( split_query( "A - B - C" ), ( "A", "B - C" ) );
    }
}
