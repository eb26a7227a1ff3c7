//! Metadata extractor contract and source classification.
//!
//! The extractor turns a search term, a direct link, or a playlist URL
//! into [`Track`] values. Calls are slow and non-cancellable, so the
//! core always issues them off the session's owning context and under
//! a timeout.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::track::Track;


/// Errors from query/URL resolution.
#[derive( Debug, Error )]
pub enum ExtractError {
    #[error( "extraction failed: {0}" )]
    Failed( String ),

    #[error( "extraction timed out after {0:?}" )]
    Timeout( Duration ),

    #[error( "{0}" )]
    UnsupportedSource( String ),
}


/// Resolves user queries into playable tracks.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resolves a search term or single-track URL into one fully
    /// resolved track.
    async fn resolve( &self, query: &str ) -> Result<Track, ExtractError>;

    /// Resolves a playlist URL into its entries, in source order, as
    /// flat tracks (page URL only - locators are resolved lazily right
    /// before playback).
    async fn resolve_playlist( &self, url: &str ) -> Result<Vec<Track>, ExtractError>;
}


/// What kind of source a raw query points at.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum SourceKind {
    /// Free-text search term.
    Search,

    /// Direct link to a single track.
    Direct,

    /// Playlist link; goes through `resolve_playlist`.
    Playlist,

    /// Spotify track link. The extractor maps it to a search via the
    /// public oEmbed endpoint.
    SpotifyTrack,

    /// Spotify album or playlist link. Walking those needs the full
    /// Spotify catalog API, which is not integrated.
    SpotifyCollection,
}


impl SourceKind {
    /// Classifies a raw user query.
    pub fn classify( query: &str ) -> Self {
        let query = query.trim();

        if let Some( rest ) = query
            .strip_prefix( "https://open.spotify.com/" )
            .or_else( || query.strip_prefix( "http://open.spotify.com/" ) )
        {
            if rest.starts_with( "track/" ) {
                return SourceKind::SpotifyTrack;
            }
            return SourceKind::SpotifyCollection;
        }

        if query.contains( "list=" )
            || ( query.contains( "soundcloud.com" ) && query.contains( "/sets/" ) )
            || ( query.contains( "bandcamp.com" ) && query.contains( "/album/" ) )
        {
            return SourceKind::Playlist;
        }

        if query.starts_with( "http://" ) || query.starts_with( "https://" ) {
            return SourceKind::Direct;
        }

        SourceKind::Search
    }
}


/// Runs `resolve` under a deadline.
pub async fn resolve_with_timeout(
    extractor: &dyn Extractor,
    query: &str,
    limit: Duration,
) -> Result<Track, ExtractError> {
    match tokio::time::timeout( limit, extractor.resolve( query ) ).await {
        Ok( result ) => result,
        Err( _ ) => Err( ExtractError::Timeout( limit ) ),
    }
}


/// Runs `resolve_playlist` under a deadline.
pub async fn resolve_playlist_with_timeout(
    extractor: &dyn Extractor,
    url: &str,
    limit: Duration,
) -> Result<Vec<Track>, ExtractError> {
    match tokio::time::timeout( limit, extractor.resolve_playlist( url ) ).await {
        Ok( result ) => result,
        Err( _ ) => Err( ExtractError::Timeout( limit ) ),
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_classify_search() {
        assert_eq!( SourceKind::classify( "never gonna give you up" ), SourceKind::Search );
    }


    #[test]
    fn test_classify_direct() {
        assert_eq!(
            SourceKind::classify( "https://example.com/watch?v=abc" ),
            SourceKind::Direct
        );
    }


    #[test]
    fn test_classify_playlist() {
        assert_eq!(
            SourceKind::classify( "https://example.com/watch?v=abc&list=PL123" ),
            SourceKind::Playlist
        );
        assert_eq!(
            SourceKind::classify( "https://soundcloud.com/artist/sets/mix" ),
            SourceKind::Playlist
        );
        assert_eq!(
            SourceKind::classify( "https://artist.bandcamp.com/album/cool" ),
            SourceKind::Playlist
        );
    }


    #[test]
    fn test_classify_spotify() {
        assert_eq!(
            SourceKind::classify( "https://open.spotify.com/track/6rqhFgbbKwnb9MLmUQDhG6" ),
            SourceKind::SpotifyTrack
        );
        assert_eq!(
            SourceKind::classify( "https://open.spotify.com/album/2guirTSEqLizK7j9i1MTTZ" ),
            SourceKind::SpotifyCollection
        );
        assert_eq!(
            SourceKind::classify( "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M" ),
            SourceKind::SpotifyCollection
        );
    }
}
