//! Track values and extraction results.
//!
//! A [`Track`] is immutable once resolved. Flat playlist entries carry
//! no stream locator yet; they get a resolution pass right before they
//! are handed to the audio backend.


/// One playable item.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Track {
    /// Display title.
    pub title: String,

    /// Direct audio stream locator. `None` marks a flat playlist entry
    /// whose locator is resolved lazily before playback.
    pub locator: Option<String>,

    /// Canonical page URL the track came from. Re-resolution goes
    /// through this, never through an expired locator.
    pub page_url: String,

    /// Track length in seconds. 0 means live or unknown.
    pub duration_secs: u64,
}


impl Track {
    /// Creates a fully resolved track, ready for the audio backend.
    pub fn resolved(
        title: impl Into<String>,
        locator: impl Into<String>,
        page_url: impl Into<String>,
        duration_secs: u64,
    ) -> Self {
        Self {
            title: title.into(),
            locator: Some( locator.into() ),
            page_url: page_url.into(),
            duration_secs,
        }
    }


    /// Creates a flat playlist entry (page URL only).
    pub fn flat( title: impl Into<String>, page_url: impl Into<String>, duration_secs: u64 ) -> Self {
        Self {
            title: title.into(),
            locator: None,
            page_url: page_url.into(),
            duration_secs,
        }
    }


    /// Returns true if this entry still needs a resolution pass.
    pub fn is_flat( &self ) -> bool {
        self.locator.is_none()
    }
}


/// Formats a duration in seconds as `M:SS` or `H:MM:SS`.
///
/// 0 is rendered as "Live / Unknown" since extractors report that for
/// livestreams and for entries they could not probe.
pub fn format_duration( secs: u64 ) -> String {
    if secs == 0 {
        return "Live / Unknown".to_string();
    }

    let ( h, rem ) = ( secs / 3600, secs % 3600 );
    let ( m, s ) = ( rem / 60, rem % 60 );

    if h > 0 {
        format!( "{}:{:02}:{:02}", h, m, s )
    } else {
        format!( "{}:{:02}", m, s )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_flat_has_no_locator() {
        let track = Track::flat( "Song", "https://example.com/watch?v=1", 120 );
        assert!( track.is_flat() );

        let track = Track::resolved( "Song", "https://cdn.example.com/a.webm", "https://example.com/watch?v=1", 120 );
        assert!( !track.is_flat() );
    }


    #[test]
    fn test_format_duration_short() {
        assert_eq!( format_duration( 90 ), "1:30" );
        assert_eq!( format_duration( 5 ), "0:05" );
    }


    #[test]
    fn test_format_duration_hours() {
        assert_eq!( format_duration( 3600 ), "1:00:00" );
        assert_eq!( format_duration( 3725 ), "1:02:05" );
    }


    #[test]
    fn test_format_duration_unknown() {
        assert_eq!( format_duration( 0 ), "Live / Unknown" );
    }
}
