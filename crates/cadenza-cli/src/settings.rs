//! Persistent console settings.
//!
//! Small JSON file under the platform config directory. A missing file
//! is created with defaults on first load so it can be edited; an
//! unreadable one falls back to defaults.

use std::fs;
use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };


#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Volume percentage new sessions start at.
    pub default_volume: u32,

    /// Deadline in seconds for a single extractor call.
    pub extract_timeout_secs: u64,

    /// Simulated playback speedup for the timer backend.
    pub time_scale: u32,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            default_volume: 50,
            extract_timeout_secs: 20,
            time_scale: 60,
        }
    }
}


impl Settings {
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "cadenza" ).join( "settings.json" ) )
    }


    /// Loads settings from disk. On first run the defaults are written
    /// out so the file exists for editing.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some( path ) => Self::load_from( &path ),
            None => Self::default(),
        }
    }


    fn load_from( path: &Path ) -> Self {
        if !path.exists() {
            let settings = Self::default();
            settings.save_to( path );
            return settings;
        }

        match fs::read_to_string( path ) {
            Ok( contents ) => {
                serde_json::from_str( &contents ).unwrap_or_default()
            }
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    fn save_to( &self, path: &Path ) {
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn scratch_path( name: &str ) -> PathBuf {
        std::env::temp_dir()
            .join( format!( "cadenza-settings-{}-{}", name, std::process::id() ) )
            .join( "settings.json" )
    }


    #[test]
    fn test_first_load_writes_defaults() {
        let path = scratch_path( "first-load" );
        let _ = fs::remove_dir_all( path.parent().unwrap() );

        let settings = Settings::load_from( &path );
        assert_eq!( settings, Settings::default() );
        assert!( path.exists() );

        let _ = fs::remove_dir_all( path.parent().unwrap() );
    }


    #[test]
    fn test_saved_settings_round_trip() {
        let path = scratch_path( "round-trip" );
        let _ = fs::remove_dir_all( path.parent().unwrap() );

        let settings = Settings {
            default_volume: 80,
            extract_timeout_secs: 5,
            time_scale: 10,
        };
        settings.save_to( &path );
        assert_eq!( Settings::load_from( &path ), settings );

        let _ = fs::remove_dir_all( path.parent().unwrap() );
    }


    #[test]
    fn test_garbage_file_falls_back_to_defaults() {
        let path = scratch_path( "garbage" );
        let _ = fs::remove_dir_all( path.parent().unwrap() );
        fs::create_dir_all( path.parent().unwrap() ).unwrap();
        fs::write( &path, "not json" ).unwrap();

        assert_eq!( Settings::load_from( &path ), Settings::default() );

        let _ = fs::remove_dir_all( path.parent().unwrap() );
    }
}
