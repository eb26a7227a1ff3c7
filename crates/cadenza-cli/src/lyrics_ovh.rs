//! lyrics.ovh client.

use async_trait::async_trait;
use serde::Deserialize;

use cadenza_core::{ LyricsError, LyricsSource };


const API_BASE: &str = "https://api.lyrics.ovh/v1";

/// Replies longer than this get truncated (chat message limit).
const MAX_LEN: usize = 1900;


#[derive( Deserialize )]
struct LyricsReply {
    lyrics: Option<String>,
}


pub struct LyricsOvh {
    client: reqwest::Client,
}


impl LyricsOvh {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}


#[async_trait]
impl LyricsSource for LyricsOvh {
    async fn lookup( &self, artist: &str, title: &str ) -> Result<String, LyricsError> {
        let url = format!( "{}/{}/{}", API_BASE, artist, title );

        let resp = self.client
            .get( &url )
            .send()
            .await
            .map_err( |e| LyricsError::Failed( e.to_string() ) )?;

        if !resp.status().is_success() {
            return Err( LyricsError::NotFound );
        }

        let reply: LyricsReply = resp
            .json()
            .await
            .map_err( |e| LyricsError::Failed( e.to_string() ) )?;

        let mut text = match reply.lyrics {
            Some( text ) if !text.is_empty() => text,
            _ => return Err( LyricsError::NotFound ),
        };

        if text.len() > MAX_LEN {
            let mut cut = MAX_LEN;
            while !text.is_char_boundary( cut ) {
                cut -= 1;
            }
            text.truncate( cut );
            text.push_str( "\n..." );
        }

        Ok( text )
    }
}
