use serde::{Deserialize, Serialize};
use url::Url;

/// Immutable per-connection parameters for the recognition stream.
///
/// These are encoded into the connection URL as query parameters, never into
/// message payloads. The defaults match what the audio pipeline produces:
/// linear16 PCM, 16 kHz, mono.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// WebSocket endpoint of the recognition service
    pub endpoint: String,

    /// Recognition model id
    pub model: String,

    /// Recognition language
    pub language: String,

    /// Apply smart formatting to results
    pub smart_format: bool,

    /// Add punctuation to results
    pub punctuate: bool,

    /// Emit interim (revisable) results in addition to final ones
    pub interim_results: bool,

    /// Audio encoding identifier on the wire
    pub encoding: String,

    /// Sample rate of the outbound audio in Hz
    pub sample_rate: u32,

    /// Channel count of the outbound audio
    pub channels: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            model: "nova-2".to_string(),
            language: "en".to_string(),
            smart_format: true,
            punctuate: true,
            interim_results: true,
            encoding: "linear16".to_string(),
            sample_rate: 16000,
            channels: 1,
        }
    }
}

impl ChannelConfig {
    /// Build the full connection URL with all parameters in the query string.
    pub fn url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.endpoint)?;

        url.query_pairs_mut()
            .append_pair("model", &self.model)
            .append_pair("language", &self.language)
            .append_pair("smart_format", &self.smart_format.to_string())
            .append_pair("punctuate", &self.punctuate.to_string())
            .append_pair("interim_results", &self.interim_results.to_string())
            .append_pair("encoding", &self.encoding)
            .append_pair("sample_rate", &self.sample_rate.to_string())
            .append_pair("channels", &self.channels.to_string());

        Ok(url)
    }
}
