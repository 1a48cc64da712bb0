use crate::services::tts::TtsClient;
use crate::services::voices::VoiceSettings;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElevenLabsConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_model_id() -> String {
    "eleven_turbo_v2_5".to_string()
}

fn default_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model_id: default_model_id(),
            base_url: default_base_url(),
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

pub struct ElevenLabsClient {
    config: ElevenLabsConfig,
    base_url: Url,
    client: reqwest::Client,
}

impl ElevenLabsClient {
    pub fn new(config: ElevenLabsConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(anyhow!(
                "ElevenLabs API key missing (set audio.elevenlabs.api_key or ELEVENLABS_API_KEY)"
            ));
        }
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid ElevenLabs base_url {:?}", config.base_url))?;
        Ok(Self {
            config,
            base_url,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, voice_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("ElevenLabs base_url cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(["v1", "text-to-speech", voice_id]);
        Ok(url)
    }
}

#[async_trait]
impl TtsClient for ElevenLabsClient {
    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>> {
        let url = self.endpoint(voice_id)?;
        debug!("POST {} ({} chars)", url, text.chars().count());

        let body = SpeechRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: settings,
        };

        let resp = self
            .client
            .post(url)
            .header("xi-api-key", &self.config.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .context("Failed to send ElevenLabs request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("ElevenLabs API error ({}): {}", status, error_text));
        }

        let bytes = resp
            .bytes()
            .await
            .context("Failed to read ElevenLabs audio")?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ElevenLabsClient {
        ElevenLabsClient::new(ElevenLabsConfig {
            api_key: "xi-test".to_string(),
            base_url: base_url.to_string(),
            ..ElevenLabsConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_voice_id() {
        let url = client("https://api.elevenlabs.io")
            .endpoint("EXAVITQu4vr4xnSDxMaL")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.elevenlabs.io/v1/text-to-speech/EXAVITQu4vr4xnSDxMaL"
        );

        let url = client("http://localhost:8080/proxy/").endpoint("abc").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/proxy/v1/text-to-speech/abc");
    }

    #[test]
    fn test_request_body_shape() {
        let body = SpeechRequest {
            text: "What do you want?",
            model_id: "eleven_turbo_v2_5",
            voice_settings: &VoiceSettings::PROTAGONIST,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model_id"], "eleven_turbo_v2_5");
        assert_eq!(value["voice_settings"]["use_speaker_boost"], true);
        assert!(value["voice_settings"]["stability"].as_f64().is_some());
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let result = ElevenLabsClient::new(ElevenLabsConfig {
            api_key: "xi-test".to_string(),
            base_url: "not a url".to_string(),
            ..ElevenLabsConfig::default()
        });
        assert!(result.is_err());
    }
}
