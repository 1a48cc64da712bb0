use crate::core::config::AudioConfig;
use crate::services::voices::VoiceSettings;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::info;
use tokio::sync::OnceCell;

#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>>;
}

pub fn create_tts_client(config: &AudioConfig) -> Result<Box<dyn TtsClient>> {
    info!("Initializing TTS Client for provider: {}", config.provider);
    match config.provider.as_str() {
        "elevenlabs" => {
            let client = elevenlabs::ElevenLabsClient::new(config.elevenlabs.clone())?;
            Ok(Box::new(client))
        }
        _ => Err(anyhow!("Unknown TTS provider: {}", config.provider)),
    }
}

pub struct LazyTts {
    config: AudioConfig,
    client: OnceCell<Box<dyn TtsClient>>,
}

impl LazyTts {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }
}

#[async_trait]
impl TtsClient for LazyTts {
    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>> {
        let client = self
            .client
            .get_or_try_init(|| async { create_tts_client(&self.config) })
            .await?;
        client.synthesize(voice_id, text, settings).await
    }
}

pub mod elevenlabs;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = AudioConfig {
            provider: "edge-tts".to_string(),
            ..AudioConfig::default()
        };
        assert!(create_tts_client(&config).is_err());
    }

    #[tokio::test]
    async fn test_lazy_client_fails_on_first_request_not_on_construction() {
        let client = LazyTts::new(AudioConfig::default());
        let result = client
            .synthesize("voice", "Hello.", &VoiceSettings::STANDARD)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_elevenlabs_requires_api_key() {
        let config = AudioConfig::default();
        assert!(config.elevenlabs.api_key.is_empty());
        assert!(create_tts_client(&config).is_err());

        let mut config = AudioConfig::default();
        config.elevenlabs.api_key = "xi-test".to_string();
        assert!(create_tts_client(&config).is_ok());
    }
}
