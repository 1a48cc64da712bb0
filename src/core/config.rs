use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::services::llm::LlmConfig;
use crate::services::tts::elevenlabs::ElevenLabsConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_input_file")]
    pub input_file: String,

    #[serde(default = "default_build")]
    pub build_folder: String,

    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_output_name")]
    pub output_name: String,

    #[serde(default)]
    pub book_title: Option<String>,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub extract: ExtractConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AudioConfig {
    #[serde(default = "default_tts_provider")]
    pub provider: String,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    #[serde(default = "default_synthesis_delay")]
    pub synthesis_delay_ms: u64,

    #[serde(default = "default_effect_delay")]
    pub effect_delay_ms: u64,

    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_pdftotext")]
    pub pdftotext_path: String,
}

fn default_input_file() -> String {
    "chapter1.txt".to_string()
}
fn default_build() -> String {
    "build".to_string()
}
fn default_output() -> String {
    "output".to_string()
}
fn default_output_name() -> String {
    "audiobook.mp3".to_string()
}
fn default_tts_provider() -> String {
    "elevenlabs".to_string()
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}
fn default_pdftotext() -> String {
    "pdftotext".to_string()
}
fn default_synthesis_delay() -> u64 {
    500
}
fn default_effect_delay() -> u64 {
    1000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            ffmpeg_path: default_ffmpeg(),
            synthesis_delay_ms: default_synthesis_delay(),
            effect_delay_ms: default_effect_delay(),
            elevenlabs: ElevenLabsConfig::default(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            pdftotext_path: default_pdftotext(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_file: default_input_file(),
            build_folder: default_build(),
            output_folder: default_output(),
            output_name: default_output_name(),
            book_title: None,
            llm: LlmConfig::default(),
            audio: AudioConfig::default(),
            extract: ExtractConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            Self::from_yaml(&content).with_context(|| format!("Failed to parse {:?}", path))?
        } else {
            warn!("{:?} not found, using default configuration", path);
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml_ng::from_str(content)?)
    }

    fn apply_env(&mut self) {
        let _ = dotenvy::dotenv();
        self.llm.apply_env(|key| std::env::var(key).ok());
        if self.audio.elevenlabs.api_key.is_empty() {
            if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
                self.audio.elevenlabs.api_key = key;
            }
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.build_folder)?;
        fs::create_dir_all(&self.output_folder)?;
        Ok(())
    }

    pub fn build_dir(&self) -> PathBuf {
        PathBuf::from(&self.build_folder)
    }

    pub fn output_path(&self) -> PathBuf {
        Path::new(&self.output_folder).join(&self.output_name)
    }

    // <stem>_with_effects.<ext> next to the plain audiobook
    pub fn effects_output_path(&self) -> PathBuf {
        let plain = Path::new(&self.output_name);
        let stem = plain
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audiobook".to_string());
        let name = match plain.extension() {
            Some(ext) => format!("{}_with_effects.{}", stem, ext.to_string_lossy()),
            None => format!("{}_with_effects", stem),
        };
        Path::new(&self.output_folder).join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_yields_defaults() -> Result<()> {
        let config = Config::from_yaml("")?;
        assert_eq!(config.build_folder, "build");
        assert_eq!(config.audio.synthesis_delay_ms, 500);
        assert_eq!(config.audio.effect_delay_ms, 1000);
        assert_eq!(config.audio.elevenlabs.model_id, "eleven_turbo_v2_5");
        Ok(())
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() -> Result<()> {
        let yaml = r#"
input_file: book/chapter1.pdf
llm:
  provider: ollama
  ollama:
    base_url: http://localhost:11434
    model: llama3
audio:
  synthesis_delay_ms: 0
"#;
        let config = Config::from_yaml(yaml)?;
        assert_eq!(config.input_file, "book/chapter1.pdf");
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.audio.synthesis_delay_ms, 0);
        assert_eq!(config.audio.effect_delay_ms, 1000);
        assert_eq!(config.audio.ffmpeg_path, "ffmpeg");
        assert_eq!(config.output_name, "audiobook.mp3");
        Ok(())
    }

    #[test]
    fn test_effects_output_path() {
        let config = Config {
            output_folder: "out".to_string(),
            output_name: "chapter1.mp3".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.effects_output_path(),
            Path::new("out").join("chapter1_with_effects.mp3")
        );
    }
}
