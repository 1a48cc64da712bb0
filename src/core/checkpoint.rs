use crate::core::io::Storage;
use crate::core::stage::Stage;
use anyhow::Result;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const EXTRACTED_TEXT_FILE: &str = "chapter_extracted.txt";
pub const SEGMENTS_FILE: &str = "sequential_segments.json";
pub const CHARACTERS_FILE: &str = "characters_and_dialogues.json";
pub const EMOTIONS_FILE: &str = "dialogues_with_emotions.json";
pub const VOICES_FILE: &str = "voice_assignments.json";
pub const AUDIO_MANIFEST_FILE: &str = "audiobook_manifest.json";
pub const EFFECTS_MANIFEST_FILE: &str = "sound_effects_manifest.json";
pub const CONCAT_LIST_FILE: &str = "segments.txt";

/// Stage artifacts under fixed names in the build folder.
///
/// A stage counts as done exactly when its artifact exists; there is no other
/// record of progress.
pub struct CheckpointStore {
    build_dir: PathBuf,
    final_output: PathBuf,
    storage: Arc<dyn Storage>,
}

impl CheckpointStore {
    pub fn new(build_dir: PathBuf, final_output: PathBuf, storage: Arc<dyn Storage>) -> Self {
        Self {
            build_dir,
            final_output,
            storage,
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn path_of(&self, stage: Stage) -> PathBuf {
        let name = match stage {
            Stage::ExtractText => EXTRACTED_TEXT_FILE,
            Stage::Segment => SEGMENTS_FILE,
            Stage::ExtractCharacters => CHARACTERS_FILE,
            Stage::AnalyzeEmotions => EMOTIONS_FILE,
            Stage::MapVoices => VOICES_FILE,
            Stage::GenerateAudio => AUDIO_MANIFEST_FILE,
            Stage::CombineAudio => return self.final_output.clone(),
            Stage::GenerateEffects => EFFECTS_MANIFEST_FILE,
        };
        self.build_dir.join(name)
    }

    pub async fn is_done(&self, stage: Stage) -> bool {
        match self.storage.exists(&self.path_of(stage)).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Could not check checkpoint for {}: {}", stage, e);
                false
            }
        }
    }

    /// Reads a JSON checkpoint. Absent or unreadable files count as "not done".
    pub async fn load<T: DeserializeOwned>(&self, stage: Stage) -> Option<T> {
        let path = self.path_of(stage);
        if !self.is_done(stage).await {
            return None;
        }
        let content = match self.storage.read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read checkpoint {:?}: {}", path, e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring corrupt checkpoint {:?}: {}", path, e);
                None
            }
        }
    }

    pub async fn save<T: Serialize>(&self, stage: Stage, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)?;
        self.storage
            .write(&self.path_of(stage), content.as_bytes())
            .await
    }

    pub async fn load_text(&self) -> Option<String> {
        let path = self.path_of(Stage::ExtractText);
        if !self.is_done(Stage::ExtractText).await {
            return None;
        }
        match self.storage.read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Failed to read checkpoint {:?}: {}", path, e);
                None
            }
        }
    }

    pub async fn save_text(&self, text: &str) -> Result<()> {
        self.storage
            .write(&self.path_of(Stage::ExtractText), text.as_bytes())
            .await
    }
}
