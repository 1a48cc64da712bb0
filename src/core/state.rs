use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const NARRATOR: &str = "Narrator";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Narration,
    Dialogue,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Segment {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
}

impl Segment {
    pub fn narration(index: usize, text: &str) -> Self {
        Self {
            index,
            kind: SegmentKind::Narration,
            text: text.to_string(),
            speaker: None,
            emotion: None,
        }
    }

    pub fn dialogue(index: usize, speaker: &str, text: &str) -> Self {
        Self {
            index,
            kind: SegmentKind::Dialogue,
            text: text.to_string(),
            speaker: Some(speaker.to_string()),
            emotion: None,
        }
    }

    /// The voice this segment is read in; narration is always the Narrator.
    pub fn speaker_name(&self) -> &str {
        match self.kind {
            SegmentKind::Narration => NARRATOR,
            SegmentKind::Dialogue => self.speaker.as_deref().unwrap_or(NARRATOR),
        }
    }
}

/// Ordered output of the segmentation stage.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SegmentScript {
    pub segments: Vec<Segment>,
}

impl SegmentScript {
    /// Sorts by index and enforces the structural invariants every later stage
    /// relies on: unique indices, non-empty text, a speaker on every dialogue
    /// and none on narration.
    pub fn new(mut segments: Vec<Segment>) -> Result<Self> {
        segments.sort_by_key(|s| s.index);

        let mut seen = HashSet::new();
        for segment in &mut segments {
            if !seen.insert(segment.index) {
                bail!("Duplicate segment index {}", segment.index);
            }
            if segment.text.trim().is_empty() {
                bail!("Segment {} has empty text", segment.index);
            }
            match segment.kind {
                SegmentKind::Narration => segment.speaker = None,
                SegmentKind::Dialogue => {
                    let has_speaker = segment
                        .speaker
                        .as_deref()
                        .is_some_and(|s| !s.trim().is_empty());
                    if !has_speaker {
                        bail!("Dialogue segment {} has no speaker", segment.index);
                    }
                }
            }
        }

        Ok(Self { segments })
    }

    pub fn dialogues(&self) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Dialogue)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Emotion {
    pub primary_emotion: String,
    pub intensity: String,
    pub voice_modulation: String,
}

impl Emotion {
    pub fn neutral() -> Self {
        Self {
            primary_emotion: "neutral".to_string(),
            intensity: "medium".to_string(),
            voice_modulation: "normal".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DialogueLine {
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmotionRecord {
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub emotion: Emotion,
}

/// Emotion for a dialogue segment, matched on exact `(speaker, text)`.
/// Anything that does not match exactly is read neutrally.
pub fn emotion_for(records: &[EmotionRecord], speaker: &str, text: &str) -> Emotion {
    records
        .iter()
        .find(|r| r.speaker == speaker && r.text == text)
        .map(|r| r.emotion.clone())
        .unwrap_or_else(Emotion::neutral)
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct CharacterProfile {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct CharacterRoster {
    pub characters: BTreeMap<String, CharacterProfile>,
    #[serde(default)]
    pub dialogues: Vec<DialogueLine>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ExtractedText {
    /// Page count for sources that have no pages of their own.
    pub fn estimate_pages(text: &str) -> usize {
        text.chars().count().div_ceil(2000)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AudioSegmentArtifact {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    pub filename: String,
    #[serde(default)]
    pub filepath: PathBuf,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioManifest {
    pub generated_at: DateTime<Utc>,
    pub total_segments: usize,
    pub segments: Vec<AudioSegmentArtifact>,
}

impl AudioManifest {
    pub fn new(segments: Vec<AudioSegmentArtifact>) -> Self {
        Self {
            generated_at: Utc::now(),
            total_segments: segments.len(),
            segments,
        }
    }

    /// Segments in concatenation order, independent of how they were stored.
    pub fn ordered(&self) -> Vec<&AudioSegmentArtifact> {
        let mut ordered: Vec<&AudioSegmentArtifact> = self.segments.iter().collect();
        ordered.sort_by_key(|s| s.index);
        ordered
    }

    /// Points every artifact at `dir`, where its file actually lives.
    pub fn rebase(&mut self, dir: &Path) {
        for segment in &mut self.segments {
            segment.filepath = dir.join(&segment.filename);
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Door,
    Footsteps,
    Rain,
    Tension,
    Technology,
    Glass,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EffectDuration {
    Short,
    Medium,
    Long,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EffectArtifact {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub effect: EffectKind,
    pub description: String,
    pub duration: EffectDuration,
    /// Index of the segment that triggered the effect; placement only.
    pub after_segment: usize,
    pub filename: String,
    #[serde(default)]
    pub filepath: PathBuf,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EffectsManifest {
    pub generated_at: DateTime<Utc>,
    pub total_effects: usize,
    pub effects: Vec<EffectArtifact>,
}

impl EffectsManifest {
    pub fn new(effects: Vec<EffectArtifact>) -> Self {
        Self {
            generated_at: Utc::now(),
            total_effects: effects.len(),
            effects,
        }
    }

    pub fn rebase(&mut self, dir: &Path) {
        for effect in &mut self.effects {
            effect.filepath = dir.join(&effect.filename);
        }
    }
}
