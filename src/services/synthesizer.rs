use crate::core::io::Storage;
use crate::core::state::{
    emotion_for, AudioManifest, AudioSegmentArtifact, EmotionRecord, SegmentKind, SegmentScript,
};
use crate::services::emotion::adjust_for_emotion;
use crate::services::tts::TtsClient;
use crate::services::voices::{VoiceAssignments, VoiceSettings};
use crate::utils::pacer::Pacer;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::path::Path;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Keeps ASCII letters and digits, maps everything else to `_`.
pub fn file_slug(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Short digest of everything that determines the synthesized audio.
pub fn content_key(voice_id: &str, text: &str, settings: &VoiceSettings) -> String {
    let mut hasher = Sha256::new();
    hasher.update(voice_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(settings.stability.to_be_bytes());
    hasher.update(settings.similarity_boost.to_be_bytes());
    hasher.update(settings.style.to_be_bytes());
    hasher.update([settings.use_speaker_boost as u8]);
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

pub fn segment_filename(index: usize, speaker: &str, key: &str) -> String {
    format!("segment_{:04}_{}_{}.mp3", index, file_slug(speaker), key)
}

/// Turns a segment script into one audio file per segment, strictly in
/// index order and one call at a time. A file left by an earlier run is
/// reused only when voice, text and settings all match.
pub struct SegmentSynthesizer<'a> {
    tts: &'a dyn TtsClient,
    storage: &'a dyn Storage,
    out_dir: &'a Path,
    pacer: &'a mut Pacer,
    force: bool,
}

impl<'a> SegmentSynthesizer<'a> {
    pub fn new(
        tts: &'a dyn TtsClient,
        storage: &'a dyn Storage,
        out_dir: &'a Path,
        pacer: &'a mut Pacer,
    ) -> Self {
        Self {
            tts,
            storage,
            out_dir,
            pacer,
            force: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub async fn synthesize(
        &mut self,
        script: &SegmentScript,
        emotions: &[EmotionRecord],
        voices: &VoiceAssignments,
    ) -> Result<AudioManifest> {
        let mut ordered: Vec<_> = script.segments.iter().collect();
        ordered.sort_by_key(|s| s.index);

        let pb = ProgressBar::new(ordered.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_TEMPLATE)?
                .progress_chars("#>-"),
        );

        let mut artifacts: Vec<AudioSegmentArtifact> = Vec::with_capacity(ordered.len());
        for segment in ordered {
            let speaker = segment.speaker_name().to_string();
            let (assignment, settings, emotion) = match segment.kind {
                SegmentKind::Narration => {
                    let narrator = voices.narrator();
                    let settings = narrator.voice_settings;
                    (narrator, settings, None)
                }
                SegmentKind::Dialogue => {
                    let emotion = segment
                        .emotion
                        .clone()
                        .unwrap_or_else(|| emotion_for(emotions, &speaker, &segment.text));
                    let assignment = voices.resolve_or_narrator(&speaker);
                    let settings = adjust_for_emotion(&assignment.voice_settings, &emotion);
                    (assignment, settings, Some(emotion))
                }
            };

            let index = artifacts.len();
            let key = content_key(&assignment.voice_id, &segment.text, &settings);
            let filename = segment_filename(index, &speaker, &key);
            let filepath = self.out_dir.join(&filename);

            if !self.force && self.storage.exists(&filepath).await? {
                debug!("Reusing existing audio {:?}", filepath);
            } else {
                pb.set_message(speaker.clone());
                let audio = self
                    .pacer
                    .pace(
                        self.tts
                            .synthesize(&assignment.voice_id, &segment.text, &settings),
                    )
                    .await
                    .with_context(|| {
                        format!(
                            "Speech synthesis failed for segment {} ({})",
                            segment.index, speaker
                        )
                    })?;
                self.storage.write(&filepath, &audio).await?;
            }

            artifacts.push(AudioSegmentArtifact {
                index,
                kind: segment.kind,
                speaker,
                text: segment.text.clone(),
                emotion,
                filename,
                filepath,
            });
            pb.inc(1);
        }
        pb.finish_with_message("done");

        info!("Generated {} audio segments", artifacts.len());
        Ok(AudioManifest::new(artifacts))
    }
}
