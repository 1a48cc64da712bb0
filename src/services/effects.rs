use crate::core::io::Storage;
use crate::core::state::{EffectArtifact, EffectDuration, EffectKind, EffectsManifest, Segment};
use crate::services::synthesizer::file_slug;
use crate::services::tts::TtsClient;
use crate::services::voices::{VoicePreset, VoiceSettings};
use crate::utils::pacer::Pacer;
use anyhow::Result;
use log::{debug, info, warn};
use std::path::Path;

struct Trigger {
    effect: EffectKind,
    phrases: &'static [&'static str],
    description: &'static str,
    duration: EffectDuration,
}

const TRIGGERS: &[Trigger] = &[
    Trigger {
        effect: EffectKind::Door,
        phrases: &["door", "stepped in", "entered"],
        description: "door opening or closing",
        duration: EffectDuration::Short,
    },
    Trigger {
        effect: EffectKind::Footsteps,
        phrases: &["walked", "stepped", "paced"],
        description: "footsteps on hard floor",
        duration: EffectDuration::Short,
    },
    Trigger {
        effect: EffectKind::Rain,
        phrases: &["rain", "raining", "water dropping"],
        description: "gentle rain on window",
        duration: EffectDuration::Medium,
    },
    Trigger {
        effect: EffectKind::Tension,
        phrases: &["murder", "died", "killed"],
        description: "ominous tension, dramatic pause",
        duration: EffectDuration::Short,
    },
    Trigger {
        effect: EffectKind::Technology,
        phrases: &["tape reeled", "instrument searched"],
        description: "futuristic computer processing sounds",
        duration: EffectDuration::Short,
    },
    Trigger {
        effect: EffectKind::Glass,
        phrases: &["window", "glass", "transparent"],
        description: "subtle glass or window sound",
        duration: EffectDuration::Short,
    },
];

/// A place in the narrative where a short ambient sound could go.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectCandidate {
    pub effect: EffectKind,
    pub description: String,
    pub duration: EffectDuration,
    pub after_segment: usize,
}

/// Keyword scan over segment text. Every matching trigger yields its own
/// candidate, so one segment can produce several.
pub fn detect_effects(segments: &[Segment]) -> Vec<EffectCandidate> {
    let mut candidates = Vec::new();
    for segment in segments {
        let text = segment.text.to_lowercase();
        for trigger in TRIGGERS {
            if trigger.phrases.iter().any(|p| text.contains(p)) {
                candidates.push(EffectCandidate {
                    effect: trigger.effect,
                    description: trigger.description.to_string(),
                    duration: trigger.duration,
                    after_segment: segment.index,
                });
            }
        }
    }
    candidates
}

pub fn effect_filename(index: usize, description: &str) -> String {
    format!("ambient_{:03}_{}.mp3", index, file_slug(description))
}

/// Renders effect candidates as spoken ambient clips.
pub struct EffectSynthesizer<'a> {
    tts: &'a dyn TtsClient,
    storage: &'a dyn Storage,
    out_dir: &'a Path,
    pacer: &'a mut Pacer,
    force: bool,
}

impl<'a> EffectSynthesizer<'a> {
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

    /// Failed clips are skipped; the manifest holds only the clips that exist.
    pub async fn synthesize(&mut self, candidates: &[EffectCandidate]) -> Result<EffectsManifest> {
        let mut effects: Vec<EffectArtifact> = Vec::new();

        for candidate in candidates {
            let index = effects.len();
            let filename = effect_filename(index, &candidate.description);
            let filepath = self.out_dir.join(&filename);

            if !self.force && self.storage.exists(&filepath).await? {
                debug!("Reusing existing effect {:?}", filepath);
            } else {
                info!("Generating ambient effect: {}", candidate.description);
                let text = format!("*{}*", candidate.description);
                let audio = match self
                    .pacer
                    .pace(self.tts.synthesize(
                        VoicePreset::Bella.id(),
                        &text,
                        &VoiceSettings::AMBIENT,
                    ))
                    .await
                {
                    Ok(audio) => audio,
                    Err(e) => {
                        warn!(
                            "Skipping effect {:?} after segment {}: {:#}",
                            candidate.description, candidate.after_segment, e
                        );
                        continue;
                    }
                };
                if let Err(e) = self.storage.write(&filepath, &audio).await {
                    warn!("Skipping effect {:?}: {:#}", candidate.description, e);
                    continue;
                }
            }

            effects.push(EffectArtifact {
                index,
                kind: "ambient".to_string(),
                effect: candidate.effect,
                description: candidate.description.clone(),
                duration: candidate.duration,
                after_segment: candidate.after_segment,
                filename,
                filepath,
            });
        }

        info!(
            "Generated {} of {} sound effects",
            effects.len(),
            candidates.len()
        );
        Ok(EffectsManifest::new(effects))
    }
}
