use crate::core::checkpoint::CheckpointStore;
use crate::core::config::Config;
use crate::core::io::Storage;
use crate::core::stage::{RunOptions, Stage, StageMode};
use crate::core::state::{
    AudioManifest, CharacterRoster, EffectsManifest, EmotionRecord, ExtractedText, SegmentScript,
};
use crate::services::analyzer::{dialogue_lines, TextAnalyzer};
use crate::services::effects::{detect_effects, EffectSynthesizer};
use crate::services::extract::{default_extractors, extract_text, TextExtractor};
use crate::services::llm::LlmClient;
use crate::services::synthesizer::SegmentSynthesizer;
use crate::services::tts::TtsClient;
use crate::services::voices::VoiceAssignments;
use crate::utils::audio::{concat_segments, mix_effects, AudioTool};
use crate::utils::pacer::Pacer;
use anyhow::Result;
use log::{info, warn};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct PipelineState {
    pub text: Option<ExtractedText>,
    pub segments: Option<SegmentScript>,
    pub roster: Option<CharacterRoster>,
    pub emotions: Option<Vec<EmotionRecord>>,
    pub voices: Option<VoiceAssignments>,
    pub audio: Option<AudioManifest>,
    pub audiobook: Option<PathBuf>,
    pub effects: Option<EffectsManifest>,
    pub mixed: Option<PathBuf>,
}

enum Step<T> {
    Done(Option<T>),
    Run { force: bool },
}

pub struct WorkflowManager {
    config: Config,
    llm: Box<dyn LlmClient>,
    tts: Box<dyn TtsClient>,
    audio: Box<dyn AudioTool>,
    extractors: Vec<Box<dyn TextExtractor>>,
    checkpoints: CheckpointStore,
}

impl WorkflowManager {
    pub fn new(
        config: Config,
        llm: Box<dyn LlmClient>,
        tts: Box<dyn TtsClient>,
        audio: Box<dyn AudioTool>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let checkpoints = CheckpointStore::new(config.build_dir(), config.output_path(), storage);
        let extractors = default_extractors(&config.extract.pdftotext_path);
        Self {
            config,
            llm,
            tts,
            audio,
            extractors,
            checkpoints,
        }
    }

    pub fn with_extractors(mut self, extractors: Vec<Box<dyn TextExtractor>>) -> Self {
        self.extractors = extractors;
        self
    }

    fn storage(&self) -> &dyn Storage {
        self.checkpoints.storage()
    }

    async fn begin<T: DeserializeOwned>(&self, stage: Stage, options: &RunOptions) -> Step<T> {
        match options.mode(stage) {
            StageMode::LoadOnly => {
                let value = self.checkpoints.load(stage).await;
                if value.is_some() {
                    info!("{}: skipped, loaded previous result", stage);
                } else {
                    info!("{}: skipped, no previous result", stage);
                }
                Step::Done(value)
            }
            StageMode::Execute { force: false } => match self.checkpoints.load(stage).await {
                Some(value) => {
                    info!("{}: checkpoint found, loading", stage);
                    Step::Done(Some(value))
                }
                None => Step::Run { force: false },
            },
            StageMode::Execute { force: true } => Step::Run { force: true },
        }
    }

    pub async fn run(&self, options: &RunOptions) -> Result<PipelineState> {
        let mut state = PipelineState {
            text: self.extract_stage(options).await?,
            ..PipelineState::default()
        };
        state.segments = self.segment_stage(options, &state).await?;
        state.roster = self.character_stage(options, &state).await?;
        state.emotions = self.emotion_stage(options, &state).await?;
        state.voices = self.voice_stage(options, &state).await?;

        // One pacer for every TTS call of the run, across stages.
        let mut pacer = Pacer::new(Duration::ZERO);
        state.audio = self.audio_stage(options, &state, &mut pacer).await?;
        state.audiobook = self.combine_stage(options, &state).await?;
        state.effects = self.effects_stage(options, &state, &mut pacer).await?;

        if options.mix_effects {
            state.mixed = self.mix_stage(&state).await?;
        }

        print_summary(&state);
        Ok(state)
    }

    async fn extract_stage(&self, options: &RunOptions) -> Result<Option<ExtractedText>> {
        let stage = Stage::ExtractText;
        let force = match options.mode(stage) {
            StageMode::LoadOnly => return Ok(self.cached_text().await),
            StageMode::Execute { force } => force,
        };
        if !force {
            if let Some(text) = self.cached_text().await {
                info!("{}: checkpoint found, loading", stage);
                return Ok(Some(text));
            }
        }

        info!("{}", stage);
        let extracted = extract_text(&self.extractors, Path::new(&self.config.input_file)).await?;
        self.checkpoints.save_text(&extracted.text).await?;
        Ok(Some(extracted))
    }

    async fn cached_text(&self) -> Option<ExtractedText> {
        let text = self.checkpoints.load_text().await?;
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), "cached".to_string());
        Some(ExtractedText {
            page_count: ExtractedText::estimate_pages(&text),
            text,
            metadata,
        })
    }

    async fn segment_stage(
        &self,
        options: &RunOptions,
        state: &PipelineState,
    ) -> Result<Option<SegmentScript>> {
        let stage = Stage::Segment;
        if let Step::Done(value) = self.begin(stage, options).await {
            return Ok(value);
        }
        let Some(text) = &state.text else {
            warn!("{}: no extracted text available, nothing to segment", stage);
            return Ok(None);
        };

        info!("{}", stage);
        let script = self.analyzer().segment(&text.text).await?;
        info!("Created {} segments", script.segments.len());
        self.checkpoints.save(stage, &script).await?;
        Ok(Some(script))
    }

    async fn character_stage(
        &self,
        options: &RunOptions,
        state: &PipelineState,
    ) -> Result<Option<CharacterRoster>> {
        let stage = Stage::ExtractCharacters;
        if let Step::Done(value) = self.begin(stage, options).await {
            return Ok(value);
        }
        let Some(text) = &state.text else {
            warn!("{}: no extracted text available, no characters found", stage);
            return Ok(None);
        };

        info!("{}", stage);
        let roster = self.analyzer().extract_characters(&text.text).await?;
        info!(
            "Found {} characters and {} dialogues",
            roster.characters.len(),
            roster.dialogues.len()
        );
        self.checkpoints.save(stage, &roster).await?;
        Ok(Some(roster))
    }

    async fn emotion_stage(
        &self,
        options: &RunOptions,
        state: &PipelineState,
    ) -> Result<Option<Vec<EmotionRecord>>> {
        let stage = Stage::AnalyzeEmotions;
        if let Step::Done(value) = self.begin(stage, options).await {
            return Ok(value);
        }
        let Some(script) = &state.segments else {
            warn!("{}: no segments available, dialogue will be read neutrally", stage);
            return Ok(None);
        };

        info!("{}", stage);
        let records = self
            .analyzer()
            .analyze_emotions(&dialogue_lines(script))
            .await;
        self.checkpoints.save(stage, &records).await?;
        Ok(Some(records))
    }

    async fn voice_stage(
        &self,
        options: &RunOptions,
        state: &PipelineState,
    ) -> Result<Option<VoiceAssignments>> {
        let stage = Stage::MapVoices;
        if let Step::Done(value) = self.begin(stage, options).await {
            return Ok(value);
        }
        let Some(roster) = &state.roster else {
            warn!("{}: no characters available, every line goes to the Narrator", stage);
            return Ok(Some(VoiceAssignments::assign(&CharacterRoster::default())));
        };

        info!("{}", stage);
        let voices = VoiceAssignments::assign(roster);
        self.checkpoints.save(stage, &voices).await?;
        Ok(Some(voices))
    }

    async fn audio_stage(
        &self,
        options: &RunOptions,
        state: &PipelineState,
        pacer: &mut Pacer,
    ) -> Result<Option<AudioManifest>> {
        let stage = Stage::GenerateAudio;
        let force = match self.begin::<AudioManifest>(stage, options).await {
            Step::Done(value) => {
                return Ok(value.map(|mut manifest| {
                    manifest.rebase(self.checkpoints.build_dir());
                    manifest
                }))
            }
            Step::Run { force } => force,
        };
        let Some(script) = &state.segments else {
            warn!("{}: no segments available, no audio generated", stage);
            return Ok(None);
        };

        info!("{}", stage);
        let emotions = state.emotions.as_deref().unwrap_or_default();
        let voices = state.voices.clone().unwrap_or_default();
        pacer.set_spacing(Duration::from_millis(self.config.audio.synthesis_delay_ms));
        let manifest = SegmentSynthesizer::new(
            self.tts.as_ref(),
            self.storage(),
            self.checkpoints.build_dir(),
            pacer,
        )
        .force(force)
        .synthesize(script, emotions, &voices)
        .await?;
        self.checkpoints.save(stage, &manifest).await?;
        Ok(Some(manifest))
    }

    async fn combine_stage(
        &self,
        options: &RunOptions,
        state: &PipelineState,
    ) -> Result<Option<PathBuf>> {
        let stage = Stage::CombineAudio;
        let output = self.checkpoints.path_of(stage);
        let done = self.checkpoints.is_done(stage).await;
        match options.mode(stage) {
            StageMode::LoadOnly => {
                info!("{}: skipped", stage);
                return Ok(done.then_some(output));
            }
            StageMode::Execute { force: false } if done => {
                info!("{}: checkpoint found at {:?}", stage, output);
                return Ok(Some(output));
            }
            StageMode::Execute { .. } => {}
        }
        let Some(manifest) = &state.audio else {
            warn!("{}: no audio manifest available, nothing to combine", stage);
            return Ok(None);
        };

        info!("{}", stage);
        concat_segments(
            self.audio.as_ref(),
            self.storage(),
            manifest,
            self.checkpoints.build_dir(),
            &output,
        )
        .await?;
        info!("Audiobook saved to {:?}", output);
        Ok(Some(output))
    }

    async fn effects_stage(
        &self,
        options: &RunOptions,
        state: &PipelineState,
        pacer: &mut Pacer,
    ) -> Result<Option<EffectsManifest>> {
        let stage = Stage::GenerateEffects;
        let force = match self.begin::<EffectsManifest>(stage, options).await {
            Step::Done(value) => {
                return Ok(value.map(|mut manifest| {
                    manifest.rebase(self.checkpoints.build_dir());
                    manifest
                }))
            }
            Step::Run { force } => force,
        };
        let Some(script) = &state.segments else {
            warn!("{}: no segments available, no effects detected", stage);
            return Ok(None);
        };

        info!("{}", stage);
        let candidates = detect_effects(&script.segments);
        info!("Detected {} sound effect opportunities", candidates.len());
        pacer.set_spacing(Duration::from_millis(self.config.audio.effect_delay_ms));
        let manifest = EffectSynthesizer::new(
            self.tts.as_ref(),
            self.storage(),
            self.checkpoints.build_dir(),
            pacer,
        )
        .force(force)
        .synthesize(&candidates)
        .await?;
        self.checkpoints.save(stage, &manifest).await?;
        Ok(Some(manifest))
    }

    async fn mix_stage(&self, state: &PipelineState) -> Result<Option<PathBuf>> {
        let (Some(audiobook), Some(effects)) = (&state.audiobook, &state.effects) else {
            warn!("Effect mixing needs both the audiobook and the effects manifest, skipping");
            return Ok(None);
        };

        let output = self.config.effects_output_path();
        if mix_effects(self.audio.as_ref(), audiobook, effects, &output).await? {
            Ok(Some(output))
        } else {
            Ok(None)
        }
    }

    fn analyzer(&self) -> TextAnalyzer<'_> {
        TextAnalyzer::new(self.llm.as_ref(), self.config.book_title.as_deref())
    }
}

fn print_summary(state: &PipelineState) {
    let characters = state.roster.as_ref().map_or(0, |r| r.characters.len());
    let segments = state.segments.as_ref().map_or(0, |s| s.segments.len());
    let audio_files = state.audio.as_ref().map_or(0, |m| m.total_segments);
    let effects = state.effects.as_ref().map_or(0, |m| m.total_effects);

    println!();
    println!("Audiobook generation summary");
    println!("  Characters found:        {}", characters);
    println!("  Total segments:          {}", segments);
    println!("  Audio files generated:   {}", audio_files);
    println!("  Sound effects generated: {}", effects);
    match &state.audiobook {
        Some(path) => println!("  Output: {}", path.display()),
        None => println!("  Output: not created"),
    }
    if let Some(path) = &state.mixed {
        println!("  Output with effects: {}", path.display());
    }
}
