use crate::core::state::{
    CharacterRoster, DialogueLine, Emotion, EmotionRecord, Segment, SegmentScript,
};
use crate::services::llm::{ChatOptions, LlmClient};
use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::Deserialize;

const SEGMENT_TEMPERATURE: f32 = 0.1;
const CHARACTER_TEMPERATURE: f32 = 0.3;
const EMOTION_TEMPERATURE: f32 = 0.5;

const SEGMENT_SYSTEM: &str = "You are an expert at parsing novels for audiobook production. \
Your primary job is to correctly separate ALL dialogue from narration and assign each line \
to the appropriate character voice. Never let the narrator speak a character's dialogue. \
Respond with valid JSON only.";

const CHARACTER_SYSTEM: &str = "You are a literary analyst expert at identifying characters \
and extracting dialogue from fiction. Respond with valid JSON only.";

const EMOTION_SYSTEM: &str = "You are an expert at analyzing emotional tone and voice \
characteristics in dialogue. Respond with valid JSON only.";

/// Removes a surrounding markdown code fence, if any.
pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        s.to_string()
    }
}

#[derive(Deserialize)]
struct RawScript {
    segments: Vec<RawSegment>,
}

#[derive(Deserialize)]
struct RawSegment {
    #[serde(default, alias = "order")]
    index: Option<usize>,
    #[serde(rename = "type")]
    kind: String,
    text: String,
    #[serde(default)]
    speaker: Option<String>,
}

/// The three text-generation calls: segmentation, character extraction and
/// per-dialogue emotion analysis.
pub struct TextAnalyzer<'a> {
    llm: &'a dyn LlmClient,
    book_title: Option<&'a str>,
}

impl<'a> TextAnalyzer<'a> {
    pub fn new(llm: &'a dyn LlmClient, book_title: Option<&'a str>) -> Self {
        Self { llm, book_title }
    }

    fn source_label(&self) -> String {
        match self.book_title {
            Some(title) => format!("the following text from \"{}\"", title),
            None => "the following text".to_string(),
        }
    }

    pub async fn segment(&self, text: &str) -> Result<SegmentScript> {
        let prompt = format!(
            "Analyze {} and create a sequential audiobook structure.\n\
            CRITICAL: Extract ALL dialogue from narration and assign it to the correct character voices.\n\n\
            Return a JSON object with:\n\
            {{\n  \"segments\": [\n    {{\n      \"type\": \"narration\" | \"dialogue\",\n      \
            \"text\": \"the actual text content\",\n      \
            \"speaker\": \"character name (for dialogue) or Narrator (for narration)\",\n      \
            \"order\": sequential_number_starting_from_0\n    }}\n  ]\n}}\n\n\
            IMPORTANT RULES:\n\
            1. SEPARATE ALL DIALOGUE: any text in quotes is a dialogue segment with the correct speaker\n\
            2. IDENTIFY SPEAKERS: look for patterns like \"Baley said\", \"the Commissioner replied\"\n\
            3. CLEAN NARRATION: remove all quoted dialogue from narration segments\n\
            4. MAINTAIN ORDER: keep the exact sequence of the original text\n\
            5. SPLIT MIXED PARAGRAPHS: a paragraph with both narration and dialogue becomes separate segments\n\n\
            Example:\n\
            Original: \"Baley looked up. 'What do you want?' he asked.\"\n\
            Should become:\n\
            - Segment N (narration): \"Baley looked up.\"\n\
            - Segment N+1 (dialogue, speaker: Baley): \"What do you want?\"\n\
            - Segment N+2 (narration): \"he asked.\"\n\n\
            Text:\n{}",
            self.source_label(),
            text
        );

        let response = self
            .llm
            .chat(SEGMENT_SYSTEM, &prompt, &ChatOptions::json(SEGMENT_TEMPERATURE))
            .await
            .context("Segmentation request failed")?;
        parse_segments(&response)
    }

    pub async fn extract_characters(&self, text: &str) -> Result<CharacterRoster> {
        let prompt = format!(
            "Analyze {} and extract:\n\
            1. All character names that appear in the text\n\
            2. All dialogues with their speakers\n\
            3. Character descriptions and personality traits\n\n\
            Return the result in JSON format with the following structure:\n\
            {{\n  \"characters\": {{\n    \"characterName\": {{\n      \
            \"description\": \"brief description of character\",\n      \
            \"personality\": \"personality traits\",\n      \
            \"role\": \"their role in the story\"\n    }}\n  }},\n  \
            \"dialogues\": [\n    {{ \"speaker\": \"character name\", \"text\": \"dialogue text\", \
            \"context\": \"brief context or scene description\" }}\n  ]\n}}\n\n\
            Text:\n{}",
            self.source_label(),
            text
        );

        let response = self
            .llm
            .chat(
                CHARACTER_SYSTEM,
                &prompt,
                &ChatOptions::json(CHARACTER_TEMPERATURE),
            )
            .await
            .context("Character extraction request failed")?;
        let clean_json = strip_code_blocks(&response);
        serde_json::from_str(&clean_json)
            .with_context(|| format!("Failed to parse character JSON: {}", clean_json))
    }

    pub async fn analyze_emotion(&self, dialogue: &DialogueLine) -> Result<Emotion> {
        let prompt = format!(
            "Analyze the emotional tone of this dialogue from \"{}\":\n\n\
            Context: {}\n\
            Dialogue: \"{}\"\n\n\
            Return a JSON object with:\n\
            {{\n  \"primary_emotion\": \"main emotion (e.g., angry, sad, excited, calm, anxious, curious)\",\n  \
            \"intensity\": \"low/medium/high\",\n  \
            \"voice_modulation\": \"suggested voice characteristics (e.g., tense, soft, loud, trembling)\"\n}}",
            dialogue.speaker,
            dialogue.context.as_deref().unwrap_or("N/A"),
            dialogue.text
        );

        let response = self
            .llm
            .chat(EMOTION_SYSTEM, &prompt, &ChatOptions::json(EMOTION_TEMPERATURE))
            .await?;
        let clean_json = strip_code_blocks(&response);
        serde_json::from_str(&clean_json)
            .with_context(|| format!("Failed to parse emotion JSON: {}", clean_json))
    }

    /// One request per dialogue, in order. A failed request yields a neutral
    /// record, so the output always has exactly one record per input line.
    pub async fn analyze_emotions(&self, dialogues: &[DialogueLine]) -> Vec<EmotionRecord> {
        let mut records = Vec::with_capacity(dialogues.len());
        for dialogue in dialogues {
            let emotion = match self.analyze_emotion(dialogue).await {
                Ok(emotion) => emotion,
                Err(e) => {
                    warn!(
                        "Emotion analysis failed for {:?} ({}), using neutral: {:#}",
                        dialogue.text, dialogue.speaker, e
                    );
                    Emotion::neutral()
                }
            };
            records.push(EmotionRecord {
                speaker: dialogue.speaker.clone(),
                text: dialogue.text.clone(),
                context: dialogue.context.clone(),
                emotion,
            });
        }
        info!("Analyzed emotions for {} dialogues", records.len());
        records
    }
}

/// Dialogue lines of a script, tagged with their position for the emotion prompt.
pub fn dialogue_lines(script: &SegmentScript) -> Vec<DialogueLine> {
    script
        .dialogues()
        .map(|segment| DialogueLine {
            speaker: segment.speaker_name().to_string(),
            text: segment.text.clone(),
            context: Some(format!("Segment {} in the sequence", segment.index)),
        })
        .collect()
}

fn parse_segments(response: &str) -> Result<SegmentScript> {
    let clean_json = strip_code_blocks(response);
    let raw: RawScript = serde_json::from_str(&clean_json)
        .with_context(|| format!("Failed to parse segments JSON: {}", clean_json))?;

    let mut segments = Vec::with_capacity(raw.segments.len());
    for (position, raw) in raw.segments.into_iter().enumerate() {
        let index = raw.index.unwrap_or(position);
        let segment = match raw.kind.trim().to_lowercase().as_str() {
            "narration" => Segment::narration(index, &raw.text),
            "dialogue" => match raw.speaker.as_deref().map(str::trim) {
                Some(speaker) if !speaker.is_empty() => {
                    Segment::dialogue(index, speaker, &raw.text)
                }
                _ => bail!("Dialogue segment {} has no speaker", index),
            },
            other => bail!("Unknown segment type {:?} at index {}", other, index),
        };
        segments.push(segment);
    }

    SegmentScript::new(segments)
}
