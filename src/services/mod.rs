pub mod analyzer;
pub mod effects;
pub mod emotion;
pub mod extract;
pub mod llm;
pub mod synthesizer;
pub mod tts;
pub mod voices;
pub mod workflow;
