use crate::core::state::Emotion;
use crate::services::voices::VoiceSettings;

/// Perturbs baseline settings for an emotion. Labels must match exactly;
/// unknown labels and a `medium` intensity change nothing. Results always
/// stay within `[0, 1]`.
pub fn adjust_for_emotion(base: &VoiceSettings, emotion: &Emotion) -> VoiceSettings {
    let mut settings = *base;
    let mut stability = base.stability;
    let mut style = base.style;

    match emotion.primary_emotion.as_str() {
        "angry" => {
            stability = (stability - 0.2).max(0.3);
            style = (style + 0.3).min(1.0);
        }
        "sad" => {
            stability = (stability - 0.1).max(0.4);
            style = (style - 0.2).max(0.2);
        }
        "excited" => {
            stability = (stability - 0.2).max(0.3);
            style = (style + 0.2).min(1.0);
        }
        "anxious" => {
            stability = (stability - 0.15).max(0.35);
        }
        "calm" => {
            stability = (stability + 0.1).min(0.95);
            style = (style - 0.1).max(0.3);
        }
        _ => {}
    }

    match emotion.intensity.as_str() {
        "high" => style = (style + 0.1).min(1.0),
        "low" => style = (style - 0.1).max(0.2),
        _ => {}
    }

    settings.stability = stability.clamp(0.0, 1.0);
    settings.style = style.clamp(0.0, 1.0);
    settings
}
