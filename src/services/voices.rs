use crate::core::state::{CharacterProfile, CharacterRoster, NARRATOR};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Premade synthesis voices the assignment rules choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePreset {
    /// Deep, mature male.
    Adam,
    /// Clear, middle-aged male.
    Arnold,
    /// Young, energetic male.
    Antoni,
    /// Mature, professional female.
    Elli,
    /// Warm, middle-aged female.
    Matilda,
    /// Young, clear female.
    Rachel,
    /// Narrator.
    Bella,
    /// Slightly mechanical, for robot characters.
    Brian,
}

impl VoicePreset {
    pub fn id(self) -> &'static str {
        match self {
            VoicePreset::Adam => "pNInz6obpgDQGcFmaJgB",
            VoicePreset::Arnold => "VR6AewLTigWG4xSOukaG",
            VoicePreset::Antoni => "ErXwobaYiN019PkySvjV",
            VoicePreset::Elli => "MF3mGyEYCl7XYWbV9V6O",
            VoicePreset::Matilda => "XrExE9yKIg1WjnnlVkGX",
            VoicePreset::Rachel => "21m00Tcm4TlvDq8ikWAM",
            VoicePreset::Bella => "EXAVITQu4vr4xnSDxMaL",
            VoicePreset::Brian => "nPczCjzI2devNBz1zQrb",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VoicePreset::Adam => "Adam",
            VoicePreset::Arnold => "Arnold",
            VoicePreset::Antoni => "Antoni",
            VoicePreset::Elli => "Elli",
            VoicePreset::Matilda => "Matilda",
            VoicePreset::Rachel => "Rachel",
            VoicePreset::Bella => "Bella",
            VoicePreset::Brian => "Brian",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl VoiceSettings {
    pub const STANDARD: VoiceSettings = VoiceSettings {
        stability: 0.75,
        similarity_boost: 0.75,
        style: 0.5,
        use_speaker_boost: true,
    };

    pub const PROTAGONIST: VoiceSettings = VoiceSettings {
        stability: 0.65,
        similarity_boost: 0.75,
        style: 0.6,
        use_speaker_boost: true,
    };

    pub const ROBOTIC: VoiceSettings = VoiceSettings {
        stability: 0.95,
        similarity_boost: 0.85,
        style: 0.2,
        use_speaker_boost: false,
    };

    pub const AMBIENT: VoiceSettings = VoiceSettings {
        stability: 0.9,
        similarity_boost: 0.3,
        style: 0.1,
        use_speaker_boost: false,
    };
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceAssignment {
    pub voice_id: String,
    pub voice_name: String,
    pub voice_settings: VoiceSettings,
}

impl VoiceAssignment {
    pub fn new(preset: VoicePreset, settings: VoiceSettings) -> Self {
        Self {
            voice_id: preset.id().to_string(),
            voice_name: preset.name().to_string(),
            voice_settings: settings,
        }
    }

    pub fn narrator() -> Self {
        Self::new(VoicePreset::Bella, VoiceSettings::STANDARD)
    }
}

const PROTAGONIST_MARKERS: &[&str] = &["elijah", "baley"];
const ROBOT_NAME_MARKERS: &[&str] = &["daneel"];
const ROBOT_TRAIT_MARKERS: &[&str] = &["robot", "android", "artificial"];
const FEMALE_MARKERS: &[&str] = &["woman", "female"];
const FEMALE_WORDS: &[&str] = &["she", "her"];
const YOUNG_MARKERS: &[&str] = &["young", "youth"];
const MATURE_MARKERS: &[&str] = &["old", "mature", "senior"];

/// Extra names a canonical character answers to, keyed by a fragment of the
/// canonical name.
const ALIAS_RULES: &[(&str, &[&str])] = &[
    ("Baley", &["Baley", "Lije"]),
    ("Enderby", &["Enderby", "Commissioner"]),
    ("Daneel", &["Daneel", "R. Daneel Olivaw"]),
    ("Simpson", &["Simpson"]),
    ("R. Sammy", &["R. Sammy"]),
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn has_word(haystack: &str, words: &[&str]) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| words.contains(&token))
}

/// "R. Sammy", "R. Daneel Olivaw": the robot honorific, not "Dr." or "Mr.".
fn has_robot_prefix(lower_name: &str) -> bool {
    lower_name.starts_with("r. ") || lower_name.contains(" r. ")
}

/// Picks a voice for one character. Hand-tuned protagonist rules win over the
/// robot rule, which wins over the description heuristics.
pub fn select_voice(name: &str, profile: &CharacterProfile) -> VoiceAssignment {
    let lower_name = name.to_lowercase();
    let description = profile.description.to_lowercase();
    let role = profile.role.to_lowercase();

    if contains_any(&lower_name, PROTAGONIST_MARKERS) {
        return VoiceAssignment::new(VoicePreset::Arnold, VoiceSettings::PROTAGONIST);
    }

    if contains_any(&lower_name, ROBOT_NAME_MARKERS)
        || has_robot_prefix(&lower_name)
        || contains_any(&description, ROBOT_TRAIT_MARKERS)
        || contains_any(&role, ROBOT_TRAIT_MARKERS)
    {
        return VoiceAssignment::new(VoicePreset::Brian, VoiceSettings::ROBOTIC);
    }

    let is_female = contains_any(&description, FEMALE_MARKERS) || has_word(&description, FEMALE_WORDS);
    let is_young = contains_any(&description, YOUNG_MARKERS);
    let is_mature = contains_any(&description, MATURE_MARKERS);

    let preset = match (is_female, is_young, is_mature) {
        (true, true, _) => VoicePreset::Rachel,
        (true, false, true) => VoicePreset::Elli,
        (true, false, false) => VoicePreset::Matilda,
        (false, true, _) => VoicePreset::Antoni,
        (false, false, true) => VoicePreset::Adam,
        (false, false, false) => VoicePreset::Arnold,
    };
    VoiceAssignment::new(preset, VoiceSettings::STANDARD)
}

/// Canonical character name to voice, plus an alias table resolving extra
/// names to canonical ones. Built once per run and only read afterwards.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct VoiceAssignments {
    pub assignments: BTreeMap<String, VoiceAssignment>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl VoiceAssignments {
    pub fn assign(roster: &CharacterRoster) -> Self {
        let mut table = Self::default();

        for (name, profile) in &roster.characters {
            let assignment = select_voice(name, profile);
            info!("{} -> {} ({})", name, assignment.voice_name, assignment.voice_id);
            table.assignments.insert(name.clone(), assignment);
        }

        for name in roster.characters.keys() {
            for (marker, aliases) in ALIAS_RULES {
                if !name.contains(marker) {
                    continue;
                }
                for alias in *aliases {
                    if *alias != name.as_str() {
                        table
                            .aliases
                            .entry(alias.to_string())
                            .or_insert_with(|| name.clone());
                    }
                }
            }
        }

        table
            .assignments
            .insert(NARRATOR.to_string(), VoiceAssignment::narrator());
        table
    }

    /// Exact lookup; a canonical name takes precedence over an alias.
    pub fn resolve(&self, speaker: &str) -> Option<&VoiceAssignment> {
        self.assignments.get(speaker).or_else(|| {
            self.aliases
                .get(speaker)
                .and_then(|canonical| self.assignments.get(canonical))
        })
    }

    pub fn narrator(&self) -> VoiceAssignment {
        self.assignments
            .get(NARRATOR)
            .cloned()
            .unwrap_or_else(VoiceAssignment::narrator)
    }

    /// Never fails: unknown speakers are read by the Narrator.
    pub fn resolve_or_narrator(&self, speaker: &str) -> VoiceAssignment {
        match self.resolve(speaker) {
            Some(assignment) => assignment.clone(),
            None => {
                warn!("No voice assigned to {:?}, using Narrator voice", speaker);
                self.narrator()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(description: &str, role: &str) -> CharacterProfile {
        CharacterProfile {
            description: description.to_string(),
            personality: String::new(),
            role: role.to_string(),
        }
    }

    fn roster(entries: &[(&str, &str, &str)]) -> CharacterRoster {
        CharacterRoster {
            characters: entries
                .iter()
                .map(|(name, description, role)| (name.to_string(), profile(description, role)))
                .collect(),
            dialogues: vec![],
        }
    }

    #[test]
    fn test_protagonist_rule_wins_over_robot_rule() {
        let assignment = select_voice("Elijah Baley", &profile("a detective who distrusts robots", ""));
        assert_eq!(assignment.voice_id, VoicePreset::Arnold.id());
        assert_eq!(assignment.voice_settings, VoiceSettings::PROTAGONIST);
    }

    #[test]
    fn test_robot_detection() {
        for (name, description, role) in [
            ("R. Daneel Olivaw", "", ""),
            ("R. Sammy", "an errand runner", ""),
            ("Unit 7", "a humanoid robot", ""),
            ("Clerk", "", "android assistant"),
        ] {
            let assignment = select_voice(name, &profile(description, role));
            assert_eq!(assignment.voice_id, VoicePreset::Brian.id(), "{}", name);
            assert!(!assignment.voice_settings.use_speaker_boost);
        }

        // Titles ending in "r." are not the robot honorific.
        let assignment = select_voice("Dr. Gerrigel", &profile("a professor from Washington", ""));
        assert_ne!(assignment.voice_id, VoicePreset::Brian.id());
    }

    #[test]
    fn test_description_heuristics() {
        let pick = |description: &str| select_voice("Someone", &profile(description, "")).voice_name;
        assert_eq!(pick("a young woman"), "Rachel");
        assert_eq!(pick("an old woman of the city"), "Elli");
        assert_eq!(pick("she runs the kitchen"), "Matilda");
        assert_eq!(pick("a youth from the Sector"), "Antoni");
        assert_eq!(pick("a senior officer"), "Adam");
        assert_eq!(pick("the commissioner"), "Arnold");
        assert_eq!(pick(""), "Arnold");
        // "her" inside "father" is not a gender signal.
        assert_eq!(pick("his father"), "Arnold");
    }

    #[test]
    fn test_assign_registers_aliases_and_narrator() {
        let table = VoiceAssignments::assign(&roster(&[
            ("Elijah Baley", "a plainclothesman", ""),
            ("Julius Enderby", "the police commissioner", ""),
            ("R. Daneel Olivaw", "", ""),
        ]));

        let baley = table.resolve("Elijah Baley").cloned();
        assert!(baley.is_some());
        assert_eq!(table.resolve("Lije").cloned(), baley);
        assert_eq!(table.resolve("Baley").cloned(), baley);
        assert_eq!(
            table.resolve("Commissioner"),
            table.resolve("Julius Enderby")
        );
        assert_eq!(
            table.resolve("Daneel").map(|a| a.voice_name.as_str()),
            Some("Brian")
        );
        // Alias equal to the canonical name is not registered.
        assert!(!table.aliases.contains_key("R. Daneel Olivaw"));
        assert_eq!(table.narrator(), VoiceAssignment::narrator());
        assert!(table.assignments.contains_key(NARRATOR));
    }

    #[test]
    fn test_canonical_name_wins_over_alias() {
        let table = VoiceAssignments::assign(&roster(&[
            ("Julius Enderby", "the police commissioner", ""),
            ("Commissioner", "a young woman", ""),
        ]));
        assert_eq!(
            table.aliases.get("Commissioner").map(String::as_str),
            Some("Julius Enderby")
        );
        assert_eq!(
            table.resolve("Commissioner").map(|a| a.voice_name.as_str()),
            Some("Rachel")
        );
        assert_eq!(
            table.resolve("Enderby").map(|a| a.voice_name.as_str()),
            Some("Arnold")
        );
    }

    #[test]
    fn test_unmapped_speaker_falls_back_to_narrator() {
        let table = VoiceAssignments::assign(&CharacterRoster::default());
        assert_eq!(table.assignments.len(), 1);
        assert_eq!(table.resolve("Stranger"), None);
        assert_eq!(table.resolve_or_narrator("Stranger"), VoiceAssignment::narrator());
        assert_eq!(
            VoiceAssignments::default().resolve_or_narrator("Stranger"),
            VoiceAssignment::narrator()
        );
    }

    #[test]
    fn test_assignment_json_shape() {
        let value = serde_json::to_value(VoiceAssignment::narrator()).unwrap();
        assert_eq!(value["voiceId"], "EXAVITQu4vr4xnSDxMaL");
        assert_eq!(value["voiceName"], "Bella");
        assert_eq!(value["voiceSettings"]["use_speaker_boost"], true);
    }
}
