use std::collections::BTreeSet;
use std::fmt;

/// The eight fixed pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    ExtractText,
    Segment,
    ExtractCharacters,
    AnalyzeEmotions,
    MapVoices,
    GenerateAudio,
    CombineAudio,
    GenerateEffects,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::ExtractText,
        Stage::Segment,
        Stage::ExtractCharacters,
        Stage::AnalyzeEmotions,
        Stage::MapVoices,
        Stage::GenerateAudio,
        Stage::CombineAudio,
        Stage::GenerateEffects,
    ];

    /// 1-based number used on the command line.
    pub fn number(self) -> u8 {
        match self {
            Stage::ExtractText => 1,
            Stage::Segment => 2,
            Stage::ExtractCharacters => 3,
            Stage::AnalyzeEmotions => 4,
            Stage::MapVoices => 5,
            Stage::GenerateAudio => 6,
            Stage::CombineAudio => 7,
            Stage::GenerateEffects => 8,
        }
    }

    pub fn from_number(n: u8) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|s| s.number() == n)
    }

    pub fn description(self) -> &'static str {
        match self {
            Stage::ExtractText => "Extract text from PDF/EPUB/TXT",
            Stage::Segment => "Create sequential segments",
            Stage::ExtractCharacters => "Extract character information",
            Stage::AnalyzeEmotions => "Analyze emotions",
            Stage::MapVoices => "Map voices",
            Stage::GenerateAudio => "Generate audio",
            Stage::CombineAudio => "Combine audio",
            Stage::GenerateEffects => "Generate sound effects",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}: {}", self.number(), self.description())
    }
}

/// What a single invocation does with one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    /// Load the previous checkpoint only; it may be absent.
    LoadOnly,
    /// Run, unless a checkpoint exists and `force` is false.
    Execute { force: bool },
}

/// Per-invocation run parameters. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub start_from: Stage,
    pub force: BTreeSet<Stage>,
    pub skip: BTreeSet<Stage>,
    pub mix_effects: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            start_from: Stage::ExtractText,
            force: BTreeSet::new(),
            skip: BTreeSet::new(),
            mix_effects: false,
        }
    }
}

impl RunOptions {
    /// Builds options from raw command-line strings. Anything unparsable
    /// degrades to the no-op value: start at stage 1, nothing forced or skipped.
    pub fn parse(start_from: &str, force: &str, skip: &str) -> Self {
        Self {
            start_from: parse_stage(start_from).unwrap_or(Stage::ExtractText),
            force: parse_stage_list(force),
            skip: parse_stage_list(skip),
            mix_effects: false,
        }
    }

    pub fn mode(&self, stage: Stage) -> StageMode {
        if stage < self.start_from || self.skip.contains(&stage) {
            StageMode::LoadOnly
        } else {
            StageMode::Execute {
                force: self.force.contains(&stage),
            }
        }
    }
}

fn parse_stage(raw: &str) -> Option<Stage> {
    raw.trim().parse::<u8>().ok().and_then(Stage::from_number)
}

fn parse_stage_list(raw: &str) -> BTreeSet<Stage> {
    raw.split(',').filter_map(parse_stage).collect()
}

pub fn stage_help() -> String {
    let mut help = String::from("Steps:\n");
    for stage in Stage::ALL {
        help.push_str(&format!("  {}. {}\n", stage.number(), stage.description()));
    }
    help.push_str(
        "\nExamples:\n  \
         chapter-audiobook                 # Run all steps\n  \
         chapter-audiobook -s 6            # Start from step 6 (audio generation)\n  \
         chapter-audiobook -f 2,3          # Force rerun steps 2 and 3\n  \
         chapter-audiobook -s 4 -f 6       # Start from step 4, force rerun step 6\n  \
         chapter-audiobook -k 1,2          # Skip steps 1 and 2\n",
    );
    help
}
