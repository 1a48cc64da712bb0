use crate::core::checkpoint::CONCAT_LIST_FILE;
use crate::core::io::Storage;
use crate::core::state::{AudioManifest, EffectsManifest};
use crate::utils::fallback::{try_in_order, Strategy};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::FutureExt;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// At most this many effects are overlaid by the primary mix.
pub const MAX_MIXED_EFFECTS: usize = 5;
/// Offset between consecutive overlaid effects.
pub const EFFECT_SPACING_MS: u64 = 10_000;
const BASE_VOLUME: &str = "1.0";
const EFFECT_VOLUME: &str = "0.2";
const FALLBACK_EFFECT_VOLUME: &str = "0.3";

/// The external audio muxing tool.
#[async_trait]
pub trait AudioTool: Send + Sync {
    async fn run(&self, args: &[String], working_dir: &Path) -> Result<()>;
}

pub struct Ffmpeg {
    binary: String,
}

impl Ffmpeg {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }
}

#[async_trait]
impl AudioTool for Ffmpeg {
    async fn run(&self, args: &[String], working_dir: &Path) -> Result<()> {
        debug!("{} {}", self.binary, args.join(" "));
        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .current_dir(working_dir)
            .output()
            .await
            .with_context(|| format!("Failed to launch {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            ));
        }
        Ok(())
    }
}

/// Concat-demuxer list, one `file '<name>'` line per entry.
pub fn concat_list<'a>(filenames: impl IntoIterator<Item = &'a str>) -> String {
    filenames
        .into_iter()
        .map(|name| format!("file '{}'", name.replace('\'', "'\\''")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Cannot resolve {:?}", path))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Concatenates the manifest's segment files, in index order, into `output`.
/// The list file is written next to the segments and the tool runs there.
pub async fn concat_segments(
    tool: &dyn AudioTool,
    storage: &dyn Storage,
    manifest: &AudioManifest,
    segment_dir: &Path,
    output: &Path,
) -> Result<()> {
    let ordered = manifest.ordered();
    if ordered.is_empty() {
        bail!("No audio segments to combine");
    }

    let list = concat_list(ordered.iter().map(|s| s.filename.as_str()));
    storage
        .write(&segment_dir.join(CONCAT_LIST_FILE), list.as_bytes())
        .await?;

    info!("Combining {} audio segments...", ordered.len());
    let args: Vec<String> = vec![
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        CONCAT_LIST_FILE.into(),
        "-c".into(),
        "copy".into(),
        path_arg(&absolute(output)?),
        "-y".into(),
    ];
    tool.run(&args, segment_dir)
        .await
        .context("Audio concatenation failed")
}

/// Base plus up to five effects, each delayed by a further ten seconds.
pub fn primary_mix_args(base: &Path, effects: &[PathBuf], output: &Path) -> Vec<String> {
    let effects = &effects[..effects.len().min(MAX_MIXED_EFFECTS)];
    let mut args = vec!["-i".to_string(), path_arg(base)];
    for effect in effects {
        args.push("-i".to_string());
        args.push(path_arg(effect));
    }

    let mut filters = vec![format!("[0:a]volume={}[a0]", BASE_VOLUME)];
    let mut labels = String::from("[a0]");
    for k in 0..effects.len() {
        let delay = (k as u64 + 1) * EFFECT_SPACING_MS;
        filters.push(format!(
            "[{input}:a]adelay={delay}|{delay},volume={volume}[a{input}]",
            input = k + 1,
            delay = delay,
            volume = EFFECT_VOLUME
        ));
        labels.push_str(&format!("[a{}]", k + 1));
    }
    filters.push(format!(
        "{}amix=inputs={}:duration=first[out]",
        labels,
        effects.len() + 1
    ));

    args.extend([
        "-filter_complex".to_string(),
        filters.join(";"),
        "-map".to_string(),
        "[out]".to_string(),
        path_arg(output),
        "-y".to_string(),
    ]);
    args
}

/// Base plus the first effect only, at a slightly higher gain.
pub fn fallback_mix_args(base: &Path, effect: &Path, output: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        path_arg(base),
        "-i".to_string(),
        path_arg(effect),
        "-filter_complex".to_string(),
        format!(
            "[0:a]volume={}[a0];[1:a]volume={}[a1];[a0][a1]amix=inputs=2:duration=first[out]",
            BASE_VOLUME, FALLBACK_EFFECT_VOLUME
        ),
        "-map".to_string(),
        "[out]".to_string(),
        path_arg(output),
        "-y".to_string(),
    ]
}

/// Overlays detected effects on the finished audiobook. Tries the multi-track
/// mix first and the two-track mix second; fails only when both do.
/// Returns `false` when there is nothing to mix.
pub async fn mix_effects(
    tool: &dyn AudioTool,
    audiobook: &Path,
    effects: &EffectsManifest,
    output: &Path,
) -> Result<bool> {
    let clips: Vec<PathBuf> = effects
        .effects
        .iter()
        .take(MAX_MIXED_EFFECTS)
        .map(|e| absolute(&e.filepath))
        .collect::<Result<_>>()?;
    let Some(first) = clips.first() else {
        info!("No sound effects to mix");
        return Ok(false);
    };

    let base = absolute(audiobook)?;
    let output = absolute(output)?;
    let working_dir = output
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let primary = primary_mix_args(&base, &clips, &output);
    let fallback = fallback_mix_args(&base, first, &output);
    let strategies: Vec<Strategy<'_, ()>> = vec![
        (
            format!("Mix with {} effects", clips.len()),
            tool.run(&primary, &working_dir).boxed(),
        ),
        (
            "Two-track fallback mix".to_string(),
            tool.run(&fallback, &working_dir).boxed(),
        ),
    ];
    try_in_order(strategies)
        .await
        .context("Sound effect mixing failed")?;

    info!("Audiobook with effects saved to {:?}", output);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use crate::core::state::{
        AudioSegmentArtifact, EffectArtifact, EffectDuration, EffectKind, SegmentKind, NARRATOR,
    };
    use std::sync::{Arc, Mutex};

    struct RecordingTool {
        calls: Arc<Mutex<Vec<(Vec<String>, PathBuf)>>>,
        /// Fail any call whose filter graph contains this fragment.
        fail_on: Vec<&'static str>,
    }

    impl RecordingTool {
        fn new(fail_on: Vec<&'static str>) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl AudioTool for RecordingTool {
        async fn run(&self, args: &[String], working_dir: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((args.to_vec(), working_dir.to_path_buf()));
            let joined = args.join(" ");
            if self.fail_on.iter().any(|f| joined.contains(f)) {
                return Err(anyhow!("mock ffmpeg failure"));
            }
            Ok(())
        }
    }

    fn artifact(index: usize) -> AudioSegmentArtifact {
        AudioSegmentArtifact {
            index,
            kind: SegmentKind::Narration,
            speaker: NARRATOR.to_string(),
            text: format!("text {}", index),
            emotion: None,
            filename: format!("segment_{:04}_Narrator.mp3", index),
            filepath: PathBuf::new(),
        }
    }

    fn effects(count: usize) -> EffectsManifest {
        EffectsManifest::new(
            (0..count)
                .map(|i| EffectArtifact {
                    index: i,
                    kind: "ambient".to_string(),
                    effect: EffectKind::Rain,
                    description: "gentle rain on window".to_string(),
                    duration: EffectDuration::Medium,
                    after_segment: i,
                    filename: format!("ambient_{:03}.mp3", i),
                    filepath: PathBuf::from(format!("/tmp/build/ambient_{:03}.mp3", i)),
                })
                .collect(),
        )
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(["segment_0000_Narrator.mp3", "segment_0001_O'Brien.mp3"]);
        assert_eq!(
            list,
            "file 'segment_0000_Narrator.mp3'\nfile 'segment_0001_O'\\''Brien.mp3'"
        );
    }

    #[tokio::test]
    async fn test_concat_orders_by_index() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let tool = RecordingTool::new(vec![]);
        let manifest = AudioManifest::new(vec![artifact(2), artifact(0), artifact(1)]);
        let output = temp_dir.path().join("out").join("book.mp3");

        concat_segments(
            &tool,
            &NativeStorage::new(),
            &manifest,
            temp_dir.path(),
            &output,
        )
        .await?;

        let list = std::fs::read_to_string(temp_dir.path().join(CONCAT_LIST_FILE))?;
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(lines[0], "file 'segment_0000_Narrator.mp3'");
        assert_eq!(lines[2], "file 'segment_0002_Narrator.mp3'");

        let calls = tool.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, temp_dir.path());
        assert!(calls[0].0.contains(&"concat".to_string()));
        assert!(calls[0].0.contains(&output.to_string_lossy().to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_concat_failure_is_fatal_without_retry() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let tool = RecordingTool::new(vec!["concat"]);
        let manifest = AudioManifest::new(vec![artifact(0)]);
        let result = concat_segments(
            &tool,
            &NativeStorage::new(),
            &manifest,
            temp_dir.path(),
            &temp_dir.path().join("book.mp3"),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(tool.calls.lock().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concat_rejects_empty_manifest() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let tool = RecordingTool::new(vec![]);
        let result = concat_segments(
            &tool,
            &NativeStorage::new(),
            &AudioManifest::new(vec![]),
            temp_dir.path(),
            &temp_dir.path().join("book.mp3"),
        )
        .await;
        assert!(result.is_err());
        assert!(tool.calls.lock().unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn test_primary_mix_caps_effects_and_offsets() {
        let clips: Vec<PathBuf> = (0..7).map(|i| PathBuf::from(format!("e{}.mp3", i))).collect();
        let args = primary_mix_args(Path::new("book.mp3"), &clips, Path::new("mixed.mp3"));

        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 6);
        let graph = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(graph.starts_with("[0:a]volume=1.0[a0]"));
        assert!(graph.contains("[1:a]adelay=10000|10000,volume=0.2[a1]"));
        assert!(graph.contains("[5:a]adelay=50000|50000,volume=0.2[a5]"));
        assert!(graph.ends_with("amix=inputs=6:duration=first[out]"));
    }

    #[test]
    fn test_fallback_mix_uses_single_effect() {
        let args = fallback_mix_args(
            Path::new("book.mp3"),
            Path::new("e0.mp3"),
            Path::new("mixed.mp3"),
        );
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
        assert!(args
            .iter()
            .any(|a| a.contains("[1:a]volume=0.3[a1]") && a.contains("amix=inputs=2")));
    }

    #[tokio::test]
    async fn test_mix_falls_back_when_primary_fails() -> Result<()> {
        let tool = RecordingTool::new(vec!["adelay"]);
        let mixed = mix_effects(
            &tool,
            Path::new("/tmp/out/book.mp3"),
            &effects(3),
            Path::new("/tmp/out/book_with_effects.mp3"),
        )
        .await?;

        assert!(mixed);
        let calls = tool.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].0.join(" ").contains("adelay"));
        assert!(calls[1].0.join(" ").contains("volume=0.3"));
        Ok(())
    }

    #[tokio::test]
    async fn test_mix_fails_when_both_attempts_fail() {
        let tool = RecordingTool::new(vec!["amix"]);
        let result = mix_effects(
            &tool,
            Path::new("/tmp/out/book.mp3"),
            &effects(2),
            Path::new("/tmp/out/book_with_effects.mp3"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(tool.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mix_without_effects_is_noop() -> Result<()> {
        let tool = RecordingTool::new(vec![]);
        let mixed = mix_effects(
            &tool,
            Path::new("book.mp3"),
            &effects(0),
            Path::new("book_with_effects.mp3"),
        )
        .await?;
        assert!(!mixed);
        assert!(tool.calls.lock().unwrap().is_empty());
        Ok(())
    }
}
