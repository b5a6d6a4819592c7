//! Speak command handler

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use docent::{tts, Config, GeminiSpeech};

use super::spinner;

pub async fn run_speak(text: &str, out: &Path, voice: Option<&str>) -> Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("Nothing to speak");
    }

    let config = Config::load_or_default()?;
    let speech = GeminiSpeech::from_config(&config.llm, &config.tts)?;
    let voice = voice.unwrap_or(&config.tts.default_voice);

    let pb = spinner(&format!("Synthesizing with voice {}...", voice))?;
    let result = tts::speak_all(&speech, text, voice, config.tts.segment_chars).await;
    pb.finish_and_clear();
    let audio = result?;

    std::fs::write(out, &audio.bytes).with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "{} Wrote {} ({}, {} bytes)",
        "✓".green(),
        out.display(),
        audio.mime_type,
        audio.bytes.len()
    );

    Ok(())
}
