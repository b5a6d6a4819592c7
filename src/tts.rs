//! Answer-to-speech
//!
//! Long text is spoken one segment at a time so playback can pause and pick
//! up where it left off. Positions are character offsets into the text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::json;

use crate::config::{LlmConfig, TtsConfig};
use crate::llm::{GeminiClient, GenerateRequest, Unavailable};

/// Sample rate Gemini uses for its PCM output
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Synthesized audio and its MIME type
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl SpeechAudio {
    /// Wrap raw `audio/L16` PCM in a WAV container; other formats pass through
    pub fn into_wav(self) -> Self {
        let mime = self.mime_type.to_ascii_lowercase();
        if !(mime.starts_with("audio/l16") || mime.starts_with("audio/pcm")) {
            return self;
        }

        let rate = mime
            .split(';')
            .filter_map(|p| p.trim().strip_prefix("rate="))
            .find_map(|r| r.parse().ok())
            .unwrap_or(DEFAULT_SAMPLE_RATE);

        Self {
            bytes: pcm_to_wav(&self.bytes, rate),
            mime_type: "audio/wav".to_string(),
        }
    }
}

/// Trait for text-to-speech backends
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<SpeechAudio>;

    fn name(&self) -> &str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Segmentation
// ─────────────────────────────────────────────────────────────────────────────

/// A slice of the text, in characters `[start, end)`
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n')
}

/// Next segment of at most `max_chars` characters starting at `position`.
///
/// Cuts after the last sentence terminator in the window, else after the last
/// whitespace; either must fall in the second half of the window.
pub fn next_segment(text: &str, position: usize, max_chars: usize) -> Option<Segment> {
    let chars: Vec<char> = text.chars().collect();
    if position >= chars.len() {
        return None;
    }

    let max_chars = max_chars.max(1);
    let limit = (position + max_chars).min(chars.len());

    let end = if limit == chars.len() {
        limit
    } else {
        let window = &chars[position..limit];
        let min_cut = max_chars / 2;
        let cut_after = |pred: fn(char) -> bool| {
            window
                .iter()
                .rposition(|c| pred(*c))
                .filter(|i| *i >= min_cut)
        };

        match cut_after(is_terminator).or_else(|| cut_after(char::is_whitespace)) {
            Some(i) => position + i + 1,
            None => limit,
        }
    };

    Some(Segment {
        text: chars[position..end].iter().collect(),
        start: position,
        end,
    })
}

/// Speak a whole text segment by segment and join the audio into one clip
pub async fn speak_all(
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
    voice: &str,
    segment_chars: usize,
) -> Result<SpeechAudio> {
    let mut bytes = Vec::new();
    let mut mime_type = None;
    let mut position = 0;

    while let Some(segment) = next_segment(text, position, segment_chars) {
        position = segment.end;
        let spoken = segment.text.trim();
        if spoken.is_empty() {
            continue;
        }

        let audio = synthesizer.synthesize(spoken, voice).await?;
        tracing::debug!(end = position, bytes = audio.bytes.len(), "Segment synthesized");
        bytes.extend_from_slice(&audio.bytes);
        mime_type.get_or_insert(audio.mime_type);
    }

    let mime_type = mime_type.context("Nothing to speak")?;
    Ok(SpeechAudio { bytes, mime_type }.into_wav())
}

/// RIFF/WAVE header around 16-bit mono PCM
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;

    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * block_align as u32;
    let data_len = pcm.len() as u32;

    let mut wav = Vec::with_capacity(44 + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&CHANNELS.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}

// ─────────────────────────────────────────────────────────────────────────────
// Gemini speech
// ─────────────────────────────────────────────────────────────────────────────

/// Gemini TTS through the audio response modality
pub struct GeminiSpeech {
    client: GeminiClient,
    model: String,
}

impl GeminiSpeech {
    pub fn from_config(llm: &LlmConfig, tts: &TtsConfig) -> Result<Self> {
        Ok(Self::new(GeminiClient::from_config(llm)?, &tts.model))
    }

    pub fn new(client: GeminiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<SpeechAudio> {
        let mut request = GenerateRequest::user_text(text);
        request.generation_config = Some(json!({
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice }
                }
            }
        }));

        let response = self.client.generate_content(&self.model, &request).await?;

        let inline = response
            .into_parts()
            .into_iter()
            .find_map(|p| p.inline_data)
            .context("Gemini did not return audio data")?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(inline.data.as_bytes())
            .context("Failed to decode audio data")?;

        Ok(SpeechAudio {
            bytes,
            mime_type: inline.mime_type,
        })
    }

    fn name(&self) -> &str {
        "gemini-tts"
    }
}

#[async_trait]
impl SpeechSynthesizer for Unavailable {
    async fn synthesize(&self, _text: &str, _voice: &str) -> Result<SpeechAudio> {
        anyhow::bail!("{}", self.reason())
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::spawn_mock;
    use axum::{routing::post, Json, Router};
    use serde_json::Value;

    #[test]
    fn test_segment_prefers_sentence_end() {
        let text = "One two three. Four five six seven eight";
        let seg = next_segment(text, 0, 20).unwrap();
        assert_eq!(seg.text, "One two three.");
        assert_eq!((seg.start, seg.end), (0, 14));
    }

    #[test]
    fn test_segment_falls_back_to_whitespace() {
        let text = "alpha beta gamma delta epsilon";
        let seg = next_segment(text, 0, 13).unwrap();
        assert_eq!(seg.text, "alpha beta ");
    }

    #[test]
    fn test_segment_ignores_early_breaks() {
        // The only break is in the first half of the window: hard cut
        let text = "a bcdefghijklmnop";
        let seg = next_segment(text, 0, 10).unwrap();
        assert_eq!(seg.text, "a bcdefghi");
        assert_eq!(seg.end, 10);
    }

    #[test]
    fn test_segment_walks_to_end() {
        let text = "Hi. Héllo wörld. Bye!";
        let total = text.chars().count();
        let mut position = 0;
        let mut rebuilt = String::new();

        while let Some(seg) = next_segment(text, position, 8) {
            assert!(seg.end > seg.start);
            assert!(seg.end - seg.start <= 8);
            rebuilt.push_str(&seg.text);
            position = seg.end;
        }

        assert_eq!(position, total);
        assert_eq!(rebuilt, text);
        assert!(next_segment(text, total + 5, 8).is_none());
    }

    #[test]
    fn test_pcm_to_wav_header() {
        let wav = pcm_to_wav(&[1, 2, 3, 4], 24_000);
        assert_eq!(wav.len(), 48);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 40);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 24_000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 48_000);
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 4);
        assert_eq!(&wav[44..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_into_wav_reads_rate() {
        let audio = SpeechAudio {
            bytes: vec![0, 0],
            mime_type: "audio/L16;codec=pcm;rate=16000".to_string(),
        };
        let wav = audio.into_wav();
        assert_eq!(wav.mime_type, "audio/wav");
        assert_eq!(u32::from_le_bytes(wav.bytes[24..28].try_into().unwrap()), 16_000);

        let mp3 = SpeechAudio { bytes: vec![9], mime_type: "audio/mpeg".to_string() };
        assert_eq!(mp3.clone().into_wav(), mp3);
    }

    struct Counter;

    #[async_trait]
    impl SpeechSynthesizer for Counter {
        async fn synthesize(&self, text: &str, _voice: &str) -> Result<SpeechAudio> {
            Ok(SpeechAudio {
                bytes: vec![1u8; text.chars().count()],
                mime_type: "audio/L16;rate=24000".to_string(),
            })
        }

        fn name(&self) -> &str {
            "counter"
        }
    }

    #[tokio::test]
    async fn test_speak_all_joins_segments() {
        let text = "First sentence here. Second one follows. Third.";
        let audio = speak_all(&Counter, text, "Kore", 22).await.unwrap();

        assert_eq!(audio.mime_type, "audio/wav");
        // Whitespace at segment edges is not sent to the synthesizer
        let spoken: usize = text.split_inclusive(". ").map(|s| s.trim().chars().count()).sum();
        assert_eq!(audio.bytes.len(), 44 + spoken);

        assert!(speak_all(&Counter, "   ", "Kore", 22).await.is_err());
    }

    #[tokio::test]
    async fn test_gemini_speech_decodes_inline_audio() {
        let router = Router::new().route(
            "/v1beta/models/:model",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
                assert_eq!(
                    body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
                    "Puck"
                );
                Json(serde_json::json!({
                    "candidates": [{"content": {"parts": [{
                        "inlineData": {"mimeType": "audio/L16;codec=pcm;rate=24000", "data": "AQID"}
                    }]}}]
                }))
            }),
        );
        let base = spawn_mock(router).await;

        let client = GeminiClient::new(&base, "k", "unused", 5).unwrap();
        let speech = GeminiSpeech::new(client, "gemini-2.5-flash-preview-tts");
        let audio = speech.synthesize("Hello", "Puck").await.unwrap();
        assert_eq!(audio.bytes, vec![1, 2, 3]);
        assert!(audio.mime_type.starts_with("audio/L16"));
    }
}
