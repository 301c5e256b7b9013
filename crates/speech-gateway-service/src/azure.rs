//! Azure Speech REST client (short-audio recognition and synthesis).

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::collaborator::{OutputFormat, Recognizer, SpeechOutcome, Synthesizer};

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OUTPUT_FORMAT_HEADER: &str = "X-Microsoft-OutputFormat";
const WAV_CONTENT_TYPE: &str = "audio/wav; codecs=audio/pcm; samplerate=16000";
const SSML_CONTENT_TYPE: &str = "application/ssml+xml";

/// Longest error body kept from a failed response.
const MAX_DETAIL: usize = 256;

/// Azure Speech client implementing both recognition and synthesis.
#[derive(Clone)]
pub struct AzureSpeech {
    client: reqwest::Client,
    key: String,
    stt_url: String,
    tts_url: String,
}

impl AzureSpeech {
    pub fn new(key: impl Into<String>, region: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            key: key.into(),
            stt_url: format!(
                "https://{region}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1"
            ),
            tts_url: format!("https://{region}.tts.speech.microsoft.com/cognitiveservices/v1"),
        }
    }
}

impl std::fmt::Debug for AzureSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSpeech")
            .field("stt_url", &self.stt_url)
            .field("tts_url", &self.tts_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    #[serde(default)]
    display_text: String,
}

fn classify_recognition(response: RecognitionResponse) -> SpeechOutcome<String> {
    match response.recognition_status.as_str() {
        "Success" => SpeechOutcome::Completed(response.display_text),
        "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => SpeechOutcome::NoMatch,
        "Error" => SpeechOutcome::Error("recognition service reported an error".to_string()),
        other => SpeechOutcome::Canceled {
            code: other.to_string(),
            detail: "unexpected recognition status".to_string(),
        },
    }
}

fn output_format_name(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Mp3Mono16k => "audio-16khz-128kbitrate-mono-mp3",
    }
}

/// `zh-CN-XiaoyiNeural` -> `zh-CN`.
fn voice_language(voice: &str) -> &str {
    let mut dashes = voice.match_indices('-').map(|(i, _)| i);
    match (dashes.next(), dashes.next()) {
        (Some(_), Some(second)) => &voice[..second],
        _ => "en-US",
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn build_ssml(text: &str, voice: &str) -> String {
    format!(
        "<speak version='1.0' xml:lang='{lang}'><voice name='{voice}'>{text}</voice></speak>",
        lang = xml_escape(voice_language(voice)),
        voice = xml_escape(voice),
        text = xml_escape(text),
    )
}

async fn failure_detail(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    body.chars().take(MAX_DETAIL).collect()
}

#[async_trait]
impl Recognizer for AzureSpeech {
    async fn recognize(&self, audio: Vec<u8>, language: &str) -> SpeechOutcome<String> {
        let url = format!("{}?language={language}&format=simple", self.stt_url);
        let response = match self
            .client
            .post(&url)
            .header(KEY_HEADER, &self.key)
            .header(CONTENT_TYPE, WAV_CONTENT_TYPE)
            .body(audio)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SpeechOutcome::Error(format!("request: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            return SpeechOutcome::Canceled {
                code: status.as_u16().to_string(),
                detail: failure_detail(response).await,
            };
        }

        match response.json::<RecognitionResponse>().await {
            Ok(parsed) => classify_recognition(parsed),
            Err(e) => SpeechOutcome::Error(format!("parse response: {e}")),
        }
    }
}

#[async_trait]
impl Synthesizer for AzureSpeech {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: OutputFormat,
    ) -> SpeechOutcome<Vec<u8>> {
        let response = match self
            .client
            .post(&self.tts_url)
            .header(KEY_HEADER, &self.key)
            .header(CONTENT_TYPE, SSML_CONTENT_TYPE)
            .header(OUTPUT_FORMAT_HEADER, output_format_name(format))
            .header(reqwest::header::USER_AGENT, "speech-gateway")
            .body(build_ssml(text, voice))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SpeechOutcome::Error(format!("request: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            return SpeechOutcome::Canceled {
                code: status.as_u16().to_string(),
                detail: failure_detail(response).await,
            };
        }

        match response.bytes().await {
            Ok(bytes) => SpeechOutcome::Completed(bytes.to_vec()),
            Err(e) => SpeechOutcome::Error(format!("read body: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SpeechOutcome<String> {
        classify_recognition(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn recognition_status_classification() {
        assert_eq!(
            parse(r#"{"RecognitionStatus":"Success","DisplayText":"你好。","Offset":0,"Duration":1}"#),
            SpeechOutcome::Completed("你好。".to_string())
        );
        assert_eq!(parse(r#"{"RecognitionStatus":"NoMatch"}"#), SpeechOutcome::NoMatch);
        assert_eq!(
            parse(r#"{"RecognitionStatus":"InitialSilenceTimeout"}"#),
            SpeechOutcome::NoMatch
        );
        assert!(matches!(
            parse(r#"{"RecognitionStatus":"Error"}"#),
            SpeechOutcome::Error(_)
        ));
        assert!(matches!(
            parse(r#"{"RecognitionStatus":"Mystery"}"#),
            SpeechOutcome::Canceled { code, .. } if code == "Mystery"
        ));
    }

    #[test]
    fn voice_language_prefix() {
        assert_eq!(voice_language("zh-CN-XiaoyiNeural"), "zh-CN");
        assert_eq!(voice_language("en-US-JennyMultilingualNeural"), "en-US");
        assert_eq!(voice_language("weird"), "en-US");
    }

    #[test]
    fn ssml_escapes_user_text() {
        let ssml = build_ssml("a < b & \"c\"</voice>", "en-US-JennyNeural");
        assert!(ssml.contains("a &lt; b &amp; &quot;c&quot;&lt;/voice&gt;"));
        assert!(ssml.contains("xml:lang='en-US'"));
        assert!(ssml.contains("<voice name='en-US-JennyNeural'>"));
        assert_eq!(ssml.matches("</voice>").count(), 1);
    }

    #[test]
    fn debug_hides_key() {
        let client = AzureSpeech::new("top-secret", "eastasia");
        let shown = format!("{client:?}");
        assert!(!shown.contains("top-secret"));
        assert!(shown.contains("eastasia.stt.speech.microsoft.com"));
    }
}
