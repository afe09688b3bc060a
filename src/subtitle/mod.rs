pub mod json;
pub mod srt;
pub mod vtt;

use crate::config::OutputFormat;
use crate::timeline::TimelineDocument;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SubtitleEntry {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
    pub speaker: Option<String>,
}

/// Line wrapping for subtitle cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapConfig {
    pub chars_per_line: usize,
    pub max_lines: usize,
}

impl Default for WrapConfig {
    fn default() -> Self {
        Self {
            chars_per_line: 20,
            max_lines: 2,
        }
    }
}

pub trait SubtitleFormatter {
    fn format(&self, document: &TimelineDocument) -> String;
    fn extension(&self) -> &'static str;
}

pub fn create_formatter(format: OutputFormat, wrap: WrapConfig) -> Box<dyn SubtitleFormatter> {
    match format {
        OutputFormat::Srt => Box::new(srt::SrtFormatter { wrap }),
        OutputFormat::Vtt => Box::new(vtt::VttFormatter { wrap }),
        OutputFormat::Json => Box::new(json::JsonFormatter),
    }
}

/// One numbered cue per timeline record, text wrapped for display.
pub fn entries_from_document(document: &TimelineDocument, wrap: WrapConfig) -> Vec<SubtitleEntry> {
    document
        .segments
        .iter()
        .enumerate()
        .map(|(i, record)| SubtitleEntry {
            index: i + 1,
            start: seconds(record.start_sec),
            end: seconds(record.end_sec),
            text: wrap_lines(&record.text, wrap),
            speaker: Some(record.speaker.clone()).filter(|s| !s.is_empty()),
        })
        .collect()
}

/// Round to whole milliseconds so 1.9s prints as 1.900, not 1.899.
fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_millis((value * 1000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}

/// Break long lines at sentence ends, or at commas when the text is a single
/// long sentence. Text that already fits is returned unchanged.
pub fn wrap_lines(text: &str, wrap: WrapConfig) -> String {
    let text = text.trim();
    let len = text.chars().count();
    if len <= wrap.chars_per_line * wrap.max_lines {
        return text.to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '。' | '！' | '？' | '!' | '?') {
            push_part(&mut parts, &mut current);
        }
    }
    push_part(&mut parts, &mut current);

    if parts.len() <= 1 {
        parts.clear();
        let mut count = 0;
        for c in text.chars() {
            current.push(c);
            count += 1;
            if matches!(c, '、' | ',') && count >= wrap.chars_per_line {
                push_part(&mut parts, &mut current);
                count = 0;
            }
        }
        push_part(&mut parts, &mut current);
    }

    parts.join("\n")
}

fn push_part(parts: &mut Vec<String>, current: &mut String) {
    let part = current.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
    current.clear();
}
