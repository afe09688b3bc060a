// JSON handoff document
use super::SubtitleFormatter;
use crate::timeline::TimelineDocument;

/// Writes the timeline document consumed by the rendering stage.
#[derive(Default)]
pub struct JsonFormatter;

impl SubtitleFormatter for JsonFormatter {
    fn format(&self, document: &TimelineDocument) -> String {
        document.to_json().unwrap_or_else(|_| "{}".to_string())
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{TierId, TimelineRecord};

    #[test]
    fn test_json_format() {
        let document = TimelineDocument {
            total_duration: 4.0,
            tier_used: TierId::Estimate,
            segments: vec![TimelineRecord {
                utterance_index: 0,
                speaker: "M".to_string(),
                text: "Hello, world!".to_string(),
                start_sec: 1.5,
                end_sec: 4.0,
            }],
        };

        let output = JsonFormatter.format(&document);

        assert!(output.contains("\"tier_used\": \"estimate\""));
        assert!(output.contains("\"text\": \"Hello, world!\""));
        assert!(output.contains("\"start_sec\": 1.5"));
    }
}
