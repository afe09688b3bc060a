// WebVTT subtitle format
use super::{entries_from_document, SubtitleFormatter, WrapConfig};
use crate::timeline::TimelineDocument;

#[derive(Default)]
pub struct VttFormatter {
    pub wrap: WrapConfig,
}

impl SubtitleFormatter for VttFormatter {
    fn format(&self, document: &TimelineDocument) -> String {
        let mut output = String::from("WEBVTT\n\n");

        for entry in entries_from_document(document, self.wrap) {
            let text = match entry.speaker {
                Some(ref speaker) => format!("<v {}>{}", speaker, entry.text),
                None => entry.text.clone(),
            };
            output.push_str(&format!(
                "{} --> {}\n{}\n\n",
                format_timestamp(entry.start),
                format_timestamp(entry.end),
                text
            ));
        }

        output
    }

    fn extension(&self) -> &'static str {
        "vtt"
    }
}

fn format_timestamp(d: std::time::Duration) -> String {
    let total_millis = d.as_millis();
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let seconds = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{TierId, TimelineRecord};
    use std::time::Duration;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(Duration::from_millis(1500)),
            "00:00:01.500"
        );
    }

    #[test]
    fn test_vtt_format() {
        let document = TimelineDocument {
            total_duration: 4.0,
            tier_used: TierId::RemoteApi,
            segments: vec![TimelineRecord {
                utterance_index: 0,
                speaker: "男性".to_string(),
                text: "こんにちは".to_string(),
                start_sec: 1.5,
                end_sec: 4.0,
            }],
        };

        let output = VttFormatter::default().format(&document);

        assert!(output.starts_with("WEBVTT\n\n"));
        assert!(output.contains("00:00:01.500 --> 00:00:04.000\n<v 男性>こんにちは"));
    }
}
