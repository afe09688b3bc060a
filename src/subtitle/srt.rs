// SRT subtitle format
use super::{entries_from_document, SubtitleFormatter, WrapConfig};
use crate::timeline::TimelineDocument;

#[derive(Default)]
pub struct SrtFormatter {
    pub wrap: WrapConfig,
}

impl SubtitleFormatter for SrtFormatter {
    fn format(&self, document: &TimelineDocument) -> String {
        entries_from_document(document, self.wrap)
            .iter()
            .map(|entry| {
                format!(
                    "{}\n{} --> {}\n{}\n",
                    entry.index,
                    format_timestamp(entry.start),
                    format_timestamp(entry.end),
                    entry.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn extension(&self) -> &'static str {
        "srt"
    }
}

fn format_timestamp(d: std::time::Duration) -> String {
    let total_millis = d.as_millis();
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let seconds = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}
