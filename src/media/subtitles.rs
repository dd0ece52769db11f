use std::fmt::Write;
use std::time::Duration;

use crate::models::StepRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

/// One cue per run of consecutive steps showing the same caption. A cue
/// lasts until the next step's caption changes, or to the end of its last
/// step.
pub fn cues_from_records(records: &[StepRecord]) -> Vec<SubtitleCue> {
    let mut cues: Vec<SubtitleCue> = Vec::new();
    let mut open: Option<SubtitleCue> = None;

    for record in records {
        let subtitle = record.subtitle.as_deref();
        if let (Some(cue), Some(text)) = (open.as_mut(), subtitle) {
            if cue.text == text {
                cue.end = record.end();
                continue;
            }
        }

        if let Some(mut cue) = open.take() {
            cue.end = cue.end.max(record.start());
            cues.push(cue);
        }
        open = subtitle.map(|text| SubtitleCue {
            start: record.start(),
            end: record.end(),
            text: text.to_string(),
        });
    }
    cues.extend(open);
    cues
}

fn srt_timestamp(at: Duration) -> String {
    let total = at.as_millis();
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total / 3_600_000,
        (total / 60_000) % 60,
        (total / 1_000) % 60,
        total % 1_000
    )
}

pub fn to_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_timestamp(cue.start),
            srt_timestamp(cue.end),
            cue.text.trim()
        );
    }
    out
}
