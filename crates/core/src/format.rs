use crate::types::Segment;

/// Format seconds as MM:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{:02}:{:02}", mins, secs)
}

/// Whole-second range label used for compact scenes, e.g. `"12-18"`.
pub fn scene_label(start_sec: f64, end_sec: f64) -> String {
    format!("{}-{}", start_sec.max(0.0) as u64, end_sec.max(0.0) as u64)
}

/// SRT timestamp, `HH:MM:SS,mmm`.
pub fn srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (h, rem) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (m, rem) = (rem / 60_000, rem % 60_000);
    let (s, ms) = (rem / 1000, rem % 1000);
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Plain transcript text: one line per non-empty segment, runs of whitespace
/// collapsed, capped at `max_chars` characters.
pub fn transcript_text(segments: &[Segment], max_chars: Option<usize>) -> String {
    let text = segments
        .iter()
        .map(|seg| seg.text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    match max_chars {
        Some(max) if text.chars().count() > max => text.chars().take(max).collect(),
        _ => text,
    }
}

/// Render segments as an SRT document. Segments without text are skipped and
/// numbering stays contiguous.
pub fn to_srt(segments: &[Segment]) -> String {
    let mut out = String::new();
    let mut idx = 1;
    for seg in segments {
        let text = seg.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            idx,
            srt_timestamp(seg.start_sec),
            srt_timestamp(seg.end_sec()),
            text
        ));
        idx += 1;
    }
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(75.9), "01:15");
        assert_eq!(format_timestamp(3725.0), "62:05");
    }

    #[test]
    fn test_scene_label_truncates() {
        assert_eq!(scene_label(12.9, 18.2), "12-18");
    }

    #[test]
    fn test_srt_timestamp() {
        assert_eq!(srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(srt_timestamp(3661.25), "01:01:01,250");
        assert_eq!(srt_timestamp(59.9999), "00:01:00,000");
    }

    #[test]
    fn test_transcript_text_caps() {
        let segs = vec![
            Segment::new(0.0, 1.0, "  hello   world "),
            Segment::new(1.0, 1.0, ""),
            Segment::new(2.0, 1.0, "안녕하세요"),
        ];
        assert_eq!(transcript_text(&segs, None), "hello world\n안녕하세요");
        assert_eq!(transcript_text(&segs, Some(14)), "hello world\n안녕");
    }

    #[test]
    fn test_to_srt() {
        let segs = vec![
            Segment::new(0.5, 1.5, "first\nline"),
            Segment::new(2.0, 1.0, " "),
            Segment::new(3.0, 2.0, "second"),
        ];
        assert_eq!(
            to_srt(&segs),
            "1\n00:00:00,500 --> 00:00:02,000\nfirst line\n\n2\n00:00:03,000 --> 00:00:05,000\nsecond\n"
        );
    }
}
