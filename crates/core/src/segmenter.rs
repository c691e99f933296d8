//! Merges fine-grained timed fragments into natural spans of speech.
//!
//! Hard triggers (silence gap, max span, max characters) flush before the next
//! fragment is appended; the sentence-boundary trigger flushes after it.

use crate::config::SegmenterConfig;
use crate::types::{NaturalSegment, Segment};

const TERMINAL_PUNCTUATION: [char; 7] = ['.', '!', '?', '…', '。', '！', '？'];

/// Korean sentence-final endings (declarative and polite forms).
const KOREAN_FINAL_ENDINGS: [&str; 3] = ["니다", "요", "죠"];

#[derive(Debug, Clone)]
pub struct NaturalSegmenter {
    config: SegmenterConfig,
}

struct Buffer {
    start: f64,
    end: f64,
    /// End of the most recently appended fragment, for gap measurement.
    last_end: f64,
    text: String,
    chars: usize,
}

impl Buffer {
    fn open(start: f64, seg: &Segment, text: String) -> Self {
        let chars = text.chars().count();
        Self {
            start,
            end: seg.end_sec().max(start),
            last_end: seg.end_sec(),
            text,
            chars,
        }
    }

    fn push(&mut self, seg: &Segment, text: &str) {
        self.text.push(' ');
        self.text.push_str(text);
        self.chars += 1 + text.chars().count();
        self.end = self.end.max(seg.end_sec());
        self.last_end = seg.end_sec();
    }

    fn span(&self) -> f64 {
        self.end - self.start
    }
}

impl NaturalSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn segment(&self, segments: &[Segment]) -> Vec<NaturalSegment> {
        let mut out: Vec<NaturalSegment> = Vec::new();
        let mut current: Option<Buffer> = None;

        for seg in segments {
            let text = normalize(&seg.text);
            if text.is_empty() {
                continue;
            }

            if let Some(buf) = current.as_mut() {
                if self.must_flush_before(buf, seg, &text) {
                    if let Some(done) = current.take() {
                        out.push(finish(done));
                    }
                } else {
                    buf.push(seg, &text);
                }
            }

            if current.is_none() {
                // Keep starts non-decreasing even for out-of-order input.
                let floor = out.last().map_or(0.0, |n| n.start_sec);
                current = Some(Buffer::open(seg.start_sec.max(floor), seg, text));
            }

            if current.as_ref().is_some_and(|buf| self.ends_sentence(buf)) {
                if let Some(done) = current.take() {
                    out.push(finish(done));
                }
            }
        }

        if let Some(done) = current.take() {
            out.push(finish(done));
        }

        clamp_ends(&mut out);
        out
    }

    fn must_flush_before(&self, buf: &Buffer, seg: &Segment, text: &str) -> bool {
        let gap = seg.start_sec - buf.last_end;
        if gap > self.config.pause_secs {
            return true;
        }
        let span = buf.end.max(seg.end_sec()) - buf.start;
        if span > self.config.max_span_secs {
            return true;
        }
        buf.chars + 1 + text.chars().count() > self.config.max_chars
    }

    fn ends_sentence(&self, buf: &Buffer) -> bool {
        buf.span() >= self.config.min_sentence_secs && is_sentence_final(&buf.text)
    }
}

impl Default for NaturalSegmenter {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

pub fn is_sentence_final(text: &str) -> bool {
    let text = text.trim_end_matches(['"', '\'', ')', '”', '’', ' ']);
    text.ends_with(TERMINAL_PUNCTUATION) || KOREAN_FINAL_ENDINGS.iter().any(|e| text.ends_with(e))
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn finish(buf: Buffer) -> NaturalSegment {
    NaturalSegment::new(buf.start, buf.end, buf.text)
}

/// Overlapping source lines must not yield overlapping spans.
fn clamp_ends(out: &mut [NaturalSegment]) {
    for i in 1..out.len() {
        let next_start = out[i].start_sec;
        let prev = &mut out[i - 1];
        if prev.end_sec > next_start {
            *prev = NaturalSegment::new(prev.start_sec, next_start, std::mem::take(&mut prev.text));
        }
    }
}
