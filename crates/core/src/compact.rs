//! Bounded, representative view of a transcript for context-limited consumers.

use crate::config::CompactConfig;
use crate::format::scene_label;
use crate::types::{CompactScene, CompactView, NaturalSegment};

const HOOK_SCENES: usize = 3;
const CTA_SCENES: usize = 2;

#[derive(Debug, Clone)]
pub struct Compactor {
    config: CompactConfig,
}

impl Compactor {
    pub fn new(config: CompactConfig) -> Self {
        Self { config }
    }

    pub fn compact(&self, title: &str, description: &str, segments: &[NaturalSegment]) -> CompactView {
        let scenes: Vec<CompactScene> = sample_indices(segments.len(), self.config.max_scenes)
            .into_iter()
            .map(|i| {
                let seg = &segments[i];
                CompactScene {
                    t: scene_label(seg.start_sec, seg.end_sec),
                    start_sec: seg.start_sec,
                    end_sec: seg.end_sec,
                    text: cut(&seg.text, self.config.max_chars_per_scene),
                }
            })
            .collect();

        let hook = scenes.iter().take(HOOK_SCENES).cloned().collect();
        let cta = if scenes.len() >= CTA_SCENES {
            scenes[scenes.len() - CTA_SCENES..].to_vec()
        } else {
            Vec::new()
        };

        CompactView {
            title: cut(title, self.config.max_title_chars),
            description: cut(description, self.config.max_description_chars),
            hook,
            cta,
            scenes,
        }
    }
}

impl Default for Compactor {
    fn default() -> Self {
        Self::new(CompactConfig::default())
    }
}

/// Indices of the sampled segments, ascending and distinct.
///
/// With more than `k` segments: head, a window around the midpoint, and the
/// tail, `k / 3` each with the remainder going to the tail. The mid window
/// slides left when it would run into the tail.
pub fn sample_indices(len: usize, k: usize) -> Vec<usize> {
    if len <= k {
        return (0..len).collect();
    }
    match k {
        0 => Vec::new(),
        1 => vec![0],
        2 => vec![0, len - 1],
        _ => {
            let third = k / 3;
            let tail_len = k - 2 * third;
            let tail_start = len - tail_len;

            let mut mid_start = (len / 2).saturating_sub(third / 2).max(third);
            if mid_start + third > tail_start {
                mid_start = tail_start - third;
            }

            (0..third)
                .chain(mid_start..mid_start + third)
                .chain(tail_start..len)
                .collect()
        }
    }
}

/// Trims and caps `s` at `max` characters, the last one being `…` when cut.
pub fn cut(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let kept: String = s.chars().take(max - 1).collect();
    let mut out = kept.trim_end().to_string();
    out.push('…');
    out
}
