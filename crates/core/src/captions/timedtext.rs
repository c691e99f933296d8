//! Decoder for timedtext caption documents.
//!
//! Handles the classic format (`<text start="1.2" dur="3.4">…</text>`, seconds)
//! and srv3 (`<p t="1200" d="3400">…</p>`, milliseconds, nested `<s>` runs).

use crate::captions::CaptionError;
use crate::types::Segment;

pub fn parse(body: &str) -> Result<Vec<Segment>, CaptionError> {
    let body = body.trim_start_matches('\u{feff}').trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }
    if !(body.starts_with("<?xml") || body.starts_with("<transcript") || body.starts_with("<timedtext")) {
        let head: String = body.chars().take(80).collect();
        return Err(CaptionError::Malformed(format!("not a timedtext document: {head}")));
    }

    if body.contains("<text") {
        Ok(parse_elements(body, "text", Unit::Seconds))
    } else {
        Ok(parse_elements(body, "p", Unit::Millis))
    }
}

#[derive(Clone, Copy)]
enum Unit {
    Seconds,
    Millis,
}

fn parse_elements(body: &str, tag: &str, unit: Unit) -> Vec<Segment> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let (start_attr, dur_attr) = match unit {
        Unit::Seconds => ("start", "dur"),
        Unit::Millis => ("t", "d"),
    };

    let mut out = Vec::new();
    let mut rest = body;

    while let Some(pos) = rest.find(&open) {
        rest = &rest[pos + open.len()..];
        // `<p` must not match `<param` etc.
        if !rest.starts_with([' ', '>', '/', '\t', '\n']) {
            continue;
        }
        let Some(tag_end) = rest.find('>') else {
            break;
        };
        let attrs = &rest[..tag_end];
        let self_closing = attrs.ends_with('/');
        rest = &rest[tag_end + 1..];

        let inner = if self_closing {
            ""
        } else {
            let end = rest.find(&close).unwrap_or(rest.len());
            let inner = &rest[..end];
            rest = &rest[(end + close.len()).min(rest.len())..];
            inner
        };

        let start = attr(attrs, start_attr).and_then(|v| v.parse::<f64>().ok());
        let Some(start) = start else {
            continue;
        };
        let dur = attr(attrs, dur_attr)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        let (start, dur) = match unit {
            Unit::Seconds => (start, dur),
            Unit::Millis => (start / 1000.0, dur / 1000.0),
        };

        // YouTube double-escapes some entities (`&amp;#39;`).
        let text = decode_entities(&decode_entities(&strip_tags(inner)));
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        out.push(Segment::new(start, dur, text));
    }

    out
}

fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {name}=\"");
    let start = attrs.find(&needle)? + needle.len();
    let len = attrs[start..].find('"')?;
    Some(&attrs[start..start + len])
}

fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &rest[1..semi];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, semi))
        });

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
