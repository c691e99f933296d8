//! Language priority lists and caption-track language matching.

pub const DEFAULT_LANGUAGES: [&str; 5] = ["ko", "ko-KR", "en", "en-US", "en-GB"];

/// Expands a user language list into the priority list used for track matching.
///
/// `ko` also yields `ko-KR`, `en` also yields `en-US` and `en-GB`. Order is kept
/// and duplicates dropped. An empty list yields [`DEFAULT_LANGUAGES`].
pub fn expand_language_priority<S: AsRef<str>>(langs: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |tag: &str| {
        if !out.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            out.push(tag.to_string());
        }
    };

    for lang in langs {
        let lang = lang.as_ref().trim();
        if lang.is_empty() {
            continue;
        }
        push(lang);
        match lang {
            "ko" => push("ko-KR"),
            "en" => {
                push("en-US");
                push("en-GB");
            }
            _ => {}
        }
    }

    if out.is_empty() {
        DEFAULT_LANGUAGES.iter().map(|s| s.to_string()).collect()
    } else {
        out
    }
}

/// Primary subtag of a BCP-47-ish tag, lowercased (`ko-KR` -> `ko`).
pub fn primary_subtag(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or(tag)
        .trim()
        .to_ascii_lowercase()
}

pub fn same_family(a: &str, b: &str) -> bool {
    let a = primary_subtag(a);
    !a.is_empty() && a == primary_subtag(b)
}

/// Picks the best item for a priority list: first an exact (case-insensitive)
/// tag match in priority order, then a language-family match in priority order.
pub fn find_by_priority<'a, T, F>(items: &'a [T], priority: &[String], tag_of: F) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    for wanted in priority {
        if let Some(item) = items.iter().find(|i| tag_of(i).eq_ignore_ascii_case(wanted)) {
            return Some(item);
        }
    }
    for wanted in priority {
        if let Some(item) = items.iter().find(|i| same_family(tag_of(i), wanted)) {
            return Some(item);
        }
    }
    None
}

pub fn in_priority(tag: &str, priority: &[String]) -> bool {
    priority
        .iter()
        .any(|p| p.eq_ignore_ascii_case(tag) || same_family(p, tag))
}
