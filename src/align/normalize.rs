use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Bracketed recognizer annotations such as `[音楽]`, `(applause)` or `【拍手】`.
static ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\[\(（【<＜][^\]\)）】>＞]*[\]\)）】>＞]").expect("Invalid regex")
});

/// How normalized text is split into comparable tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    /// Whitespace-delimited words.
    Words,
    /// Fixed-size character windows, for scripts without word separators.
    CharWindows(usize),
}

/// Fold width and case, drop punctuation and symbols, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars().map(fold_width) {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !c.is_alphanumeric() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.extend(c.to_lowercase());
    }

    out
}

/// Remove bracketed annotations that recognizers insert for non-speech sounds.
pub fn strip_annotations(text: &str) -> Cow<'_, str> {
    ANNOTATION.replace_all(text, " ")
}

/// Number of characters that carry speech content.
pub fn content_length(text: &str) -> usize {
    normalize(text).chars().filter(|c| !c.is_whitespace()).count()
}

fn fold_width(c: char) -> char {
    match c {
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        '\u{3000}' => ' ',
        _ => c,
    }
}

/// Scripts written without spaces between words.
pub fn is_unsegmented_script(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'   // hiragana, katakana
        | '\u{3400}'..='\u{4DBF}' // CJK extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
        | '\u{F900}'..='\u{FAFF}' // CJK compatibility ideographs
        | '\u{FF66}'..='\u{FF9F}' // half-width katakana
        | '\u{0E00}'..='\u{0E7F}' // thai
    )
}

/// Pick a token mode from the script text: character windows when at least
/// half of the content characters come from unsegmented scripts.
pub fn detect_mode<'a>(texts: impl IntoIterator<Item = &'a str>, window: usize) -> TokenMode {
    let mut total = 0usize;
    let mut unsegmented = 0usize;

    for text in texts {
        for c in text.chars().filter(|c| c.is_alphanumeric()) {
            total += 1;
            if is_unsegmented_script(c) {
                unsegmented += 1;
            }
        }
    }

    if total > 0 && unsegmented * 2 >= total {
        TokenMode::CharWindows(window.max(1))
    } else {
        TokenMode::Words
    }
}

/// Split already-normalized text into tokens.
pub fn tokenize(normalized: &str, mode: TokenMode) -> Vec<String> {
    match mode {
        TokenMode::Words => normalized.split_whitespace().map(str::to_string).collect(),
        TokenMode::CharWindows(size) => {
            let chars: Vec<char> = normalized.chars().filter(|c| !c.is_whitespace()).collect();
            chars
                .chunks(size.max(1))
                .map(|window| window.iter().collect())
                .collect()
        }
    }
}
