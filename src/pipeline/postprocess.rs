//! Post-processing: deterministic cleanup of extracted text.
//!
//! Text reaches us from three very different producers (a PDF text layer,
//! office XML, and OCR) and each leaves its own debris: Windows line endings
//! from office files, stray control bytes and soft hyphens from PDF text
//! layers, runs of blank lines and trailing spaces from OCR layout analysis.
//! These rules are cheap, content-preserving and applied in a fixed order:
//!
//! 1. Normalise line endings (CRLF / CR → LF)
//! 2. Strip control characters other than `\n` and `\t`
//! 3. Strip invisible Unicode (zero-width space/joiners, BOM, soft hyphen)
//! 4. Trim trailing whitespace per line
//! 5. Collapse 3+ consecutive newlines into one blank line
//! 6. Trim the whole text

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules.
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_control_chars(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove control characters ────────────────────────────────────────

fn remove_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
