//! LaTeX escaping and small display formatters.
//!
//! Two escaping modes:
//! - **full**: every special character including `\`, `{` and `}`. Used for names, titles,
//!   organizations and other plain text that must never carry markup.
//! - **partial**: only `& % $ # _ ~ ^`, leaving commands and groups intact. Used for prose
//!   fields (summary, bullets) that may legitimately contain `\textbf{..}` and friends.
//!
//! Both are a single left-to-right pass, so replacement text is never re-escaped.

/// Escapes every LaTeX special character in `text`.
pub fn escape_full(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\textbackslash{}"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            _ => push_special(&mut out, ch),
        }
    }
    out
}

/// Escapes `& % $ # _ ~ ^`, skipping any occurrence already preceded by a backslash.
pub fn escape_partial(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut prev = None;
    for ch in text.chars() {
        if prev == Some('\\') {
            out.push(ch);
        } else {
            push_special(&mut out, ch);
        }
        // A doubled backslash is a line break, not an escape for the next character.
        prev = if prev == Some('\\') && ch == '\\' {
            None
        } else {
            Some(ch)
        };
    }
    out
}

fn push_special(out: &mut String, ch: char) {
    match ch {
        '&' => out.push_str("\\&"),
        '%' => out.push_str("\\%"),
        '$' => out.push_str("\\$"),
        '#' => out.push_str("\\#"),
        '_' => out.push_str("\\_"),
        '~' => out.push_str("\\textasciitilde{}"),
        '^' => out.push_str("\\textasciicircum{}"),
        _ => out.push(ch),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Formatters
// ────────────────────────────────────────────────────────────────────────────

/// Formats North American numbers as `(555) 123-4567` / `+1 (555) 123-4567`.
/// International and unrecognized numbers are returned trimmed but otherwise unchanged.
pub fn format_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return trimmed.to_string();
    }
    if trimmed.starts_with('+') && !matches!(digits.len(), 10 | 11) {
        return trimmed.to_string();
    }

    match digits.len() {
        11 if digits.starts_with('1') => format!(
            "+1 ({}) {}-{}",
            &digits[1..4],
            &digits[4..7],
            &digits[7..]
        ),
        10 => {
            format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
        }
        _ => trimmed.to_string(),
    }
}

/// Adds an `https://` scheme when missing and drops trailing slashes. `%` and `#` are
/// escaped so the URL survives inside `\href{}` and `\homepage{}`.
pub fn format_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        return String::new();
    }
    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };

    let mut out = String::with_capacity(url.len());
    let mut prev = None;
    for ch in url.chars() {
        if matches!(ch, '%' | '#') && prev != Some('\\') {
            out.push('\\');
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}

/// Last path segment of a profile URL (`https://github.com/octo/` → `octo`).
pub fn handle_from_url(value: &str) -> String {
    let value = value.trim().trim_end_matches('/');
    match value.rfind('/') {
        Some(pos) if value.contains("://") || value.contains('.') => value[pos + 1..].to_string(),
        _ => value.trim_start_matches('@').to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
