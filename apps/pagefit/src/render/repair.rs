//! Repair pass: normalizes malformed or corrupted markup before compilation.
//!
//! # Architecture
//! Rules run in a fixed order, each a `RepairRule` trait object with a narrow `window` (the
//! exact shape it recognizes). A rule only rewrites text inside its window, so unrecognized
//! breakage passes through untouched. Every rule runs to its own fixed point, and the rule
//! sequence repeats until a full sequence changes nothing, so
//! `repair(repair(x)) == repair(x)`.
//!
//! 1. `dropped-escapes`: backslashes lost to control-character escapes (`\n`, `\t`, ...)
//! 2. `nested-groups`: redundant nested color/brace groups
//! 3. `separator-lines`: the run of separator lines right after `\begin{document}`
//! 4. `feature-toggles`: required toggles defined and invoked exactly once (see `toggles`)

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, info};

use crate::render::toggles::FeatureToggles;

/// Brace-group body the nested-group rule will look inside.
const MAX_GROUP_BODY: usize = 240;
/// Full rule sequences per call. Rules only shorten the text except toggle injection,
/// which happens at most once per toggle, so two sequences settle every input.
const MAX_RULE_SEQUENCES: usize = 4;

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

pub trait RepairRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// The text shape this rule recognizes. Anything outside it is left alone.
    fn window(&self) -> &'static str;

    fn matches(&self, markup: &str) -> bool;

    fn fix(&self, markup: &str) -> String;
}

static RULES: [&dyn RepairRule; 4] = [&DroppedEscapes, &NestedGroups, &SeparatorLines, &FeatureToggles];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub markup: String,
    /// Names of the rules that changed the markup, in application order.
    pub applied_rules: Vec<&'static str>,
}

// ────────────────────────────────────────────────────────────────────────────
// Public entry points
// ────────────────────────────────────────────────────────────────────────────

/// Runs every rule in order and returns only the repaired markup.
pub fn repair(markup: &str) -> String {
    repair_with_report(markup).markup
}

pub fn repair_with_report(markup: &str) -> RepairReport {
    let mut current = markup.to_string();
    let mut applied_rules = Vec::new();

    for _ in 0..MAX_RULE_SEQUENCES {
        let mut changed = false;
        for rule in RULES.iter() {
            if !rule.matches(&current) {
                continue;
            }
            let fixed = rule.fix(&current);
            if fixed != current {
                debug!(rule = rule.name(), window = rule.window(), "Repair rule applied");
                if !applied_rules.contains(&rule.name()) {
                    applied_rules.push(rule.name());
                }
                current = fixed;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    if !applied_rules.is_empty() {
        info!(rules = ?applied_rules, "Markup repaired");
    }

    RepairReport {
        markup: current,
        applied_rules,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rule 1: dropped escapes
// ────────────────────────────────────────────────────────────────────────────

/// `\n` in `\newcommand` read as a newline leaves `ewcommand` at the start of a line.
const NEWLINE_TOKENS: [&str; 8] = [
    "ewcommand",
    "ewif",
    "ewpage",
    "ewline",
    "ewgeometry",
    "opagenumbers",
    "oindent",
    "ewenvironment",
];

/// Other control characters and the command tails they swallow.
const CONTROL_TOKENS: [(char, char, &[&str]); 5] = [
    ('\t', 't', &["extbf", "extit", "extcolor"]),
    ('\r', 'r', &["enewcommand"]),
    ('\u{8}', 'b', &["egin"]),
    ('\u{7}', 'a', &["ddtolength"]),
    ('\u{b}', 'v', &["space"]),
];

pub struct DroppedEscapes;

fn newline_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?m)^([ \t]*)({})\b", NEWLINE_TOKENS.join("|")))
            .expect("valid newline token regex")
    })
}

fn control_token_regexes() -> &'static [(Regex, char)] {
    static RES: OnceLock<Vec<(Regex, char)>> = OnceLock::new();
    RES.get_or_init(|| {
        CONTROL_TOKENS
            .iter()
            .map(|(control, letter, tails)| {
                let pattern = format!(r"\x{{{:02X}}}({})\b", *control as u32, tails.join("|"));
                (
                    Regex::new(&pattern).expect("valid control token regex"),
                    *letter,
                )
            })
            .collect()
    })
}

impl RepairRule for DroppedEscapes {
    fn name(&self) -> &'static str {
        "dropped-escapes"
    }

    fn window(&self) -> &'static str {
        "a listed command tail at line start, or directly after a control character"
    }

    fn matches(&self, markup: &str) -> bool {
        newline_token_regex().is_match(markup)
            || control_token_regexes().iter().any(|(re, _)| re.is_match(markup))
    }

    fn fix(&self, markup: &str) -> String {
        let mut out = newline_token_regex()
            .replace_all(markup, "${1}\\n${2}")
            .into_owned();
        for (re, letter) in control_token_regexes() {
            out = re
                .replace_all(&out, |caps: &Captures| format!("\\{letter}{}", &caps[1]))
                .into_owned();
        }
        out
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rule 2: nested groups
// ────────────────────────────────────────────────────────────────────────────

pub struct NestedGroups;

fn nested_color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\{{\\color\{{([^{{}}]+)\}}\s*\{{\\color\{{([^{{}}]+)\}}\s*([^{{}}]{{0,{MAX_GROUP_BODY}}})\}}\}}"
        ))
        .expect("valid nested color regex")
    })
}

fn nested_textcolor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\\textcolor\{{([^{{}}]+)\}}\{{\\textcolor\{{([^{{}}]+)\}}\{{([^{{}}]{{0,{MAX_GROUP_BODY}}})\}}\}}"
        ))
        .expect("valid nested textcolor regex")
    })
}

fn double_brace_color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\{{\{{\\color\{{([^{{}}]+)\}}\s*([^{{}}]{{0,{MAX_GROUP_BODY}}})\}}\}}"
        ))
        .expect("valid double brace regex")
    })
}

fn double_brace_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"\\name\{{\{{([^{{}}]{{0,{MAX_GROUP_BODY}}})\}}\}}\{{\{{([^{{}}]{{0,{MAX_GROUP_BODY}}})\}}\}}"
        ))
        .expect("valid double brace name regex")
    })
}

impl NestedGroups {
    fn collapse_once(markup: &str) -> String {
        // Same-color nesting only; the regex crate has no backreferences.
        let out = nested_color_regex().replace_all(markup, |caps: &Captures| {
            if caps[1].trim() == caps[2].trim() {
                format!("{{\\color{{{}}} {}}}", &caps[1], &caps[3])
            } else {
                caps[0].to_string()
            }
        });
        let out = nested_textcolor_regex().replace_all(&out, |caps: &Captures| {
            if caps[1].trim() == caps[2].trim() {
                format!("\\textcolor{{{}}}{{{}}}", &caps[1], &caps[3])
            } else {
                caps[0].to_string()
            }
        });
        let out = double_brace_color_regex().replace_all(&out, "{\\color{${1}} ${2}}");
        let out = double_brace_name_regex().replace_all(&out, "\\name{${1}}{${2}}");
        out.into_owned()
    }
}

impl RepairRule for NestedGroups {
    fn name(&self) -> &'static str {
        "nested-groups"
    }

    fn window(&self) -> &'static str {
        "a single brace group with a body of at most 240 characters"
    }

    fn matches(&self, markup: &str) -> bool {
        nested_color_regex().is_match(markup)
            || nested_textcolor_regex().is_match(markup)
            || double_brace_color_regex().is_match(markup)
            || double_brace_name_regex().is_match(markup)
    }

    fn fix(&self, markup: &str) -> String {
        // Every collapse that changes the text shortens it, so this terminates.
        let mut current = markup.to_string();
        loop {
            let next = Self::collapse_once(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rule 3: separator lines
// ────────────────────────────────────────────────────────────────────────────

pub struct SeparatorLines;

fn separator_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[ \t]*(?:-{3,}|={3,}|_{3,}|\*{3,}|\\\\(?:\[[^\]]*\])?)[ \t]*\r?$")
            .expect("valid separator regex")
    })
}

impl SeparatorLines {
    /// Byte ranges of the separator lines leading the body. Blank lines are skipped and the
    /// run ends at the first line with other content.
    fn separator_spans(markup: &str) -> Vec<(usize, usize)> {
        let Some(begin) = markup.find("\\begin{document}") else {
            return Vec::new();
        };
        let Some(newline) = markup[begin..].find('\n') else {
            return Vec::new();
        };

        let mut spans = Vec::new();
        let mut offset = begin + newline + 1;
        for line in markup[offset..].split_inclusive('\n') {
            let start = offset;
            offset += line.len();
            let content = line.trim_end_matches('\n');

            if content.trim().is_empty() {
                continue;
            }
            if !separator_line_regex().is_match(content) {
                break;
            }
            spans.push((start, offset));
        }
        spans
    }
}

impl RepairRule for SeparatorLines {
    fn name(&self) -> &'static str {
        "separator-lines"
    }

    fn window(&self) -> &'static str {
        "separator-only lines directly after \\begin{document}, up to the first content line"
    }

    fn matches(&self, markup: &str) -> bool {
        !Self::separator_spans(markup).is_empty()
    }

    fn fix(&self, markup: &str) -> String {
        let mut out = String::with_capacity(markup.len());
        let mut last = 0;
        for (start, end) in Self::separator_spans(markup) {
            out.push_str(&markup[last..start]);
            last = end;
        }
        out.push_str(&markup[last..]);
        out
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
