//! Feature toggles: macros the page-budget pipeline relies on being defined and invoked.
//!
//! For every required toggle the repair pass guarantees:
//! - a definition exists (the default block is injected before `\begin{document}`),
//! - exactly one invocation exists (injected after `\begin{document}`, or duplicates
//!   removed keeping the first).
//!
//! Definitions and commented-out text never count as invocations. Markup without
//! `\begin{document}` is not a document and is left alone.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::render::repair::RepairRule;
use crate::render::template::has_package;

const BEGIN_DOCUMENT: &str = "\\begin{document}";

pub struct ToggleSpec {
    /// Macro name without the backslash.
    pub command: &'static str,
    /// `\newif` flag the definition sets, declared alongside it.
    pub flag: Option<&'static str>,
    /// Packages the definition body needs.
    pub packages: &'static [&'static str],
    pub body: &'static str,
}

pub const REQUIRED_TOGGLES: [ToggleSpec; 1] = [ToggleSpec {
    command: "compactresumelayout",
    flag: Some("compactresume"),
    packages: &["enumitem"],
    body: "  \\compactresumetrue
  \\setlength{\\itemsep}{0.2em}
  \\setlength{\\parskip}{0.15em}
  \\setlist[itemize]{leftmargin=*, labelsep=0.4em, topsep=0.1em, itemsep=0.1em, parsep=0em}
  \\setlist[enumerate]{leftmargin=*, labelsep=0.4em, topsep=0.1em, itemsep=0.1em, parsep=0em}
",
}];

struct ToggleMatchers {
    definition: Regex,
    usage: Regex,
    flag: Option<Regex>,
}

fn matchers() -> &'static [ToggleMatchers] {
    static MATCHERS: OnceLock<Vec<ToggleMatchers>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        REQUIRED_TOGGLES
            .iter()
            .map(|toggle| {
                let command = regex::escape(toggle.command);
                ToggleMatchers {
                    definition: Regex::new(&format!(
                        r"\\(?:(?:new|renew|provide)command\*?\s*\{{?\s*|def\s*)\\{command}\b"
                    ))
                    .expect("valid toggle definition regex"),
                    usage: Regex::new(&format!(r"\\{command}\b"))
                        .expect("valid toggle usage regex"),
                    flag: toggle.flag.map(|flag| {
                        Regex::new(&format!(r"\\newif\s*\\if{}\b", regex::escape(flag)))
                            .expect("valid toggle flag regex")
                    }),
                }
            })
            .collect()
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Rule
// ────────────────────────────────────────────────────────────────────────────

pub struct FeatureToggles;

impl RepairRule for FeatureToggles {
    fn name(&self) -> &'static str {
        "feature-toggles"
    }

    fn window(&self) -> &'static str {
        "toggle definitions and invocations in documents with \\begin{document}"
    }

    fn matches(&self, markup: &str) -> bool {
        if !markup.contains(BEGIN_DOCUMENT) {
            return false;
        }
        matchers().iter().any(|m| {
            !is_defined(markup, m) || invocation_spans(markup, m).len() != 1
        })
    }

    fn fix(&self, markup: &str) -> String {
        if !markup.contains(BEGIN_DOCUMENT) {
            return markup.to_string();
        }

        let mut current = markup.to_string();
        for (toggle, m) in REQUIRED_TOGGLES.iter().zip(matchers()) {
            if !is_defined(&current, m) {
                debug!(toggle = toggle.command, "Injecting toggle definition");
                let block = definition_block(toggle, &current, m);
                current = insert_before_begin_document(&current, &block);
            }

            let spans = invocation_spans(&current, m);
            if spans.is_empty() {
                debug!(toggle = toggle.command, "Injecting toggle invocation");
                current = insert_after_begin_document(&current, &format!("\\{}\n", toggle.command));
            } else if spans.len() > 1 {
                debug!(
                    toggle = toggle.command,
                    duplicates = spans.len() - 1,
                    "Removing duplicate toggle invocations"
                );
                current = remove_spans(&current, &spans[1..]);
            }
        }
        current
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

fn is_defined(markup: &str, m: &ToggleMatchers) -> bool {
    m.definition
        .find_iter(markup)
        .any(|found| !in_comment(markup, found.start()))
}

/// Byte ranges of live invocations, in document order.
fn invocation_spans(markup: &str, m: &ToggleMatchers) -> Vec<(usize, usize)> {
    let definitions: Vec<(usize, usize)> = m
        .definition
        .find_iter(markup)
        .map(|found| (found.start(), found.end()))
        .collect();

    m.usage
        .find_iter(markup)
        .filter(|found| !in_comment(markup, found.start()))
        .filter(|found| {
            !definitions
                .iter()
                .any(|(start, end)| found.start() >= *start && found.end() <= *end)
        })
        .map(|found| (found.start(), found.end()))
        .collect()
}

/// True when an unescaped `%` precedes `pos` on its line.
fn in_comment(markup: &str, pos: usize) -> bool {
    let line_start = markup[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let mut prev = None;
    for ch in markup[line_start..pos].chars() {
        if ch == '%' && prev != Some('\\') {
            return true;
        }
        prev = Some(ch);
    }
    false
}

fn definition_block(toggle: &ToggleSpec, markup: &str, m: &ToggleMatchers) -> String {
    let mut block = String::from(
        "% Compact layout toggle for page budget enforcement (auto-injected)\n",
    );
    if let (Some(flag), Some(flag_re)) = (toggle.flag, &m.flag) {
        if !flag_re.is_match(markup) {
            block.push_str(&format!("\\newif\\if{flag}\n\\{flag}false\n"));
        }
    }
    for package in toggle.packages {
        if !has_package(markup, package) {
            block.push_str(&format!("\\usepackage{{{package}}}\n"));
        }
    }
    block.push_str(&format!(
        "\\newcommand{{\\{}}}{{%\n{}}}\n",
        toggle.command, toggle.body
    ));
    block
}

fn insert_before_begin_document(markup: &str, block: &str) -> String {
    let Some(begin) = markup.find(BEGIN_DOCUMENT) else {
        return markup.to_string();
    };
    let line_start = markup[..begin].rfind('\n').map(|i| i + 1).unwrap_or(0);
    format!("{}{}{}", &markup[..line_start], block, &markup[line_start..])
}

fn insert_after_begin_document(markup: &str, line: &str) -> String {
    let Some(begin) = markup.find(BEGIN_DOCUMENT) else {
        return markup.to_string();
    };
    match markup[begin..].find('\n') {
        Some(offset) => {
            let at = begin + offset + 1;
            format!("{}{}{}", &markup[..at], line, &markup[at..])
        }
        None => format!("{markup}\n{line}"),
    }
}

/// Removes each span; a line left blank by the removal is dropped entirely.
fn remove_spans(markup: &str, spans: &[(usize, usize)]) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut last = 0;

    for &(start, end) in spans {
        let line_start = markup[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = markup[end..].find('\n').map(|i| end + i + 1).unwrap_or(markup.len());
        let blank_after = markup[line_start..start].trim().is_empty()
            && markup[end..line_end].trim().is_empty();

        if blank_after && line_start >= last {
            out.push_str(&markup[last..line_start]);
            last = line_end;
        } else {
            out.push_str(&markup[last..start]);
            last = end;
        }
    }
    out.push_str(&markup[last..]);
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::repair::repair;

    const DEFINITION: &str = "\\newcommand{\\compactresumelayout}{\\compactresumetrue}\n";

    fn make_document(preamble: &str, body: &str) -> String {
        format!("\\documentclass{{moderncv}}\n{preamble}\\begin{{document}}\n{body}\\end{{document}}\n")
    }

    #[test]
    fn test_duplicate_invocations_keep_first() {
        let markup = make_document(
            DEFINITION,
            "\\compactresumelayout\n\\makecvtitle\n\\compactresumelayout\nBody \\compactresumelayout{} text\n",
        );
        let fixed = FeatureToggles.fix(&markup);
        assert_eq!(
            fixed,
            make_document(DEFINITION, "\\compactresumelayout\n\\makecvtitle\nBody {} text\n")
        );
        assert_eq!(invocation_spans(&fixed, &matchers()[0]).len(), 1);
    }

    #[test]
    fn test_first_invocation_position_preserved() {
        let markup = make_document(DEFINITION, "\\makecvtitle\n\\compactresumelayout\n\\compactresumelayout\n");
        let fixed = FeatureToggles.fix(&markup);
        let title = fixed.find("\\makecvtitle").unwrap();
        let invocation = invocation_spans(&fixed, &matchers()[0])[0].0;
        assert!(title < invocation);
    }

    #[test]
    fn test_missing_definition_injected_with_dependencies() {
        let markup = make_document("", "\\compactresumelayout\nBody\n");
        let fixed = FeatureToggles.fix(&markup);
        let begin = fixed.find(BEGIN_DOCUMENT).unwrap();
        let definition = fixed.find("\\newcommand{\\compactresumelayout}{%").unwrap();
        assert!(definition < begin);
        assert!(fixed.contains("\\newif\\ifcompactresume\n\\compactresumefalse\n"));
        assert!(fixed.contains("\\usepackage{enumitem}\n"));
        assert!(fixed.contains("(auto-injected)"));
        assert_eq!(invocation_spans(&fixed, &matchers()[0]).len(), 1);
    }

    #[test]
    fn test_existing_flag_and_package_not_duplicated() {
        let preamble = "\\usepackage{enumitem}\n\\newif\\ifcompactresume\n";
        let fixed = FeatureToggles.fix(&make_document(preamble, "Body\n"));
        assert_eq!(fixed.matches("\\newif\\ifcompactresume").count(), 1);
        assert_eq!(fixed.matches("\\usepackage{enumitem}").count(), 1);
    }

    #[test]
    fn test_missing_invocation_injected_after_begin_document() {
        let fixed = FeatureToggles.fix(&make_document(DEFINITION, "Body\n"));
        assert!(fixed.contains("\\begin{document}\n\\compactresumelayout\nBody\n"));
    }

    #[test]
    fn test_def_and_comments_are_not_invocations() {
        let preamble = "\\def\\compactresumelayout{}\n% \\compactresumelayout\n";
        let markup = make_document(preamble, "\\compactresumelayout\n");
        assert!(!FeatureToggles.matches(&markup));
    }

    #[test]
    fn test_commented_definition_does_not_count() {
        let preamble = "% \\newcommand{\\compactresumelayout}{}\n";
        let markup = make_document(preamble, "\\compactresumelayout\n");
        assert!(FeatureToggles.matches(&markup));
        assert!(FeatureToggles
            .fix(&markup)
            .contains("\n\\newcommand{\\compactresumelayout}{%\n"));
    }

    #[test]
    fn test_fragment_without_document_untouched() {
        let fragment = "\\compactresumelayout\n\\compactresumelayout\n";
        assert!(!FeatureToggles.matches(fragment));
        assert_eq!(FeatureToggles.fix(fragment), fragment);
    }

    #[test]
    fn test_toggle_fix_is_idempotent() {
        let markup = make_document("", "\\compactresumelayout\n\\compactresumelayout\n");
        let once = repair(&markup);
        assert_eq!(repair(&once), once);
        assert!(!FeatureToggles.matches(&once));
    }
}
