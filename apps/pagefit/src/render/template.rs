//! Templates, substitution markers and required-package injection.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Markers
// ────────────────────────────────────────────────────────────────────────────

/// A named insertion point: a full line `% === AUTO:<NAME> ===` in the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Preamble,
    Header,
    Summary,
    Experience,
    Education,
    Skills,
    /// Projects. Templates may also spell it `PROJECTS` or `ADDITIONAL`.
    Achievements,
}

impl Marker {
    pub const ALL: [Marker; 7] = [
        Marker::Preamble,
        Marker::Header,
        Marker::Summary,
        Marker::Experience,
        Marker::Education,
        Marker::Skills,
        Marker::Achievements,
    ];

    /// Marker spellings accepted for this slot, preferred first.
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            Marker::Preamble => &["PREAMBLE"],
            Marker::Header => &["HEADER"],
            Marker::Summary => &["SUMMARY"],
            Marker::Experience => &["EXPERIENCE"],
            Marker::Education => &["EDUCATION"],
            Marker::Skills => &["SKILLS"],
            Marker::Achievements => &["ACHIEVEMENTS", "PROJECTS", "ADDITIONAL"],
        }
    }

    /// Where the section goes when the template has no marker for it.
    pub fn anchor(&self) -> Anchor {
        match self {
            Marker::Preamble => Anchor::BeforeDocument,
            Marker::Header | Marker::Summary => Anchor::AfterTitle,
            _ => Anchor::BeforeEndDocument,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    BeforeDocument,
    AfterTitle,
    BeforeEndDocument,
}

pub fn marker_text(name: &str) -> String {
    format!("% === AUTO:{name} ===")
}

/// Matches any marker line body; group 1 is the marker name.
pub fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"% === AUTO:(\w+) ===").expect("valid marker regex"))
}

// ────────────────────────────────────────────────────────────────────────────
// Default template
// ────────────────────────────────────────────────────────────────────────────

/// Built-in moderncv template used when no template file is configured.
/// Already carries the compact-layout toggle, so the repair pass leaves it alone.
pub const DEFAULT_TEMPLATE: &str = r"\documentclass[11pt,letterpaper,sans]{moderncv}
\moderncvstyle{banking}
\moderncvcolor{black}
\nopagenumbers{}
\usepackage[utf8]{inputenc}
\usepackage[scale=0.915]{geometry}
\usepackage{ragged2e}
\usepackage{multicol}
\usepackage{enumitem}
\usepackage{xcolor}
\usepackage{hyperref}
\usepackage{fontawesome5}
\usepackage{amssymb}

\newif\ifcompactresume
\compactresumefalse
\newcommand{\compactresumelayout}{%
  \compactresumetrue
  \setlength{\itemsep}{0.2em}
  \setlength{\parskip}{0.15em}
  \setlist[itemize]{leftmargin=*, labelsep=0.4em, topsep=0.1em, itemsep=0.1em, parsep=0em}
  \setlist[enumerate]{leftmargin=*, labelsep=0.4em, topsep=0.1em, itemsep=0.1em, parsep=0em}
}

% === AUTO:PREAMBLE ===

\begin{document}
\compactresumelayout
\makecvtitle

% === AUTO:HEADER ===

% === AUTO:SUMMARY ===

% === AUTO:EXPERIENCE ===

% === AUTO:EDUCATION ===

% === AUTO:SKILLS ===

% === AUTO:ACHIEVEMENTS ===

\end{document}
";

// ────────────────────────────────────────────────────────────────────────────
// Required packages
// ────────────────────────────────────────────────────────────────────────────

struct PackageRule {
    package: &'static str,
    /// Usage that requires the package.
    used: fn() -> &'static Regex,
}

fn mathbb_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\mathbb\{").expect("valid mathbb regex"))
}

fn fontawesome_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\fa[A-Z][A-Za-z]*").expect("valid icon regex"))
}

fn usepackage_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*\\usepackage(?:\[[^\]]*\])?\{([^}]*)\}")
            .expect("valid usepackage regex")
    })
}

const PACKAGE_RULES: [PackageRule; 2] = [
    PackageRule {
        package: "amssymb",
        used: mathbb_regex,
    },
    PackageRule {
        package: "fontawesome5",
        used: fontawesome_regex,
    },
];

/// True if `package` is loaded by an uncommented `\usepackage` line.
pub fn has_package(markup: &str, package: &str) -> bool {
    usepackage_regex().captures_iter(markup).any(|caps| {
        caps[1]
            .split(',')
            .any(|p| p.trim() == package || (package == "fontawesome5" && p.trim() == "fontawesome"))
    })
}

/// Adds `\usepackage` lines for packages the markup uses but never loads.
/// Inserted after the last `\usepackage` line, else after `\documentclass`.
pub fn ensure_required_packages(markup: &str) -> String {
    let missing: Vec<&str> = PACKAGE_RULES
        .iter()
        .filter(|rule| (rule.used)().is_match(markup) && !has_package(markup, rule.package))
        .map(|rule| rule.package)
        .collect();
    if missing.is_empty() {
        return markup.to_string();
    }
    debug!(packages = ?missing, "Injecting required packages");

    let block: String = missing
        .iter()
        .map(|p| format!("\\usepackage{{{p}}}\n"))
        .collect();

    let insert_at = usepackage_regex()
        .find_iter(markup)
        .last()
        .map(|m| line_end(markup, m.end()))
        .or_else(|| markup.find("\\documentclass").map(|pos| line_end(markup, pos)));

    match insert_at {
        Some(pos) => {
            let mut out = String::with_capacity(markup.len() + block.len() + 1);
            out.push_str(&markup[..pos]);
            if !markup[..pos].ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block);
            out.push_str(&markup[pos..]);
            out
        }
        None => format!("{block}{markup}"),
    }
}

/// Byte offset just past the newline ending the line containing `pos`.
fn line_end(text: &str, pos: usize) -> usize {
    text[pos..]
        .find('\n')
        .map(|i| pos + i + 1)
        .unwrap_or(text.len())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
