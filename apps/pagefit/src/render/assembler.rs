//! Assembler: renders a `ContentSnapshot` into markup through a marker template.
//!
//! # Architecture
//! 1. Every section is built up front by `render::sections`.
//! 2. One regex pass over the template replaces each marker with its section (the first
//!    accepted spelling present wins; every other marker, including unknown ones, is
//!    stripped in the same pass). Inserted content is never rescanned.
//! 3. Non-empty sections whose marker is absent are inserted at the section's anchor.
//! 4. Packages the rendered markup uses but never loads are injected.
//!
//! The only failure is an empty template.

use regex::Captures;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::snapshot::ContentSnapshot;
use crate::render::sections::{
    build_education_section, build_experience_section, build_header, build_preamble,
    build_projects_section, build_skills_section, build_summary, SkillsLayout,
};
use crate::render::template::{ensure_required_packages, marker_regex, marker_text, Anchor, Marker};

const BEGIN_DOCUMENT: &str = "\\begin{document}";
const END_DOCUMENT: &str = "\\end{document}";
const TITLE_COMMAND: &str = "\\makecvtitle";

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("template is missing or empty")]
    TemplateMissing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    /// Insert `\pagebreak[2]` after every N experience/project entries.
    pub page_break_every: Option<usize>,
    pub skills_layout: SkillsLayout,
}

// ────────────────────────────────────────────────────────────────────────────
// Public entry point
// ────────────────────────────────────────────────────────────────────────────

pub fn assemble(
    snapshot: &ContentSnapshot,
    template: &str,
    options: &AssemblyOptions,
) -> Result<String, AssemblyError> {
    if template.trim().is_empty() {
        return Err(AssemblyError::TemplateMissing);
    }

    if snapshot.is_body_empty() {
        debug!("Snapshot has no body content, rendering identity only");
    }

    let sections: Vec<(Marker, String)> = Marker::ALL
        .iter()
        .map(|marker| (*marker, build_section(*marker, snapshot, options)))
        .collect();

    // The spelling each marker will use, if the template carries one.
    let chosen: Vec<Option<&'static str>> = sections
        .iter()
        .map(|(marker, _)| {
            marker
                .names()
                .iter()
                .copied()
                .find(|name| template.contains(&marker_text(name)))
        })
        .collect();

    let mut filled = vec![false; sections.len()];
    let substituted = marker_regex().replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        for (i, (_, content)) in sections.iter().enumerate() {
            if chosen[i] == Some(name) && !filled[i] {
                filled[i] = true;
                return content.clone();
            }
        }
        String::new()
    });
    let mut markup = substituted.into_owned();

    for anchor in [Anchor::BeforeDocument, Anchor::AfterTitle, Anchor::BeforeEndDocument] {
        let block: Vec<&str> = sections
            .iter()
            .zip(&chosen)
            .filter(|((marker, content), name)| {
                name.is_none() && marker.anchor() == anchor && !content.is_empty()
            })
            .map(|((_, content), _)| content.as_str())
            .collect();
        if !block.is_empty() {
            debug!(anchor = ?anchor, sections = block.len(), "Inserting sections without markers");
            markup = insert_at_anchor(&markup, anchor, &block.join("\n"));
        }
    }

    let markup = ensure_required_packages(&markup);

    info!(
        experiences = snapshot.experiences.len(),
        projects = snapshot.projects.len(),
        skills = snapshot.skills.len(),
        education = snapshot.education.len(),
        markup_bytes = markup.len(),
        "Document assembled"
    );

    Ok(markup)
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

fn build_section(marker: Marker, snapshot: &ContentSnapshot, options: &AssemblyOptions) -> String {
    match marker {
        Marker::Preamble => build_preamble(&snapshot.contact),
        Marker::Header => build_header(&snapshot.contact),
        Marker::Summary => build_summary(&snapshot.summary),
        Marker::Experience => {
            build_experience_section(&snapshot.experiences, options.page_break_every)
        }
        Marker::Education => build_education_section(&snapshot.education),
        Marker::Skills => build_skills_section(&snapshot.skills, options.skills_layout),
        Marker::Achievements => build_projects_section(&snapshot.projects, options.page_break_every),
    }
}

fn insert_at_anchor(markup: &str, anchor: Anchor, block: &str) -> String {
    let position = match anchor {
        Anchor::BeforeDocument => markup.find(BEGIN_DOCUMENT),
        Anchor::AfterTitle => markup.find(BEGIN_DOCUMENT).map(|begin| {
            let from = match markup[begin..].find(TITLE_COMMAND) {
                Some(offset) => begin + offset,
                None => begin,
            };
            line_end(markup, from)
        }),
        Anchor::BeforeEndDocument => markup.rfind(END_DOCUMENT),
    };

    match position {
        Some(pos) => {
            let mut out = String::with_capacity(markup.len() + block.len() + 2);
            out.push_str(&markup[..pos]);
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(block);
            if !block.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&markup[pos..]);
            out
        }
        None => {
            let mut out = markup.to_string();
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(block);
            out
        }
    }
}

fn line_end(text: &str, pos: usize) -> usize {
    text[pos..]
        .find('\n')
        .map(|i| pos + i + 1)
        .unwrap_or(text.len())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
