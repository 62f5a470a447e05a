//! Section builders: each turns one part of a `ContentSnapshot` into a moderncv fragment.
//!
//! Plain-text fields (names, titles, organizations, dates, locations) are fully escaped.
//! Prose fields (summary, bullets, descriptions) are partially escaped so inline commands
//! such as `\textbf{..}` survive. Builders return an empty string for empty input; the
//! assembler treats that as "section absent".

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::snapshot::{ContactBlock, EducationEntry, ExperienceEntry, ProjectEntry};
use crate::render::escape::{escape_full, escape_partial, format_phone, format_url, handle_from_url};

const ITEMIZE_OPEN: &str = "\\begin{itemize}[leftmargin=*,labelsep=0.5em,itemsep=0pt]";
const PAGE_BREAK: &str = "\\pagebreak[2]";
const UNCATEGORIZED_SKILLS: &str = "Other";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillsLayout {
    /// `a, b, c`
    #[default]
    Flat,
    /// One `\textbf{Category:} a, b` line per `Category: item` prefix.
    Grouped,
}

// ────────────────────────────────────────────────────────────────────────────
// Identity
// ────────────────────────────────────────────────────────────────────────────

/// moderncv identity commands. Email and phone are always emitted.
pub fn build_preamble(contact: &ContactBlock) -> String {
    let mut lines = Vec::new();

    let (first, last) = contact.name_parts();
    if !first.is_empty() || !last.is_empty() {
        lines.push(format!(
            "\\name{{{}}}{{{}}}",
            escape_full(&first),
            escape_full(&last)
        ));
    }

    let email = ContactBlock::field(&contact.email).unwrap_or_else(|| {
        warn!(field = "email", "Contact block is missing a required field");
        ""
    });
    lines.push(format!("\\email{{{}}}", escape_full(email)));

    let phone = ContactBlock::field(&contact.phone).unwrap_or_else(|| {
        warn!(field = "phone", "Contact block is missing a required field");
        ""
    });
    lines.push(format!("\\phone{{{}}}", escape_full(&format_phone(phone))));

    if let Some(location) = ContactBlock::field(&contact.location) {
        lines.push(format!("\\address{{{}}}", escape_full(location)));
    }
    if let Some(website) = ContactBlock::field(&contact.website) {
        lines.push(format!("\\homepage{{{}}}", format_url(website)));
    }
    if let Some(linkedin) = ContactBlock::field(&contact.linkedin) {
        lines.push(format!(
            "\\social[linkedin]{{{}}}",
            escape_full(&handle_from_url(linkedin))
        ));
    }
    if let Some(github) = ContactBlock::field(&contact.github) {
        lines.push(format!(
            "\\social[github]{{{}}}",
            escape_full(&handle_from_url(github))
        ));
    }

    lines.join("\n")
}

/// Optional centered headline plus the four-column contact table.
///
/// Row 1: phone | email (spanning two columns) | location.
/// Row 2: website | linkedin | github | scholar, each in its own slot. Omitted when no link
/// is present.
pub fn build_header(contact: &ContactBlock) -> String {
    let mut parts = Vec::new();

    if let Some(headline) = ContactBlock::field(&contact.headline) {
        let headline = escape_partial(headline).replace('|', "\\textbar{}");
        parts.push(format!("\\begin{{center}} \\textbf{{{headline}}} \\end{{center}}"));
    }

    let phone = ContactBlock::field(&contact.phone);
    let email = ContactBlock::field(&contact.email);
    let location = ContactBlock::field(&contact.location);

    let mut rows = Vec::new();
    if phone.is_some() || email.is_some() || location.is_some() {
        let phone_cell = phone
            .map(|p| format!("\\enspace\\faMobile\\enspace {}", escape_full(&format_phone(p))))
            .unwrap_or_default();
        let email_cell = format!(
            "\\multicolumn{{2}}{{c}}{{{}}}",
            email
                .map(|e| format!("{{$\\mathbb{{E}}$}}\\enspace {}", escape_full(e)))
                .unwrap_or_default()
        );
        let location_cell = location
            .map(|l| format!("\\enspace\\faHome\\enspace {}", escape_full(l)))
            .unwrap_or_default();
        rows.push(format!("{phone_cell} & {email_cell} & {location_cell} \\\\"));
    }

    let links = [
        ContactBlock::field(&contact.website).map(|w| {
            format!(
                "\\color{{blue}} {{$\\mathbb{{W}}$}} \\href{{{}}}{{Personal Website}}",
                format_url(w)
            )
        }),
        ContactBlock::field(&contact.linkedin).map(|l| {
            let handle = handle_from_url(l);
            format!(
                "\\enspace\\faLinkedin\\enspace \\color{{blue}} \\href{{https://www.linkedin.com/in/{handle}}}{{{}}}",
                escape_full(&handle)
            )
        }),
        ContactBlock::field(&contact.github).map(|g| {
            let handle = handle_from_url(g);
            format!(
                "\\enspace\\faGithub\\enspace \\color{{blue}} \\href{{https://github.com/{handle}}}{{{}}}",
                escape_full(&handle)
            )
        }),
        ContactBlock::field(&contact.google_scholar).map(|s| {
            format!(
                "{{$\\mathbb{{G}}$}}\\enspace \\color{{blue}} \\href{{{}}}{{Google Scholar}}",
                format_url(s)
            )
        }),
    ];
    if links.iter().any(Option::is_some) {
        if !rows.is_empty() {
            rows.push("\\hline".to_string());
        }
        let cells: Vec<String> = links.into_iter().map(Option::unwrap_or_default).collect();
        rows.push(format!("{} \\\\", cells.join(" & ")));
    }

    if !rows.is_empty() {
        parts.push(format!(
            "\\begin{{center}}\\begin{{tabular}}{{ c c c c }}\n{}\n\\end{{tabular}}\\end{{center}}",
            rows.join("\n")
        ));
    }

    parts.join("\n")
}

// ────────────────────────────────────────────────────────────────────────────
// Body sections
// ────────────────────────────────────────────────────────────────────────────

pub fn build_summary(summary: &str) -> String {
    let summary = summary.trim();
    if summary.is_empty() {
        return String::new();
    }
    format!("\\section*{{Summary}}\n{}\n", escape_partial(summary))
}

pub fn build_experience_section(
    experiences: &[ExperienceEntry],
    page_break_every: Option<usize>,
) -> String {
    let entries: Vec<String> = experiences
        .iter()
        .map(|exp| {
            cventry(
                &exp.dates,
                &escape_full(&exp.title),
                &escape_full(&exp.organization),
                &exp.location,
                &itemize(&exp.bullets),
            )
        })
        .collect();
    section("Experience", entries, page_break_every)
}

pub fn build_education_section(education: &[EducationEntry]) -> String {
    let entries: Vec<String> = education
        .iter()
        .map(|edu| {
            let mut details = Vec::new();
            if let Some(gpa) = edu.gpa.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
                details.push(format!("GPA: {}", escape_full(gpa)));
            }
            if let Some(honors) = edu.honors.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
                details.push(escape_full(honors));
            }
            cventry(
                &edu.dates,
                &escape_full(&edu.degree),
                &escape_full(&edu.institution),
                &edu.location,
                &details.join(", "),
            )
        })
        .collect();
    section("Education", entries, None)
}

pub fn build_projects_section(projects: &[ProjectEntry], page_break_every: Option<usize>) -> String {
    let entries: Vec<String> = projects
        .iter()
        .map(|project| {
            let name = escape_full(&project.name);
            let title = match project.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                Some(url) => format!("\\href{{{}}}{{{name}}}", format_url(url)),
                None => name,
            };

            let mut body = Vec::new();
            if let Some(desc) = project
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
            {
                body.push(escape_partial(desc));
            }
            let bullets = itemize(&project.bullets);
            if !bullets.is_empty() {
                body.push(bullets);
            }

            cventry(&project.dates, &title, "", &project.location, &body.join("\n"))
        })
        .collect();
    section("Projects", entries, page_break_every)
}

pub fn build_skills_section(skills: &[String], layout: SkillsLayout) -> String {
    let skills: Vec<&str> = skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if skills.is_empty() {
        return String::new();
    }

    let body = match layout {
        SkillsLayout::Grouped if skills.iter().any(|s| split_category(s).is_some()) => {
            grouped_skills(&skills)
        }
        _ => skills
            .iter()
            .map(|s| escape_full(s))
            .collect::<Vec<_>>()
            .join(", "),
    };

    format!("\\section*{{Skills}}\n\\begin{{sloppypar}}{body}\\end{{sloppypar}}\n")
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

/// `\cventry{dates}{title}{subtitle}{location}{}{body}`. `title` and `subtitle` arrive
/// escaped; `dates` and `location` are escaped here.
fn cventry(dates: &str, title: &str, subtitle: &str, location: &str, body: &str) -> String {
    format!(
        "\\cventry{{{}}}{{{title}}}{{{subtitle}}}{{{}}}{{}}{{{body}}}\n",
        escape_full(dates.trim()),
        escape_full(location.trim())
    )
}

fn itemize(bullets: &[String]) -> String {
    let items: Vec<String> = bullets
        .iter()
        .map(|b| b.trim())
        .filter(|b| !b.is_empty())
        .map(|b| format!("  \\item {}", escape_partial(b)))
        .collect();
    if items.is_empty() {
        return String::new();
    }
    format!("{ITEMIZE_OPEN}\n{}\n\\end{{itemize}}", items.join("\n"))
}

fn section(title: &str, entries: Vec<String>, page_break_every: Option<usize>) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let total = entries.len();
    let mut out = format!("\\section*{{{title}}}\n");
    for (i, entry) in entries.into_iter().enumerate() {
        out.push_str(&entry);
        match page_break_every {
            Some(n) if n > 0 && (i + 1) % n == 0 && i + 1 < total => {
                out.push_str(PAGE_BREAK);
                out.push('\n');
            }
            _ if i + 1 < total => out.push('\n'),
            _ => {}
        }
    }
    out
}

fn split_category(skill: &str) -> Option<(&str, &str)> {
    let (category, item) = skill.split_once(':')?;
    let (category, item) = (category.trim(), item.trim());
    (!category.is_empty() && !item.is_empty()).then_some((category, item))
}

fn grouped_skills(skills: &[&str]) -> String {
    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    let mut other = Vec::new();

    for skill in skills {
        match split_category(skill) {
            Some((category, item)) => match groups.iter_mut().find(|(c, _)| *c == category) {
                Some((_, items)) => items.push(item),
                None => groups.push((category, vec![item])),
            },
            None => other.push(*skill),
        }
    }
    if !other.is_empty() {
        groups.push((UNCATEGORIZED_SKILLS, other));
    }

    groups
        .iter()
        .map(|(category, items)| {
            let items: Vec<String> = items.iter().map(|i| escape_full(i)).collect();
            format!("\\textbf{{{}:}} {}\\\\", escape_full(category), items.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
