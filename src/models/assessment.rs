//! Structured ethics assessment and its extraction from the model's
//! markdown narrative.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*\s*\[?([^*\]]+?)\]?\s*\*\*").expect("static bold pattern"));

static USC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+\s+U\.\s?S\.\s?C\.?\s*(?:§+\s*)?\d+[A-Za-z0-9\-]*(?:\([A-Za-z0-9]+\))*")
        .expect("static U.S.C. pattern")
});

static CFR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b\d+\s+C\.\s?F\.\s?R\.?\s*(?:§+\s*|[Pp]art\s+)?\d+(?:\.\d+)?(?:\([A-Za-z0-9]+\))*",
    )
    .expect("static C.F.R. pattern")
});

static INLINE_SEVERITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)severity(?:\s+level)?").expect("static inline severity pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    NoViolation,
    Minor,
    Moderate,
    Serious,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::NoViolation,
        Severity::Minor,
        Severity::Moderate,
        Severity::Serious,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::NoViolation => "no_violation",
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Serious => "serious",
        }
    }

    /// Reads a severity label such as `Moderate`, `[Minor]` or
    /// `No Violation - gift is within the de minimis exception`.
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.to_lowercase();
        if lower.contains("no violation") || lower.contains("no_violation") {
            Some(Severity::NoViolation)
        } else if lower.contains("serious") {
            Some(Severity::Serious)
        } else if lower.contains("moderate") {
            Some(Severity::Moderate)
        } else if lower.contains("minor") {
            Some(Severity::Minor)
        } else {
            None
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedAspects {
    pub legal_foundation: String,
    pub potential_penalties: String,
    pub immediate_actions: String,
    pub reporting_requirements: String,
    pub prevention_strategy: String,
    pub additional_context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicsAssessment {
    pub direct_answer: String,
    pub severity: Severity,
    pub citations: Vec<String>,
    pub detailed_aspects: DetailedAspects,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssessmentParseError {
    #[error("assessment narrative is empty")]
    Empty,
    #[error("assessment narrative has no recognizable severity level")]
    MissingSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    DirectAnswer,
    Severity,
    LegalFoundation,
    PotentialPenalties,
    ImmediateActions,
    ReportingRequirements,
    PreventionStrategy,
    AdditionalContext,
}

impl Section {
    fn from_heading(heading: &str) -> Option<Self> {
        let h = heading.to_lowercase();
        let h = h.trim();
        if h.starts_with("direct answer") {
            Some(Section::DirectAnswer)
        } else if h.starts_with("severity") {
            Some(Section::Severity)
        } else if h.starts_with("legal foundation") {
            Some(Section::LegalFoundation)
        } else if h.starts_with("potential penalties") || h.starts_with("penalties") {
            Some(Section::PotentialPenalties)
        } else if h.starts_with("immediate action") {
            Some(Section::ImmediateActions)
        } else if h.starts_with("reporting requirement") {
            Some(Section::ReportingRequirements)
        } else if h.starts_with("prevention") {
            Some(Section::PreventionStrategy)
        } else if h.starts_with("additional context") {
            Some(Section::AdditionalContext)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct Sections {
    direct_answer: String,
    severity: String,
    legal_foundation: String,
    potential_penalties: String,
    immediate_actions: String,
    reporting_requirements: String,
    prevention_strategy: String,
    additional_context: String,
}

impl Sections {
    fn slot(&mut self, section: Section) -> &mut String {
        match section {
            Section::DirectAnswer => &mut self.direct_answer,
            Section::Severity => &mut self.severity,
            Section::LegalFoundation => &mut self.legal_foundation,
            Section::PotentialPenalties => &mut self.potential_penalties,
            Section::ImmediateActions => &mut self.immediate_actions,
            Section::ReportingRequirements => &mut self.reporting_requirements,
            Section::PreventionStrategy => &mut self.prevention_strategy,
            Section::AdditionalContext => &mut self.additional_context,
        }
    }

    fn split(narrative: &str) -> Self {
        let mut sections = Sections::default();
        let mut current: Option<Section> = None;

        for line in narrative.lines() {
            let trimmed = line.trim_start();
            if let Some(heading) = trimmed.strip_prefix("##") {
                let heading = heading.trim_start_matches('#');
                current = Section::from_heading(heading);
                continue;
            }
            if trimmed.starts_with("# ") {
                current = None;
                continue;
            }
            if let Some(section) = current {
                let slot = sections.slot(section);
                slot.push_str(line);
                slot.push('\n');
            }
        }

        for section in [
            Section::DirectAnswer,
            Section::Severity,
            Section::LegalFoundation,
            Section::PotentialPenalties,
            Section::ImmediateActions,
            Section::ReportingRequirements,
            Section::PreventionStrategy,
            Section::AdditionalContext,
        ] {
            let slot = sections.slot(section);
            *slot = slot.trim().to_string();
        }
        sections
    }
}

impl EthicsAssessment {
    /// Extracts the structured assessment from the `# Ethics Assessment`
    /// markdown the assessment prompt asks for.
    pub fn from_narrative(narrative: &str) -> Result<Self, AssessmentParseError> {
        if narrative.trim().is_empty() {
            return Err(AssessmentParseError::Empty);
        }

        let sections = Sections::split(narrative);
        let severity = parse_severity(&sections.severity)
            .or_else(|| parse_inline_severity(narrative))
            .ok_or(AssessmentParseError::MissingSeverity)?;

        let direct_answer = if sections.direct_answer.is_empty() {
            first_paragraph(narrative)
        } else {
            sections.direct_answer.clone()
        };

        let mut citations = extract_citations(narrative);
        if citations.is_empty() {
            citations = bullet_items(&sections.legal_foundation);
        }

        let mut next_steps = bullet_items(&sections.immediate_actions);
        if next_steps.is_empty() && !sections.immediate_actions.is_empty() {
            next_steps.push(sections.immediate_actions.clone());
        }

        Ok(Self {
            direct_answer,
            severity,
            citations,
            detailed_aspects: DetailedAspects {
                legal_foundation: sections.legal_foundation,
                potential_penalties: sections.potential_penalties,
                immediate_actions: sections.immediate_actions,
                reporting_requirements: sections.reporting_requirements,
                prevention_strategy: sections.prevention_strategy,
                additional_context: sections.additional_context,
            },
            next_steps,
        })
    }
}

fn parse_severity(section: &str) -> Option<Severity> {
    if section.is_empty() {
        return None;
    }
    if let Some(caps) = BOLD_RE.captures(section) {
        if let Some(severity) = caps.get(1).and_then(|m| Severity::from_label(m.as_str())) {
            return Some(severity);
        }
    }
    section.lines().next().and_then(Severity::from_label)
}

/// Fallback for narratives that state `Severity: Moderate` without the
/// dedicated heading.
fn parse_inline_severity(narrative: &str) -> Option<Severity> {
    narrative.lines().find_map(|line| {
        let label = INLINE_SEVERITY_RE.find(line)?;
        let rest = line[label.end()..]
            .trim_start_matches(|c: char| c == ':' || c == '*' || c.is_whitespace());
        Severity::from_label(rest)
    })
}

pub fn extract_citations(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = USC_RE
        .find_iter(text)
        .chain(CFR_RE.find_iter(text))
        .map(|m| (m.start(), normalize_whitespace(m.as_str())))
        .collect();
    found.sort_by_key(|(start, _)| *start);

    let mut citations: Vec<String> = Vec::new();
    for (_, citation) in found {
        if !citations.contains(&citation) {
            citations.push(citation);
        }
    }
    citations
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn bullet_items(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let item = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| {
                    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
                    if digits > 0 {
                        line[digits..].strip_prefix(". ")
                    } else {
                        None
                    }
                })?;
            let item = item.trim().trim_matches('*').trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect()
}

fn first_paragraph(narrative: &str) -> String {
    narrative
        .split("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty() && !p.starts_with('#'))
        .unwrap_or_default()
        .to_string()
}
