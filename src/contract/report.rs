// Research report and citation resolution

use super::ReportDraft;
use crate::knowledge_base::{Footnote, KnowledgeBase};
use crate::models::DocumentId;
use crate::types::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Final markers in a resolved body: `[^3]`.
static FOOTNOTE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\^(\d+)\]").expect("valid footnote regex"));

/// Markers the writer emits against the source labels it was shown: `[^S2]`.
static DRAFT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\^([^\]\s]+)\]").expect("valid draft marker regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub title: String,
    pub body: String,
    pub footnotes: Vec<Footnote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caveats: Vec<String>,
}

impl ResearchReport {
    /// Citation indices in order of first appearance in the body.
    pub fn markers(&self) -> Vec<u32> {
        let mut seen = BTreeSet::new();
        FOOTNOTE_MARKER
            .captures_iter(&self.body)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .filter(|i| seen.insert(*i))
            .collect()
    }

    /// Body markers and footnote list must match one-to-one.
    pub fn check_citations(&self) -> AppResult<()> {
        let in_body: BTreeSet<u32> = self.markers().into_iter().collect();
        let mut listed = BTreeSet::new();
        for note in &self.footnotes {
            if !listed.insert(note.index) {
                return Err(AppError::SchemaViolation(format!(
                    "footnote [^{}] listed twice",
                    note.index
                )));
            }
        }

        if let Some(dangling) = in_body.difference(&listed).next() {
            return Err(AppError::SchemaViolation(format!(
                "marker [^{}] has no footnote",
                dangling
            )));
        }
        if let Some(orphan) = listed.difference(&in_body).next() {
            return Err(AppError::SchemaViolation(format!(
                "footnote [^{}] is never referenced",
                orphan
            )));
        }
        Ok(())
    }

    pub fn to_markdown(&self) -> String {
        let mut output = format!("# {}\n\n{}\n", self.title, self.body.trim_end());

        if !self.caveats.is_empty() {
            output.push_str("\n> **Caveats**\n");
            for caveat in &self.caveats {
                output.push_str(&format!("> - {}\n", caveat));
            }
        }

        if !self.footnotes.is_empty() {
            output.push_str("\nNotes:\n");
            for note in &self.footnotes {
                output.push_str(&format!("{}\n", note));
            }
        }
        output
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().to_uppercase()
}

/// Turns a writer draft into a report by citing every referenced source
/// through the knowledge base.
///
/// `labels` maps the labels shown to the writer (`S1`, `S2`, ...) to document
/// identities. All markers are checked before any citation is allocated, so a
/// rejected draft leaves the citation index untouched.
pub fn resolve_draft(
    draft: &ReportDraft,
    labels: &HashMap<String, DocumentId>,
    kb: &mut KnowledgeBase,
) -> AppResult<ResearchReport> {
    let labels: HashMap<String, &DocumentId> =
        labels.iter().map(|(k, v)| (normalize_label(k), v)).collect();

    let mut order: Vec<String> = Vec::new();
    for caps in DRAFT_MARKER.captures_iter(&draft.body) {
        let key = normalize_label(&caps[1]);
        if !labels.contains_key(&key) {
            return Err(AppError::SchemaViolation(format!(
                "citation marker [^{}] does not match any provided source",
                &caps[1]
            )));
        }
        if !order.contains(&key) {
            order.push(key);
        }
    }

    if order.is_empty() {
        return Err(AppError::SchemaViolation(
            "report body cites no sources".to_string(),
        ));
    }

    let mut assigned: HashMap<String, u32> = HashMap::new();
    for key in &order {
        let excerpt = draft
            .citations
            .iter()
            .find(|c| normalize_label(&c.source) == *key)
            .map(|c| c.excerpt.as_str())
            .unwrap_or("");
        let index = kb.cite(labels[key], excerpt)?;
        assigned.insert(key.clone(), index);
    }

    let body = DRAFT_MARKER
        .replace_all(&draft.body, |caps: &Captures| {
            match assigned.get(&normalize_label(&caps[1])) {
                Some(index) => format!("[^{}]", index),
                None => caps[0].to_string(),
            }
        })
        .into_owned();

    let indices: Vec<u32> = assigned.values().copied().collect();
    let footnotes = kb.render_footnotes_for(&indices)?;

    let report = ResearchReport {
        title: draft.title.trim().to_string(),
        body,
        footnotes,
        caveats: Vec::new(),
    };
    report.check_citations()?;
    Ok(report)
}

/// Full check of a finished report against the knowledge base it was built from.
pub fn validate_report(report: &ResearchReport, kb: &KnowledgeBase) -> AppResult<()> {
    if report.body.trim().is_empty() {
        return Err(AppError::SchemaViolation("report body is empty".to_string()));
    }
    report.check_citations()?;

    for note in &report.footnotes {
        match kb.citation(note.index) {
            Some(citation) if citation.link == note.link => {}
            Some(_) => {
                return Err(AppError::SchemaViolation(format!(
                    "footnote [^{}] points at a different source",
                    note.index
                )))
            }
            None => {
                return Err(AppError::SchemaViolation(format!(
                    "footnote [^{}] is not in the citation index",
                    note.index
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::DraftCitation;
    use crate::models::{Document, SourceType};

    fn kb_with(urls: &[&str]) -> (KnowledgeBase, HashMap<String, DocumentId>) {
        let mut kb = KnowledgeBase::new();
        let mut labels = HashMap::new();
        for (i, url) in urls.iter().enumerate() {
            let doc = Document::from_url(url, format!("Doc {}", i + 1), "text", SourceType::Webpage);
            let id = kb.add_or_update_document(doc).id.clone();
            labels.insert(format!("S{}", i + 1), id);
        }
        (kb, labels)
    }

    fn draft(body: &str) -> ReportDraft {
        ReportDraft {
            title: "Acme".to_string(),
            body: body.to_string(),
            citations: vec![DraftCitation {
                source: "s2".to_string(),
                excerpt: "Revenue grew 12%".to_string(),
            }],
        }
    }

    #[test]
    fn test_resolve_assigns_indices_by_first_appearance() {
        let (mut kb, labels) = kb_with(&["https://a.com", "https://b.com", "https://c.com"]);
        let report = resolve_draft(
            &draft("Revenue grew[^S2]. Margins fell[^S3]. Growth again[^S2]."),
            &labels,
            &mut kb,
        )
        .unwrap();

        assert_eq!(report.body, "Revenue grew[^1]. Margins fell[^2]. Growth again[^1].");
        assert_eq!(report.markers(), vec![1, 2]);
        assert_eq!(report.footnotes.len(), 2);
        assert_eq!(report.footnotes[0].excerpt, "Revenue grew 12%");
        assert_eq!(report.footnotes[0].link, "https://b.com");
        // no excerpt supplied for S3: title is used
        assert_eq!(report.footnotes[1].excerpt, "Doc 3");
        validate_report(&report, &kb).unwrap();
    }

    #[test]
    fn test_resolve_reuses_indices_across_drafts() {
        let (mut kb, labels) = kb_with(&["https://a.com", "https://b.com"]);
        resolve_draft(&draft("First[^S2]."), &labels, &mut kb).unwrap();
        let second = resolve_draft(&draft("Other[^S1] and[^S2]."), &labels, &mut kb).unwrap();

        assert_eq!(second.body, "Other[^2] and[^1].");
        assert_eq!(second.footnotes.iter().map(|f| f.index).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_dangling_marker_rejected_without_allocating() {
        let (mut kb, labels) = kb_with(&["https://a.com"]);
        let err = resolve_draft(&draft("Good[^S1] bad[^S9]."), &labels, &mut kb).unwrap_err();
        assert!(matches!(err, AppError::SchemaViolation(_)));
        assert_eq!(kb.citation_count(), 0);
    }

    #[test]
    fn test_uncited_draft_rejected() {
        let (mut kb, labels) = kb_with(&["https://a.com"]);
        assert!(resolve_draft(&draft("No sources here."), &labels, &mut kb).is_err());
    }

    #[test]
    fn test_check_citations_detects_orphans() {
        let report = ResearchReport {
            title: "T".to_string(),
            body: "Claim[^1].".to_string(),
            footnotes: vec![
                Footnote { index: 1, excerpt: "a".into(), link: "https://a.com".into(), title: "A".into() },
                Footnote { index: 2, excerpt: "b".into(), link: "https://b.com".into(), title: "B".into() },
            ],
            caveats: vec![],
        };
        assert!(report.check_citations().is_err());
    }

    #[test]
    fn test_markdown_rendering() {
        let report = ResearchReport {
            title: "Acme outlook".to_string(),
            body: "Claim[^1].".to_string(),
            footnotes: vec![Footnote {
                index: 1,
                excerpt: "Q3 filing".into(),
                link: "https://a.com".into(),
                title: "A".into(),
            }],
            caveats: vec!["Only one source".to_string()],
        };
        let md = report.to_markdown();
        assert!(md.starts_with("# Acme outlook\n\nClaim[^1].\n"));
        assert!(md.contains("> - Only one source"));
        assert!(md.ends_with("Notes:\n[^1]: Q3 filing [link](https://a.com)\n"));
    }
}
