//! Budgeted, deduplicated, labelled context for one query.

use std::collections::HashMap;
use std::fmt::Write;

use crate::passage::Passage;

/// One admitted passage and the label the model cites it by.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    pub passage: Passage,
    /// `[1]`, `[2]`, ... in admission order.
    pub label: String,
    /// Text was cut to fit the budget.
    pub truncated: bool,
}

/// Context admitted for a single query. `total_size` counts characters of passage text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBlock {
    pub entries: Vec<ContextEntry>,
    pub total_size: usize,
    /// `section_id` to display label.
    pub citation_index: HashMap<String, String>,
}

impl ContextBlock {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entry cited by `label`, e.g. `"[2]"`.
    #[must_use]
    pub fn entry_by_label(&self, label: &str) -> Option<&ContextEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    /// Labelled text block for the prompt.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = write!(out, "{} {}", entry.label, entry.passage.section_id);
            if let Some(url) = &entry.passage.source_url {
                let _ = write!(out, " ({url})");
            }
            if entry.truncated {
                out.push_str(" (truncated)");
            }
            out.push('\n');
            out.push_str(&entry.passage.text);
            out.push_str("\n\n");
        }
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        out
    }
}

/// Packs ranked passages into a [`ContextBlock`] under a character budget.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    budget: usize,
}

impl ContextAssembler {
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Admit whole passages in the given order until the next one would overflow.
    ///
    /// Repeated `section_id`s collapse to their best-scored copy first. If the
    /// first candidate alone exceeds the budget it is cut to fit and flagged.
    #[must_use]
    pub fn assemble(&self, passages: &[Passage]) -> ContextBlock {
        let mut block = ContextBlock::default();
        if self.budget == 0 {
            return block;
        }

        for passage in dedupe_by_section(passages) {
            let size = passage.text.chars().count();
            let label = format!("[{}]", block.entries.len() + 1);

            if block.total_size + size <= self.budget {
                block.total_size += size;
                block.citation_index.insert(passage.section_id.clone(), label.clone());
                block.entries.push(ContextEntry {
                    passage: passage.clone(),
                    label,
                    truncated: false,
                });
                continue;
            }

            if block.entries.is_empty() {
                let mut cut = passage.clone();
                cut.text = cut.text.chars().take(self.budget).collect();
                block.total_size = self.budget;
                block.citation_index.insert(cut.section_id.clone(), label.clone());
                block.entries.push(ContextEntry {
                    passage: cut,
                    label,
                    truncated: true,
                });
                tracing::debug!(
                    section_id = %passage.section_id,
                    chars = size,
                    budget = self.budget,
                    "top passage truncated to budget"
                );
            }
            break;
        }

        block
    }
}

/// Keep the highest-scored copy of each section at the position of its first
/// appearance. Equal scores keep the earliest copy.
fn dedupe_by_section(passages: &[Passage]) -> Vec<&Passage> {
    let mut slot: HashMap<&str, usize> = HashMap::new();
    let mut kept: Vec<&Passage> = Vec::with_capacity(passages.len());
    for p in passages {
        match slot.get(p.section_id.as_str()) {
            Some(&i) => {
                if p.score > kept[i].score {
                    kept[i] = p;
                }
            }
            None => {
                slot.insert(p.section_id.as_str(), kept.len());
                kept.push(p);
            }
        }
    }
    kept
}
