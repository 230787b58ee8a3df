//! Label table for jump resolution

use crate::error::{AssembleError, AssembleResult};
use crate::token::Span;
use std::collections::HashMap;

/// A defined label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    /// Bytecode offset of the next emitted instruction
    pub offset: usize,
    /// Where the label was defined
    pub span: Span,
}

/// `name → offset` mapping built by the first assembler pass
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    labels: HashMap<String, Label>,
}

impl LabelTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a label definition; names must be unique
    pub fn define(&mut self, name: &str, offset: usize, span: Span) -> AssembleResult<()> {
        if let Some(previous) = self.labels.get(name) {
            return Err(AssembleError::DuplicateLabel {
                name: name.to_string(),
                span,
                previous: previous.span,
            });
        }
        self.labels.insert(name.to_string(), Label { offset, span });
        Ok(())
    }

    /// Resolve a reference to a one-byte jump target
    pub fn resolve(&self, name: &str, span: Span) -> AssembleResult<u8> {
        let label = self
            .labels
            .get(name)
            .ok_or_else(|| AssembleError::UndefinedLabel {
                name: name.to_string(),
                span,
            })?;

        u8::try_from(label.offset).map_err(|_| AssembleError::LabelOutOfRange {
            name: name.to_string(),
            offset: label.offset,
            span,
        })
    }

    /// Look up a label
    pub fn get(&self, name: &str) -> Option<&Label> {
        self.labels.get(name)
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no labels are defined
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels sorted by offset, then name
    pub fn sorted(&self) -> Vec<(&str, Label)> {
        let mut entries: Vec<_> = self
            .labels
            .iter()
            .map(|(name, label)| (name.as_str(), *label))
            .collect();
        entries.sort_by(|a, b| a.1.offset.cmp(&b.1.offset).then(a.0.cmp(b.0)));
        entries
    }
}
