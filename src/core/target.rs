//! Pipeline targets and selector resolution

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// One pipeline that can be launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTarget {
    /// Label of this target within a batch
    pub name: String,

    /// Deep link to the pipeline's console page
    pub entry_url: String,

    /// Config group (or suite) the target was declared in
    #[serde(default)]
    pub group: Option<String>,
}

impl PipelineTarget {
    pub fn new(name: impl Into<String>, entry_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_url: entry_url.into(),
            group: None,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// `group/name` for grouped targets, `name` otherwise
    pub fn qualified_name(&self) -> String {
        match &self.group {
            Some(group) => format!("{}/{}", group, self.name),
            None => self.name.clone(),
        }
    }
}

/// Outcome of resolving user selectors against the configured catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSelection {
    /// Targets to launch, in selector order
    pub targets: Vec<PipelineTarget>,

    /// Selectors that did not match any configured pipeline
    pub unmatched: Vec<String>,
}

impl TargetSelection {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Resolve selectors against a catalog
///
/// A selector is either `group/name` or a bare `name`; a bare name matches the
/// first catalog entry with that name. The resolved target is labelled with
/// the selector as written. Selectors that reach an entry URL already
/// selected are dropped, so one pipeline never runs twice in a batch.
pub fn resolve_targets(catalog: &[PipelineTarget], selectors: &[String]) -> TargetSelection {
    let mut selection = TargetSelection::default();
    let mut seen = HashSet::new();
    let mut launched = HashSet::new();

    for selector in selectors {
        let selector = selector.trim();
        if selector.is_empty() || !seen.insert(selector.to_string()) {
            continue;
        }

        let found = match selector.split_once('/') {
            Some((group, name)) => catalog
                .iter()
                .find(|t| t.group.as_deref() == Some(group) && t.name == name),
            None => catalog.iter().find(|t| t.name == selector),
        };

        match found {
            Some(entry) if launched.insert(entry.entry_url.as_str()) => {
                selection.targets.push(PipelineTarget {
                    name: selector.to_string(),
                    entry_url: entry.entry_url.clone(),
                    group: entry.group.clone(),
                })
            }
            Some(entry) => debug!(
                "Selector '{}' names {} again, skipping",
                selector, entry.entry_url
            ),
            None => selection.unmatched.push(selector.to_string()),
        }
    }

    selection
}

/// Select every target of one group, labelled `group/name`
pub fn resolve_group(catalog: &[PipelineTarget], group: &str) -> TargetSelection {
    let targets = qualified_unique(catalog.iter().filter(|t| t.group.as_deref() == Some(group)));

    let unmatched = if targets.is_empty() {
        vec![group.to_string()]
    } else {
        Vec::new()
    };

    TargetSelection { targets, unmatched }
}

/// Select every configured target, labelled by qualified name
pub fn resolve_all(catalog: &[PipelineTarget]) -> TargetSelection {
    TargetSelection {
        targets: qualified_unique(catalog.iter()),
        unmatched: Vec::new(),
    }
}

/// Label entries by qualified name, keeping the first entry per URL
fn qualified_unique<'a>(entries: impl Iterator<Item = &'a PipelineTarget>) -> Vec<PipelineTarget> {
    let mut launched = HashSet::new();
    entries
        .filter(|t| launched.insert(t.entry_url.as_str()))
        .map(|t| PipelineTarget {
            name: t.qualified_name(),
            entry_url: t.entry_url.clone(),
            group: t.group.clone(),
        })
        .collect()
}
