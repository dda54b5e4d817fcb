use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{PartitionError, Result};

// Conventional split roles of a YOLO dataset, in on-disk enumeration order
pub const SET_TYPES: &[&str] = &["test", "train", "valid"];

// Paired artifact kinds of every item
pub const ELEMENTS: &[&str] = &["images", "labels"];

pub const IMAGES: &str = "images";
pub const LABELS: &str = "labels";

// Seed of the process-wide shuffle source
pub const DEFAULT_SEED: u64 = 42;

/// One dataset record: the files that share a stem inside one source split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub stem: String,
    pub source_split: String,
    /// Element kind -> file path
    pub files: BTreeMap<String, PathBuf>,
}

impl Item {
    pub fn new(stem: impl Into<String>, source_split: impl Into<String>) -> Self {
        Self {
            stem: stem.into(),
            source_split: source_split.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn file(&self, element: &str) -> Option<&Path> {
        self.files.get(element).map(PathBuf::as_path)
    }
}

/// Files of one element kind inside one split of one part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementEntry {
    pub kind: String,
    pub files: Vec<PathBuf>,
}

/// One split (train/valid/test) of a part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitEntry {
    pub name: String,
    pub elements: Vec<ElementEntry>,
}

impl SplitEntry {
    pub fn element(&self, kind: &str) -> Option<&ElementEntry> {
        self.elements.iter().find(|e| e.kind == kind)
    }
}

/// One numbered shard of the repartitioned dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartEntry {
    pub name: String,
    pub splits: Vec<SplitEntry>,
}

impl PartEntry {
    pub fn split(&self, name: &str) -> Option<&SplitEntry> {
        self.splits.iter().find(|s| s.name == name)
    }

    /// Number of files of `element` across all splits of this part.
    pub fn count(&self, element: &str) -> usize {
        self.splits
            .iter()
            .filter_map(|s| s.element(element))
            .map(|e| e.files.len())
            .sum()
    }
}

/// Logical shape of a partitioned dataset: part -> split -> element -> files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStructure {
    pub parts: Vec<PartEntry>,
}

impl DatasetStructure {
    pub fn part(&self, name: &str) -> Option<&PartEntry> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn files(&self, part: &str, split: &str, element: &str) -> Option<&[PathBuf]> {
        self.part(part)?
            .split(split)?
            .element(element)
            .map(|e| e.files.as_slice())
    }

    pub fn files_mut(
        &mut self,
        part: &str,
        split: &str,
        element: &str,
    ) -> Option<&mut Vec<PathBuf>> {
        self.parts
            .iter_mut()
            .find(|p| p.name == part)?
            .splits
            .iter_mut()
            .find(|s| s.name == split)?
            .elements
            .iter_mut()
            .find(|e| e.kind == element)
            .map(|e| &mut e.files)
    }

    /// Number of files of `element` across the whole structure.
    pub fn count(&self, element: &str) -> usize {
        self.parts.iter().map(|p| p.count(element)).sum()
    }

    /// Every `(part, split, element, files)` cell, in structure order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str, &str, &[PathBuf])> + '_ {
        self.parts.iter().flat_map(|p| {
            p.splits.iter().flat_map(move |s| {
                s.elements.iter().map(move |e| {
                    (
                        p.name.as_str(),
                        s.name.as_str(),
                        e.kind.as_str(),
                        e.files.as_slice(),
                    )
                })
            })
        })
    }
}

/// Build the empty nested structure for parts `1..=parts`.
pub fn build_structure(
    parts: usize,
    splits: &[&str],
    elements: &[&str],
) -> Result<DatasetStructure> {
    if parts == 0 || splits.is_empty() || elements.is_empty() {
        return Err(PartitionError::invalid_argument(format!(
            "dataset structure needs parts, splits and elements (got {} parts, {} splits, {} elements)",
            parts,
            splits.len(),
            elements.len()
        )));
    }

    info!(
        "Building dataset structure with parts: {}, set_types: {:?}, elements: {:?}",
        parts, splits, elements
    );

    let parts = (1..=parts)
        .map(|part| PartEntry {
            name: part.to_string(),
            splits: splits
                .iter()
                .map(|split| SplitEntry {
                    name: split.to_string(),
                    elements: elements
                        .iter()
                        .map(|kind| ElementEntry {
                            kind: kind.to_string(),
                            files: Vec::new(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    Ok(DatasetStructure { parts })
}

// Counts of lines touched by an annotation rewrite
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    pub files: usize,
    pub lines_modified: usize,
    pub total_lines: usize,
}

impl std::ops::Add for RewriteStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            files: self.files + other.files,
            lines_modified: self.lines_modified + other.lines_modified,
            total_lines: self.total_lines + other.total_lines,
        }
    }
}

impl RewriteStats {
    pub fn print_summary(&self) {
        log::info!("=== Relabel Summary ===");
        log::info!("Files rewritten: {}", self.files);
        log::info!("Lines processed: {}", self.total_lines);
        log::info!("Lines modified: {}", self.lines_modified);
    }
}
