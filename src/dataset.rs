use indicatif::ProgressBar;
use log::{info, warn};
use rand::RngCore;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, PartitionError, Result};
use crate::io::{collect_source_groups, copy_items, create_part_data_yaml, materialize, SourceGroup, Storage};
use crate::ratios::{ratios_from_parts, size_ratios_for_split, validate_ratios};
use crate::split::{split_by_named_ratios, split_by_ratios, NamedRatios};
use crate::taxonomy::Taxonomy;
use crate::types::{build_structure, DatasetStructure, Item, ELEMENTS, IMAGES, LABELS, SET_TYPES};
use crate::utils::{create_io_thread_pool, create_progress_bar};

/// Options shared by both partition entry points.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Proportions of the train/valid/test splits inside every part.
    pub split_ratios: NamedRatios,
    /// Destination root; `None` computes the logical structure only.
    pub dest: Option<PathBuf>,
    /// Fail when an image has no label (or the reverse) instead of carrying
    /// it as a single-element item.
    pub strict_pairing: bool,
    /// Copy workers; `0` lets rayon decide.
    pub workers: usize,
    pub progress: bool,
    /// When set, every written part gets a `data.yaml` with these classes.
    pub data_yaml: Option<Taxonomy>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            split_ratios: NamedRatios::default(),
            dest: None,
            strict_pairing: false,
            workers: 0,
            progress: false,
            data_yaml: None,
        }
    }
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            PartitionError::invalid_argument(format!("path has no UTF-8 file stem: {:?}", path))
        })
}

/// Pair the files of every source split by stem.
///
/// Items come out grouped by source split, then sorted by stem. Without
/// `strict`, an image lacking a label (or a label lacking an image) becomes
/// an item with a single element.
pub fn pair_items(groups: &[SourceGroup], strict: bool) -> Result<Vec<Item>> {
    if strict {
        let images: usize = groups.iter().map(|g| g.files(IMAGES).len()).sum();
        let labels: usize = groups.iter().map(|g| g.files(LABELS).len()).sum();
        if images != labels {
            return Err(PartitionError::CorrespondenceViolation(format!(
                "{} images but {} labels",
                images, labels
            )));
        }
    }

    let mut items = Vec::new();
    for group in groups {
        let mut by_stem: BTreeMap<String, Item> = BTreeMap::new();
        let mut duplicates = Vec::new();
        for (element, files) in &group.files {
            for path in files {
                let stem = file_stem(path)?;
                let item = by_stem
                    .entry(stem.clone())
                    .or_insert_with(|| Item::new(stem.clone(), group.split.clone()));
                if item.files.contains_key(element) {
                    if strict {
                        return Err(PartitionError::CorrespondenceViolation(format!(
                            "several {} share the stem '{}' in split '{}'",
                            element, stem, group.split
                        )));
                    }
                    let mut extra = Item::new(stem, group.split.clone());
                    extra.files.insert(element.clone(), path.clone());
                    duplicates.push(extra);
                } else {
                    item.files.insert(element.clone(), path.clone());
                }
            }
        }

        let unpaired = by_stem
            .values()
            .filter(|item| item.files.len() < group.files.len())
            .count();
        if unpaired > 0 {
            if strict {
                let item = by_stem
                    .values()
                    .find(|item| item.files.len() < group.files.len());
                return Err(PartitionError::CorrespondenceViolation(format!(
                    "'{}' in split '{}' is missing one of {:?}",
                    item.map(|i| i.stem.as_str()).unwrap_or_default(),
                    group.split,
                    group.files.keys().collect::<Vec<_>>()
                )));
            }
            warn!(
                "{} items in split '{}' lack an image or a label",
                unpaired, group.split
            );
        }

        items.extend(by_stem.into_values());
        items.extend(duplicates);
    }
    Ok(items)
}

fn check_split_names(config: &PartitionConfig) -> Result<()> {
    if let Some(unknown) = config.split_ratios.names().find(|n| !SET_TYPES.contains(n)) {
        return Err(PartitionError::invalid_argument(format!(
            "unknown split '{}', expected one of {:?}",
            unknown, SET_TYPES
        )));
    }
    validate_ratios(&config.split_ratios.ratios())
}

// Canonical form of a path that may not exist yet: the deepest existing
// ancestor is canonicalized and the missing tail re-appended.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().at(path)?.join(path)
    };
    let mut missing = Vec::new();
    let mut existing = absolute.as_path();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return Ok(missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part)));
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
}

/// Refuse a destination whose rebuild would delete source files: the source
/// itself, one of its ancestors, or anything inside a source split.
fn check_destination(source: &Path, dest: &Path) -> Result<()> {
    let source = fs::canonicalize(source).at(source)?;
    let dest = resolve_path(dest)?;
    let overlaps = source.starts_with(&dest)
        || SET_TYPES
            .iter()
            .any(|split| dest.starts_with(source.join(split)));
    if overlaps {
        return Err(PartitionError::invalid_argument(format!(
            "destination {:?} would overwrite the source dataset {:?}",
            dest, source
        )));
    }
    Ok(())
}

fn load_items(source: &Path, config: &PartitionConfig) -> Result<Vec<Item>> {
    check_split_names(config)?;
    let groups = collect_source_groups(source, SET_TYPES, ELEMENTS)?;
    if groups.iter().all(|g| g.files(IMAGES).is_empty()) {
        return Err(PartitionError::EmptyDataset(source.to_path_buf()));
    }
    if let Some(dest) = &config.dest {
        check_destination(source, dest)?;
    }
    pair_items(&groups, config.strict_pairing)
}

/// Repartition `source` into `n_parts` parts, each split into the configured
/// train/valid/test proportions.
///
/// With `rng` set, items are shuffled once before sharding and once more
/// inside every part; images and labels always move together. With
/// `config.dest` set, the destination is rebuilt from scratch and populated.
pub fn partition_by_n_parts(
    source: &Path,
    n_parts: usize,
    config: &PartitionConfig,
    storage: &dyn Storage,
    rng: Option<&mut (dyn RngCore + '_)>,
) -> Result<DatasetStructure> {
    info!("Partitioning dataset from {:?} into {} parts", source, n_parts);
    let items = load_items(source, config)?;
    let ratios = ratios_from_parts(n_parts)?;
    run_partition(items, &ratios, config, storage, rng)
}

/// Repartition `source` into as many parts as needed to hold at most
/// `max_items_per_part` items each; the last part takes the remainder.
pub fn partition_by_size(
    source: &Path,
    max_items_per_part: usize,
    config: &PartitionConfig,
    storage: &dyn Storage,
    rng: Option<&mut (dyn RngCore + '_)>,
) -> Result<DatasetStructure> {
    let items = load_items(source, config)?;
    let ratios = size_ratios_for_split(items.len(), max_items_per_part)?;
    info!(
        "Partitioning dataset from {:?} into {} parts of {} elements.",
        source,
        ratios.len(),
        max_items_per_part
    );
    run_partition(items, &ratios, config, storage, rng)
}

fn run_partition(
    items: Vec<Item>,
    shard_ratios: &[f64],
    config: &PartitionConfig,
    storage: &dyn Storage,
    mut rng: Option<&mut (dyn RngCore + '_)>,
) -> Result<DatasetStructure> {
    let n_parts = shard_ratios.len();
    let mut structure = build_structure(n_parts, SET_TYPES, ELEMENTS)?;

    if let Some(dest) = &config.dest {
        materialize(dest, n_parts)?;
    }

    // One permutation over items, so every element kind is cut identically
    let shards = split_by_ratios(items, shard_ratios, rng.as_deref_mut())?;
    for (index, shard) in shards.into_iter().enumerate() {
        let part = (index + 1).to_string();
        for (split, members) in
            split_by_named_ratios(shard, &config.split_ratios, rng.as_deref_mut())?
        {
            for element in ELEMENTS {
                let files: Vec<PathBuf> = members
                    .iter()
                    .filter_map(|item| item.file(element).map(Path::to_path_buf))
                    .collect();
                if let Some(slot) = structure.files_mut(&part, &split, element) {
                    *slot = files;
                }
            }
        }
    }

    if let Some(dest) = &config.dest {
        write_structure(&structure, dest, config, storage)?;
    }

    info!("Dataset partitioning complete");
    Ok(structure)
}

/// Copy every cell of `structure` under `dest`, one task per
/// `(part, split, element)` directory, and wait for all of them.
fn write_structure(
    structure: &DatasetStructure,
    dest: &Path,
    config: &PartitionConfig,
    storage: &dyn Storage,
) -> Result<()> {
    let cells: Vec<_> = structure.cells().collect();
    let total: usize = cells.iter().map(|(_, _, _, files)| files.len()).sum();
    info!("Writing {} files to new dataset path at {:?}", total, dest);

    let pb = if config.progress {
        create_progress_bar(total as u64, "Copy")
    } else {
        ProgressBar::hidden()
    };

    let pool = create_io_thread_pool(config.workers)?;
    pool.install(|| {
        cells
            .par_iter()
            .try_for_each(|(part, split, element, files)| {
                let written = copy_items(storage, dest, part, split, element, files)?;
                pb.inc(written as u64);
                Ok::<(), PartitionError>(())
            })
    })?;
    pb.finish_with_message("Copy complete");

    if let Some(taxonomy) = &config.data_yaml {
        for part in &structure.parts {
            create_part_data_yaml(dest, &part.name, taxonomy)?;
        }
    }
    Ok(())
}
