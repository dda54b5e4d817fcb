//! YOLO dataset repartitioning and taxonomy reconciliation
//!
//! This library splits a pool of paired image/label files into reproducible
//! numbered parts, each with train/valid/test splits, materializes them on
//! disk, and renumbers class indices when class lists are pruned or merged.

pub mod config;
pub mod dataset;
pub mod error;
pub mod io;
pub mod ratios;
pub mod relabel;
pub mod split;
pub mod taxonomy;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use dataset::{pair_items, partition_by_n_parts, partition_by_size, PartitionConfig};
pub use error::{PartitionError, Result};
pub use io::{
    collect_source_groups, copy_items, create_part_data_yaml, materialize, materialize_with,
    write_manifest, LocalStorage, SourceGroup, Storage,
};
pub use ratios::{ratios_from_parts, ratios_from_size, size_ratios_for_split};
pub use relabel::{
    prune_and_relabel, rewrite_annotation_dir, rewrite_annotation_dirs, rewrite_annotation_file,
};
pub use split::{
    split_by_n_parts, split_by_named_ratios, split_by_ratios, split_by_size,
    split_paired_by_named_ratios, NamedRatios,
};
pub use taxonomy::{
    merge_taxonomies, merge_taxonomy_files, prune_taxonomy_file, remove_classes, MappedIndex,
    MergeOutcome, PositionMap, Taxonomy, TaxonomyFile,
};
pub use types::{
    build_structure, DatasetStructure, ElementEntry, Item, PartEntry, RewriteStats, SplitEntry,
    ELEMENTS, IMAGES, LABELS, SET_TYPES,
};
pub use utils::{init_shuffle_rng, shuffle_rng};
