use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use crate::taxonomy::MERGED_FILE_NAME;
use crate::types::DEFAULT_SEED;

/// Repartition YOLO datasets and reconcile their class lists.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Split a dataset into numbered parts, each with train/valid/test splits
    Partition(PartitionArgs),
    /// Remove classes from a taxonomy file and renumber annotations
    Prune(PruneArgs),
    /// Merge two taxonomy files into a new sorted one
    Merge(MergeArgs),
    /// Apply a saved position map to annotation directories
    Relabel(RelabelArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct PartitionArgs {
    /// Source dataset laid out as <split>/<images|labels>/*
    #[arg(short = 's', long = "source")]
    pub source: PathBuf,

    /// Number of parts to create
    #[arg(
        long = "parts",
        value_parser = validate_count,
        conflicts_with = "size",
        required_unless_present = "size"
    )]
    pub parts: Option<usize>,

    /// Maximum number of items per part
    #[arg(long = "size", value_parser = validate_count)]
    pub size: Option<usize>,

    /// Split proportions inside every part, as name=ratio pairs
    #[arg(
        long = "ratios",
        value_delimiter = ',',
        value_parser = parse_named_ratio,
        default_values = ["train=0.8", "valid=0.1", "test=0.1"]
    )]
    pub ratios: Vec<(String, f64)>,

    /// Destination root; rebuilt from scratch when given
    #[arg(short = 'o', long = "dest")]
    pub dest: Option<PathBuf>,

    /// Keep the source order instead of shuffling
    #[arg(long = "no_shuffle", visible_alias = "no-shuffle")]
    pub no_shuffle: bool,

    /// Seed for random shuffling
    #[arg(long = "seed", default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Fail when an image has no label or a label has no image
    #[arg(long = "strict")]
    pub strict: bool,

    /// Copy worker threads (0 = one per core)
    #[arg(long = "workers", default_value_t = 0)]
    pub workers: usize,

    /// Write the resulting structure as JSON to this file
    #[arg(long = "manifest")]
    pub manifest: Option<PathBuf>,

    /// Taxonomy file whose classes go into every part's data.yaml
    #[arg(long = "names")]
    pub names: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct PruneArgs {
    /// Taxonomy YAML file with a `names` list
    #[arg(short = 't', long = "taxonomy")]
    pub taxonomy: PathBuf,

    /// Class names to remove
    #[arg(long = "remove", value_delimiter = ',', required = true)]
    pub remove: Vec<String>,

    /// Annotation directories to renumber
    #[arg(long = "labels")]
    pub labels: Vec<PathBuf>,

    /// Compute the position map without touching any file
    #[arg(long = "dry_run", visible_alias = "dry-run")]
    pub dry_run: bool,

    /// Save the position map as JSON
    #[arg(long = "map_out", visible_alias = "map-out")]
    pub map_out: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MergeArgs {
    /// Taxonomy file of the original dataset
    #[arg(long = "original")]
    pub original: PathBuf,

    /// Taxonomy file of the dataset being merged in
    #[arg(long = "destination")]
    pub destination: PathBuf,

    /// File name of the merged taxonomy, created next to the original
    #[arg(long = "output", default_value = MERGED_FILE_NAME)]
    pub output: String,

    /// Annotation directories of the original dataset to renumber
    #[arg(long = "original_labels", visible_alias = "original-labels")]
    pub original_labels: Vec<PathBuf>,

    /// Annotation directories of the destination dataset to renumber
    #[arg(long = "labels")]
    pub labels: Vec<PathBuf>,

    /// Save the destination-keyed position map as JSON
    #[arg(long = "map_out", visible_alias = "map-out")]
    pub map_out: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RelabelArgs {
    /// Position map JSON written by `prune` or `merge`
    #[arg(long = "map")]
    pub map: PathBuf,

    /// Annotation directories to renumber
    #[arg(long = "labels", required = true)]
    pub labels: Vec<PathBuf>,
}

// Validate that a ratio is in (0, 1]
pub fn validate_ratio(s: &str) -> Result<f64, String> {
    match f64::from_str(s.trim()) {
        Ok(val) if val > 0.0 && val <= 1.0 => Ok(val),
        _ => Err("RATIO must be greater than 0.0 and at most 1.0".to_string()),
    }
}

// Parse a `name=ratio` pair
pub fn parse_named_ratio(s: &str) -> Result<(String, f64), String> {
    let (name, ratio) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=ratio, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing split name in '{}'", s));
    }
    Ok((name.to_string(), validate_ratio(ratio)?))
}

// Validate a strictly positive count
pub fn validate_count(s: &str) -> Result<usize, String> {
    match usize::from_str(s.trim()) {
        Ok(val) if val > 0 => Ok(val),
        _ => Err("COUNT must be a positive integer".to_string()),
    }
}
