use clap::Parser;

use log::{error, info, warn};
use rand::RngCore;
use std::path::PathBuf;
use std::process::ExitCode;

use yolo_partition::config::{Cli, Command, MergeArgs, PartitionArgs, PruneArgs, RelabelArgs};
use yolo_partition::{
    init_shuffle_rng, merge_taxonomy_files, partition_by_n_parts, partition_by_size,
    prune_and_relabel, prune_taxonomy_file, rewrite_annotation_dirs, shuffle_rng, write_manifest,
    LocalStorage, MappedIndex, NamedRatios, PartitionConfig, PartitionError, PositionMap, Result,
    TaxonomyFile, IMAGES, LABELS,
};

fn run_partition(args: &PartitionArgs) -> Result<()> {
    let config = PartitionConfig {
        split_ratios: NamedRatios::new(args.ratios.clone())?,
        dest: args.dest.clone(),
        strict_pairing: args.strict,
        workers: args.workers,
        progress: true,
        data_yaml: match &args.names {
            Some(path) => Some(TaxonomyFile::load(path)?.taxonomy),
            None => None,
        },
    };

    init_shuffle_rng(args.seed);
    let mut guard = shuffle_rng();
    let rng: Option<&mut dyn RngCore> = if args.no_shuffle {
        None
    } else {
        Some(&mut *guard)
    };

    let structure = if let Some(size) = args.size {
        partition_by_size(&args.source, size, &config, &LocalStorage, rng)?
    } else {
        let parts = args
            .parts
            .ok_or_else(|| PartitionError::invalid_argument("either --parts or --size is required"))?;
        partition_by_n_parts(&args.source, parts, &config, &LocalStorage, rng)?
    };

    for part in &structure.parts {
        info!(
            "Part {}: {} images, {} labels",
            part.name,
            part.count(IMAGES),
            part.count(LABELS)
        );
    }
    if let Some(manifest) = &args.manifest {
        write_manifest(&structure, manifest)?;
    }
    Ok(())
}

fn relabel_dirs(dirs: &[PathBuf], map: &PositionMap) -> Result<()> {
    let stats = rewrite_annotation_dirs(dirs, map)?;
    if !dirs.is_empty() {
        stats.print_summary();
    }
    Ok(())
}

fn run_prune(args: &PruneArgs) -> Result<()> {
    if args.dry_run {
        let (pruned, position_map) = prune_taxonomy_file(&args.taxonomy, &args.remove, false)?;
        info!("{} classes would remain: {:?}", pruned.nc(), pruned.names);
        if let Some(path) = &args.map_out {
            position_map.save(path)?;
        }
        info!("Dry run: taxonomy and annotation files left untouched");
        return Ok(());
    }

    let (pruned, position_map, stats) =
        prune_and_relabel(&args.taxonomy, &args.remove, &args.labels)?;
    info!("{} classes remain: {:?}", pruned.nc(), pruned.names);
    if !args.labels.is_empty() {
        stats.print_summary();
    }
    if let Some(path) = &args.map_out {
        position_map.save(path)?;
    }
    Ok(())
}

fn run_merge(args: &MergeArgs) -> Result<()> {
    let (output, outcome) = merge_taxonomy_files(&args.original, &args.destination, &args.output)?;
    info!(
        "Merged taxonomy with {} classes written to {:?}",
        outcome.merged.nc(),
        output
    );
    if let Some(path) = &args.map_out {
        outcome.position_map.save(path)?;
    }
    relabel_dirs(&args.original_labels, &outcome.first_to_merged)?;
    relabel_dirs(&args.labels, &outcome.second_to_merged)
}

fn run_relabel(args: &RelabelArgs) -> Result<()> {
    let map = PositionMap::load(&args.map)?;
    info!("Loaded position map with {} entries", map.len());
    let added = map.iter().filter(|(_, new)| *new == MappedIndex::Added).count();
    if added > 0 {
        warn!(
            "{} entries map to -1; lines with those classes will get class -1",
            added
        );
    }
    relabel_dirs(&args.labels, &map)
}

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Partition(args) => run_partition(args),
        Command::Prune(args) => run_prune(args),
        Command::Merge(args) => run_merge(args),
        Command::Relabel(args) => run_relabel(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
