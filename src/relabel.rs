//! Rewrite the class index of YOLO annotation lines through a
//! [`PositionMap`].

use log::{debug, info};
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, PartitionError, Result};
use crate::io::list_files;
use crate::taxonomy::{remove_classes, PositionMap, Taxonomy, TaxonomyFile};
use crate::types::RewriteStats;
use crate::utils::{file_name_str, temp_file_beside};

/// Prefix of the sibling directory that keeps pre-rewrite copies:
/// `labels/a.txt` is backed up to `old_labels/a.txt`.
pub const BACKUP_PREFIX: &str = "old_";

/// Backup directory for files living in `dir`.
pub fn backup_dir_for(dir: &Path) -> Result<PathBuf> {
    let dir = fs::canonicalize(dir).at(dir)?;
    let name = file_name_str(&dir)?;
    let parent = dir.parent().unwrap_or(&dir);
    Ok(parent.join(format!("{}{}", BACKUP_PREFIX, name)))
}

/// Substitute the leading token of one line. Returns `None` when the line
/// is left as is.
fn remap_line(line: &str, map: &PositionMap) -> Option<String> {
    let trimmed = line.trim_start();
    let token = trimmed.split_whitespace().next()?;
    let replacement = map.lookup_token(token)?;
    if replacement == token {
        return None;
    }
    Some(format!("{}{}", replacement, &trimmed[token.len()..]))
}

/// Apply `map` to every line of the annotation file at `path`.
///
/// The rewritten content is staged in a temporary file next to `path`. The
/// original is copied into the backup directory, unless an earlier rewrite
/// already left a backup there, and only then is the staged file renamed
/// over it. On any failure the temporary file is discarded and
/// `path` keeps its original content.
pub fn rewrite_annotation_file(path: &Path, map: &PositionMap) -> Result<RewriteStats> {
    let content = fs::read_to_string(path).at(path)?;

    let mut stats = RewriteStats {
        files: 1,
        ..Default::default()
    };
    let mut output = String::with_capacity(content.len());
    for line in content.lines() {
        stats.total_lines += 1;
        match remap_line(line, map) {
            Some(new_line) => {
                debug!(
                    "{:?} line {}: '{}' -> '{}'",
                    path, stats.total_lines, line, new_line
                );
                stats.lines_modified += 1;
                output.push_str(&new_line);
            }
            None => output.push_str(line),
        }
        output.push('\n');
    }

    let mut staged = temp_file_beside(path)?;
    staged.write_all(output.as_bytes()).at(staged.path())?;
    staged.flush().at(staged.path())?;

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let backup_dir = backup_dir_for(parent)?;
    fs::create_dir_all(&backup_dir).at(&backup_dir)?;
    let backup = backup_dir.join(file_name_str(path)?);
    // The first backup holds the pre-relabel content; later rewrites keep it
    if backup.exists() {
        debug!("Keeping earlier backup {:?}", backup);
    } else {
        fs::copy(path, &backup).at(&backup)?;
    }

    staged
        .persist(path)
        .map_err(|e| PartitionError::io(path, e.error))?;

    info!(
        "Rewrote {:?}: {} of {} lines modified",
        path, stats.lines_modified, stats.total_lines
    );
    Ok(stats)
}

/// Apply `map` to every `*.txt` file directly inside `dir`, in parallel.
/// The first failure aborts the run.
pub fn rewrite_annotation_dir(dir: &Path, map: &PositionMap) -> Result<RewriteStats> {
    if !dir.is_dir() {
        return Err(PartitionError::invalid_argument(format!(
            "annotation directory {:?} does not exist",
            dir
        )));
    }
    let files = list_files(dir, Some("txt"))?;
    info!("Relabeling {} annotation files in {:?}", files.len(), dir);

    files
        .par_iter()
        .map(|file| rewrite_annotation_file(file, map))
        .try_reduce(RewriteStats::default, |a, b| Ok(a + b))
}

/// Apply `map` to every directory in `dirs`, in order, summing the counts.
pub fn rewrite_annotation_dirs(dirs: &[PathBuf], map: &PositionMap) -> Result<RewriteStats> {
    dirs.iter().try_fold(RewriteStats::default(), |stats, dir| {
        Ok(stats + rewrite_annotation_dir(dir, map)?)
    })
}

/// Remove classes from the sidecar at `taxonomy_path` and renumber the
/// annotations in `label_dirs`.
///
/// Every directory is checked and relabeled before the pruned list is
/// written, so a failed relabel leaves the sidecar untouched and the same
/// command can be run again.
pub fn prune_and_relabel<S: AsRef<str>>(
    taxonomy_path: &Path,
    names_to_remove: &[S],
    label_dirs: &[PathBuf],
) -> Result<(Taxonomy, PositionMap, RewriteStats)> {
    let file = TaxonomyFile::load(taxonomy_path)?;
    let (pruned, position_map) = remove_classes(&file.taxonomy, names_to_remove);

    if let Some(missing) = label_dirs.iter().find(|d| !d.is_dir()) {
        return Err(PartitionError::invalid_argument(format!(
            "annotation directory {:?} does not exist",
            missing
        )));
    }
    let stats = rewrite_annotation_dirs(label_dirs, &position_map)?;

    file.save_as(&pruned, taxonomy_path)?;
    info!("Updated YAML file with new names");
    Ok((pruned, position_map, stats))
}
