use glob::{glob_with, MatchOptions, Pattern};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{IoContext, PartitionError, Result};
use crate::taxonomy::Taxonomy;
use crate::types::{DatasetStructure, ELEMENTS, SET_TYPES};
use crate::utils::{file_name_str, recreate_directory};

/// Destination side of a file transfer.
///
/// `put` must be synchronous and fail loudly; retries, if any, belong to the
/// implementation.
pub trait Storage: Send + Sync {
    fn put(&self, local: &Path, dest: &Path) -> Result<()>;
}

/// Plain filesystem copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

impl Storage for LocalStorage {
    fn put(&self, local: &Path, dest: &Path) -> Result<()> {
        fs::copy(local, dest).map(|_| ()).at(local)
    }
}

/// Files of each element kind found under one split of a source dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceGroup {
    pub split: String,
    /// Element kind -> sorted file paths
    pub files: BTreeMap<String, Vec<PathBuf>>,
}

impl SourceGroup {
    pub fn files(&self, element: &str) -> &[PathBuf] {
        self.files.get(element).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Sorted regular files directly inside `dir`, skipping dotfiles.
/// A missing directory yields an empty list.
pub fn list_files(dir: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = format!(
        "{}/*{}",
        Pattern::escape(&dir.to_string_lossy()),
        extension.map(|e| format!(".{}", e)).unwrap_or_default()
    );
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };

    let mut files = Vec::new();
    for entry in glob_with(&pattern, options)
        .map_err(|e| PartitionError::invalid_argument(format!("bad glob {}: {}", pattern, e)))?
    {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            PartitionError::io(path, e.into())
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Enumerate `source/<split>/<element>/*` for every split and element kind.
pub fn collect_source_groups(
    source: &Path,
    splits: &[&str],
    elements: &[&str],
) -> Result<Vec<SourceGroup>> {
    info!("Retrieving dataset paths by elements from {:?}", source);
    splits
        .iter()
        .map(|split| {
            let files = elements
                .iter()
                .map(|element| {
                    let dir = source.join(split).join(element);
                    Ok((element.to_string(), list_files(&dir, None)?))
                })
                .collect::<Result<BTreeMap<_, _>>>()?;
            Ok(SourceGroup {
                split: split.to_string(),
                files,
            })
        })
        .collect()
}

/// Destructively rebuild `path/<part>/<split>/<element>` for parts `1..=parts`
/// with the standard split and element names.
///
/// Anything previously under `path` is deleted. Callers must not run this
/// concurrently with copies into the same tree.
pub fn materialize(path: &Path, parts: usize) -> Result<()> {
    materialize_with(path, parts, SET_TYPES, ELEMENTS)
}

pub fn materialize_with(
    path: &Path,
    parts: usize,
    splits: &[&str],
    elements: &[&str],
) -> Result<()> {
    if parts == 0 {
        return Err(PartitionError::invalid_argument(
            "cannot materialize a dataset with zero parts",
        ));
    }
    info!("Creating directory structure on disk at {:?}", path);

    recreate_directory(path)?;
    for part in 1..=parts {
        for split in splits {
            for element in elements {
                let dir = path.join(part.to_string()).join(split).join(element);
                fs::create_dir_all(&dir).at(&dir)?;
            }
        }
    }
    Ok(())
}

/// Copy `items` into `dest/<part>/<split>/<element>/`, keeping basenames.
///
/// Files sharing a basename overwrite each other. Returns the number of
/// files written.
pub fn copy_items(
    storage: &dyn Storage,
    dest: &Path,
    part: &str,
    split: &str,
    element: &str,
    items: &[PathBuf],
) -> Result<usize> {
    let target_dir = dest.join(part).join(split).join(element);
    debug!("Writing {} files to {:?}", items.len(), target_dir);
    for item in items {
        let target = target_dir.join(file_name_str(item)?);
        storage.put(item, &target)?;
    }
    Ok(items.len())
}

/// Write the logical structure as pretty JSON.
pub fn write_manifest(structure: &DatasetStructure, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path).at(path)?);
    serde_json::to_writer_pretty(&mut writer, structure)
        .map_err(|e| PartitionError::io(path, e.into()))?;
    writer.flush().at(path)?;
    info!("Wrote partition manifest to {:?}", path);
    Ok(())
}

#[derive(Serialize)]
struct PartDataYaml<'a> {
    path: String,
    train: &'a str,
    val: &'a str,
    test: &'a str,
    nc: usize,
    names: &'a [String],
}

/// Create the data.yaml file a YOLO trainer expects inside `dest/<part>`.
pub fn create_part_data_yaml(dest: &Path, part: &str, taxonomy: &Taxonomy) -> Result<PathBuf> {
    let part_dir = dest.join(part);
    let absolute_path = fs::canonicalize(&part_dir).at(&part_dir)?;
    let content = PartDataYaml {
        path: absolute_path.to_string_lossy().into_owned(),
        train: "train/images",
        val: "valid/images",
        test: "test/images",
        nc: taxonomy.nc(),
        names: &taxonomy.names,
    };
    let yaml = serde_yaml::to_string(&content)
        .map_err(|e| PartitionError::malformed(&part_dir, e.to_string()))?;

    let yaml_path = part_dir.join("data.yaml");
    let mut writer = BufWriter::new(File::create(&yaml_path).at(&yaml_path)?);
    writer.write_all(yaml.as_bytes()).at(&yaml_path)?;
    writer.flush().at(&yaml_path)?;
    Ok(yaml_path)
}
