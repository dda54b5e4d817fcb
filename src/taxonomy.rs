//! Class taxonomy reconciliation.
//!
//! A taxonomy is the ordered `names` list of a YOLO sidecar file. Editing
//! it (pruning classes, or merging two datasets' lists) renumbers class
//! indices; the [`PositionMap`] produced here records old index -> new index
//! so annotation files can be rewritten with [`crate::relabel`].

use log::{debug, info, warn};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{IoContext, PartitionError, Result};
use crate::utils::temp_file_beside;

pub const NAMES_KEY: &str = "names";
pub const NC_KEY: &str = "nc";

/// Default file name of a merged sidecar, written next to the original.
pub const MERGED_FILE_NAME: &str = "merged.yaml";

/// Ordered class names of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub names: Vec<String>,
}

impl Taxonomy {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Class count
    pub fn nc(&self) -> usize {
        self.names.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Target of one position-map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappedIndex {
    Index(usize),
    /// Class introduced by a merge; it had no index before. Renders as `-1`.
    Added,
}

impl fmt::Display for MappedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappedIndex::Index(i) => write!(f, "{}", i),
            MappedIndex::Added => f.write_str("-1"),
        }
    }
}

impl FromStr for MappedIndex {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "-1" => Ok(MappedIndex::Added),
            other => other
                .parse::<usize>()
                .map(MappedIndex::Index)
                .map_err(|_| format!("'{}' is not a class index", s)),
        }
    }
}

/// Old class index -> new class index (or [`MappedIndex::Added`]).
///
/// Serializes as a JSON object with string keys and values, e.g.
/// `{"0": "0", "2": "1"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionMap(BTreeMap<usize, MappedIndex>);

impl PositionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: usize, new: MappedIndex) {
        self.0.insert(old, new);
    }

    pub fn get(&self, old: usize) -> Option<MappedIndex> {
        self.0.get(&old).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, MappedIndex)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Replacement for the leading token of an annotation line, if the
    /// token is a mapped class index.
    pub fn lookup_token(&self, token: &str) -> Option<String> {
        let old = token.parse::<usize>().ok()?;
        self.get(old).map(|new| new.to_string())
    }

    /// Portable form with string keys and values.
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn from_string_map(map: &BTreeMap<String, String>) -> std::result::Result<Self, String> {
        map.iter()
            .map(|(k, v)| {
                let old = k
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("'{}' is not a class index", k))?;
                Ok((old, v.parse::<MappedIndex>()?))
            })
            .collect::<std::result::Result<BTreeMap<_, _>, String>>()
            .map(PositionMap)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path).at(path)?);
        serde_json::from_reader(reader).map_err(|e| PartitionError::io(path, e.into()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path).at(path)?);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| PartitionError::io(path, e.into()))?;
        writer.flush().at(path)
    }
}

impl FromIterator<(usize, MappedIndex)> for PositionMap {
    fn from_iter<I: IntoIterator<Item = (usize, MappedIndex)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for PositionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }
}

impl<'de> Deserialize<'de> for PositionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        PositionMap::from_string_map(&raw).map_err(de::Error::custom)
    }
}

/// Drop `names_to_remove` from `taxonomy`, keeping the relative order of
/// the rest. Removed classes do not appear in the returned map.
pub fn remove_classes<S: AsRef<str>>(
    taxonomy: &Taxonomy,
    names_to_remove: &[S],
) -> (Taxonomy, PositionMap) {
    let remove: HashSet<&str> = names_to_remove.iter().map(AsRef::as_ref).collect();
    for name in &remove {
        if taxonomy.index_of(name).is_none() {
            warn!("Class '{}' is not in the taxonomy; nothing to remove", name);
        }
    }

    let mut position_map = PositionMap::new();
    let mut kept = Vec::with_capacity(taxonomy.nc());
    for (old_pos, name) in taxonomy.names.iter().enumerate() {
        if remove.contains(name.as_str()) {
            debug!("Removed: {} from position {}", name, old_pos);
            continue;
        }
        let new_pos = kept.len();
        debug!("Mapped: {} from position {} to {}", name, old_pos, new_pos);
        position_map.insert(old_pos, MappedIndex::Index(new_pos));
        kept.push(name.clone());
    }

    info!("New names after removal: {:?}", kept);
    (Taxonomy { names: kept }, position_map)
}

/// Result of merging two taxonomies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Sorted union of both class lists.
    pub merged: Taxonomy,
    /// Keyed on indices of the second (destination) taxonomy: the merged
    /// index for classes the first taxonomy already had, `-1` for classes
    /// the merge introduces.
    pub position_map: PositionMap,
    /// Every index of the first taxonomy -> merged index.
    pub first_to_merged: PositionMap,
    /// Every index of the second taxonomy -> merged index.
    pub second_to_merged: PositionMap,
}

fn full_map(from: &Taxonomy, merged: &Taxonomy) -> PositionMap {
    from.names
        .iter()
        .enumerate()
        .filter_map(|(i, name)| merged.index_of(name).map(|m| (i, MappedIndex::Index(m))))
        .collect()
}

/// Merge `first` and `second` into the alphabetically sorted union of their
/// class names.
pub fn merge_taxonomies(first: &Taxonomy, second: &Taxonomy) -> MergeOutcome {
    let merged = Taxonomy {
        names: first
            .names
            .iter()
            .chain(second.names.iter())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };

    let position_map = second
        .names
        .iter()
        .enumerate()
        .map(|(idx, name)| match (first.index_of(name), merged.index_of(name)) {
            (Some(_), Some(m)) => (idx, MappedIndex::Index(m)),
            _ => (idx, MappedIndex::Added),
        })
        .collect();

    MergeOutcome {
        first_to_merged: full_map(first, &merged),
        second_to_merged: full_map(second, &merged),
        merged,
        position_map,
    }
}

/// A taxonomy sidecar together with the rest of its YAML document, so
/// rewriting it only touches `names` and `nc`.
#[derive(Debug, Clone)]
pub struct TaxonomyFile {
    pub path: PathBuf,
    pub taxonomy: Taxonomy,
    document: Mapping,
}

impl TaxonomyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).at(path)?;
        let document = match serde_yaml::from_str::<Value>(&content)
            .map_err(|e| PartitionError::malformed(path, e.to_string()))?
        {
            Value::Mapping(m) => m,
            Value::Null => Mapping::new(),
            _ => {
                return Err(PartitionError::malformed(
                    path,
                    "top level must be a mapping",
                ))
            }
        };

        let names = document
            .get(NAMES_KEY)
            .ok_or_else(|| PartitionError::MissingTaxonomyKey {
                path: path.to_path_buf(),
                key: NAMES_KEY.to_string(),
            })?;
        let taxonomy = Taxonomy {
            names: parse_names(path, names)?,
        };
        info!("Loaded {} class names from {:?}", taxonomy.nc(), path);

        Ok(Self {
            path: path.to_path_buf(),
            taxonomy,
            document,
        })
    }

    /// Write this document with `taxonomy` as its class list to `path`,
    /// atomically replacing any file already there.
    pub fn save_as(&self, taxonomy: &Taxonomy, path: &Path) -> Result<()> {
        let mut document = self.document.clone();
        document.insert(
            Value::from(NAMES_KEY),
            Value::Sequence(taxonomy.names.iter().cloned().map(Value::from).collect()),
        );
        document.insert(Value::from(NC_KEY), Value::Number(serde_yaml::Number::from(taxonomy.nc() as u64)));
        let yaml = serde_yaml::to_string(&document)
            .map_err(|e| PartitionError::malformed(path, e.to_string()))?;

        let mut tmp = temp_file_beside(path)?;
        tmp.write_all(yaml.as_bytes()).at(path)?;
        tmp.persist(path)
            .map_err(|e| PartitionError::io(path, e.error))?;
        Ok(())
    }
}

fn parse_names(path: &Path, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Sequence(seq) => seq
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    PartitionError::malformed(path, format!("class name {:?} is not a string", v))
                })
            })
            .collect(),
        // `0: cat` form written by YOLO dataset.yaml generators
        Value::Mapping(map) => {
            let mut indexed = BTreeMap::new();
            for (k, v) in map {
                let idx = k.as_u64().ok_or_else(|| {
                    PartitionError::malformed(path, format!("class index {:?} is not an integer", k))
                })?;
                let name = v.as_str().ok_or_else(|| {
                    PartitionError::malformed(path, format!("class name {:?} is not a string", v))
                })?;
                indexed.insert(idx as usize, name.to_string());
            }
            if indexed.keys().copied().ne(0..indexed.len()) {
                return Err(PartitionError::malformed(
                    path,
                    "class indices must run from 0 without gaps",
                ));
            }
            Ok(indexed.into_values().collect())
        }
        other => Err(PartitionError::malformed(
            path,
            format!("'{}' must be a list, got {:?}", NAMES_KEY, other),
        )),
    }
}

/// Remove classes from the sidecar at `path`, optionally writing the pruned
/// list (with a recomputed `nc`) back in place.
pub fn prune_taxonomy_file<S: AsRef<str>>(
    path: &Path,
    names_to_remove: &[S],
    persist: bool,
) -> Result<(Taxonomy, PositionMap)> {
    info!("Starting to process YAML file: {:?}", path);
    let file = TaxonomyFile::load(path)?;
    let (pruned, position_map) = remove_classes(&file.taxonomy, names_to_remove);
    if persist {
        file.save_as(&pruned, path)?;
        info!("Updated YAML file with new names");
    }
    info!("Position mapping: {:?}", position_map.to_string_map());
    Ok((pruned, position_map))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Merge the sidecars at `first` and `second` into a new sidecar named
/// `output_name` next to `first`. Neither input is modified.
pub fn merge_taxonomy_files(
    first: &Path,
    second: &Path,
    output_name: &str,
) -> Result<(PathBuf, MergeOutcome)> {
    info!("Processing YAML files: {:?}, {:?}", first, second);
    let first_file = TaxonomyFile::load(first)?;
    let second_file = TaxonomyFile::load(second)?;

    let output = first
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(output_name);
    if same_file(&output, first) || same_file(&output, second) {
        return Err(PartitionError::invalid_argument(format!(
            "merged taxonomy {:?} would overwrite an input file",
            output
        )));
    }

    let outcome = merge_taxonomies(&first_file.taxonomy, &second_file.taxonomy);
    first_file.save_as(&outcome.merged, &output)?;
    info!("Created new YAML file: {:?}", output);
    info!(
        "Position mapping: {:?}",
        outcome.position_map.to_string_map()
    );
    Ok((output, outcome))
}
