use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use yolo_partition::{
    merge_taxonomies, merge_taxonomy_files, prune_and_relabel, prune_taxonomy_file,
    remove_classes, rewrite_annotation_dir, rewrite_annotation_dirs, rewrite_annotation_file,
    MappedIndex, PartitionError, PositionMap, Taxonomy, TaxonomyFile,
};

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_yaml(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
}

#[test]
fn test_remove_classes() {
    let taxonomy = Taxonomy::new(["cat", "dog", "bird"]);
    let (pruned, map) = remove_classes(&taxonomy, &["dog"]);

    assert_eq!(pruned.names, vec!["cat", "bird"]);
    assert_eq!(map.to_string_map(), string_map(&[("0", "0"), ("2", "1")]));
    assert_eq!(map.get(1), None);
}

#[test]
fn test_remove_unknown_class_is_noop() {
    let taxonomy = Taxonomy::new(["cat", "dog"]);
    let (pruned, map) = remove_classes(&taxonomy, &["zebra"]);
    assert_eq!(pruned, taxonomy);
    assert_eq!(map.to_string_map(), string_map(&[("0", "0"), ("1", "1")]));
}

#[test]
fn test_merge_taxonomies() {
    let first = Taxonomy::new(["cat", "dog"]);
    let second = Taxonomy::new(["bird", "cat", "dog"]);
    let outcome = merge_taxonomies(&first, &second);

    assert_eq!(outcome.merged.names, vec!["bird", "cat", "dog"]);
    assert_eq!(
        outcome.position_map.to_string_map(),
        string_map(&[("0", "-1"), ("1", "1"), ("2", "2")])
    );
    assert_eq!(
        outcome.first_to_merged.to_string_map(),
        string_map(&[("0", "1"), ("1", "2")])
    );
    assert_eq!(
        outcome.second_to_merged.to_string_map(),
        string_map(&[("0", "0"), ("1", "1"), ("2", "2")])
    );
}

#[test]
fn test_merge_marks_destination_only_classes() {
    let first = Taxonomy::new(["a", "c"]);
    let second = Taxonomy::new(["a", "b", "c"]);
    let outcome = merge_taxonomies(&first, &second);

    assert_eq!(outcome.merged.names, vec!["a", "b", "c"]);
    assert_eq!(
        outcome.position_map.to_string_map(),
        string_map(&[("0", "0"), ("1", "-1"), ("2", "2")])
    );
    assert_eq!(outcome.position_map.get(1), Some(MappedIndex::Added));
}

#[test]
fn test_merge_names_are_order_independent() {
    let a = Taxonomy::new(["zebra", "ant", "cow"]);
    let b = Taxonomy::new(["cow", "bee"]);
    assert_eq!(
        merge_taxonomies(&a, &b).merged,
        merge_taxonomies(&b, &a).merged
    );
    assert_eq!(
        merge_taxonomies(&a, &b).merged.names,
        vec!["ant", "bee", "cow", "zebra"]
    );
}

#[test]
fn test_prune_taxonomy_file_persists() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.yaml");
    write_yaml(
        &path,
        "path: /datasets/pets\ntrain: train/images\nnc: 3\nnames:\n- cat\n- dog\n- bird\n",
    );

    let (pruned, map) = prune_taxonomy_file(&path, &["dog"], true).unwrap();
    assert_eq!(pruned.names, vec!["cat", "bird"]);
    assert_eq!(map.to_string_map(), string_map(&[("0", "0"), ("2", "1")]));

    let reloaded = TaxonomyFile::load(&path).unwrap();
    assert_eq!(reloaded.taxonomy.names, vec!["cat", "bird"]);
    let raw: serde_yaml::Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["nc"].as_u64(), Some(2));
    assert_eq!(raw["path"].as_str(), Some("/datasets/pets"));
    assert_eq!(raw["train"].as_str(), Some("train/images"));
}

#[test]
fn test_prune_without_persist_leaves_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.yaml");
    let content = "names:\n- cat\n- dog\n";
    write_yaml(&path, content);

    prune_taxonomy_file(&path, &["cat"], false).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), content);
}

#[test]
fn test_missing_names_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.yaml");
    write_yaml(&path, "nc: 2\ntrain: train/images\n");

    match TaxonomyFile::load(&path) {
        Err(PartitionError::MissingTaxonomyKey { key, .. }) => assert_eq!(key, "names"),
        other => panic!("expected missing key, got {:?}", other),
    }
}

#[test]
fn test_malformed_names() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.yaml");
    write_yaml(&path, "names: cat\n");
    assert!(matches!(
        TaxonomyFile::load(&path),
        Err(PartitionError::MalformedTaxonomy { .. })
    ));

    write_yaml(&path, "names:\n  0: cat\n  2: dog\n");
    assert!(matches!(
        TaxonomyFile::load(&path),
        Err(PartitionError::MalformedTaxonomy { .. })
    ));
}

#[test]
fn test_indexed_names_mapping() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.yaml");
    write_yaml(&path, "names:\n  1: dog\n  0: cat\n");

    let file = TaxonomyFile::load(&path).unwrap();
    assert_eq!(file.taxonomy.names, vec!["cat", "dog"]);
}

#[test]
fn test_merge_taxonomy_files() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("original.yaml");
    let second = dir.path().join("destination.yaml");
    let first_content = "nc: 2\nnames:\n- cat\n- dog\n";
    let second_content = "nc: 3\nnames:\n- bird\n- cat\n- dog\n";
    write_yaml(&first, first_content);
    write_yaml(&second, second_content);

    let (output, outcome) = merge_taxonomy_files(&first, &second, "merged.yaml").unwrap();
    assert_eq!(output, dir.path().join("merged.yaml"));
    assert_eq!(outcome.merged.names, vec!["bird", "cat", "dog"]);

    let merged = TaxonomyFile::load(&output).unwrap();
    assert_eq!(merged.taxonomy.names, vec!["bird", "cat", "dog"]);
    assert_eq!(fs::read_to_string(&first).unwrap(), first_content);
    assert_eq!(fs::read_to_string(&second).unwrap(), second_content);

    assert!(matches!(
        merge_taxonomy_files(&first, &second, "original.yaml"),
        Err(PartitionError::InvalidArgument(_))
    ));
}

#[test]
fn test_rewrite_annotation_file() {
    let dir = tempdir().unwrap();
    let labels = dir.path().join("labels");
    fs::create_dir_all(&labels).unwrap();
    let file = labels.join("a.txt");
    fs::write(
        &file,
        "0 0.1 0.2 0.3 0.4\n2 0.5 0.5 0.2 0.2\n1 0.9 0.9 0.1 0.1\n",
    )
    .unwrap();

    let map = PositionMap::from_string_map(&string_map(&[("0", "0"), ("2", "1")])).unwrap();
    let stats = rewrite_annotation_file(&file, &map).unwrap();

    assert_eq!(stats.total_lines, 3);
    assert_eq!(stats.lines_modified, 1);
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "0 0.1 0.2 0.3 0.4\n1 0.5 0.5 0.2 0.2\n1 0.9 0.9 0.1 0.1\n"
    );

    let backup = dir.path().join("old_labels").join("a.txt");
    assert_eq!(
        fs::read_to_string(backup).unwrap(),
        "0 0.1 0.2 0.3 0.4\n2 0.5 0.5 0.2 0.2\n1 0.9 0.9 0.1 0.1\n"
    );
}

#[test]
fn test_rewrite_annotation_dir() {
    let dir = tempdir().unwrap();
    let labels = dir.path().join("labels");
    fs::create_dir_all(&labels).unwrap();
    for i in 0..4 {
        fs::write(labels.join(format!("{}.txt", i)), "1 0.5 0.5 0.1 0.1\n1 0 0 1 1\n").unwrap();
    }
    fs::write(labels.join("notes.md"), "1 keep\n").unwrap();

    let map: PositionMap = [(1, MappedIndex::Index(0))].into_iter().collect();
    let stats = rewrite_annotation_dir(&labels, &map).unwrap();

    assert_eq!(stats.files, 4);
    assert_eq!(stats.total_lines, 8);
    assert_eq!(stats.lines_modified, 8);
    assert_eq!(
        fs::read_to_string(labels.join("2.txt")).unwrap(),
        "0 0.5 0.5 0.1 0.1\n0 0 0 1 1\n"
    );
    assert_eq!(fs::read_to_string(labels.join("notes.md")).unwrap(), "1 keep\n");

    assert!(matches!(
        rewrite_annotation_dir(&dir.path().join("missing"), &map),
        Err(PartitionError::InvalidArgument(_))
    ));
}

#[test]
fn test_position_map_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("map.json");
    let map: PositionMap = [
        (0, MappedIndex::Added),
        (1, MappedIndex::Index(1)),
        (2, MappedIndex::Index(2)),
    ]
    .into_iter()
    .collect();

    map.save(&path).unwrap();
    let raw: BTreeMap<String, String> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw, string_map(&[("0", "-1"), ("1", "1"), ("2", "2")]));
    assert_eq!(PositionMap::load(&path).unwrap(), map);

    assert!(PositionMap::from_string_map(&string_map(&[("x", "1")])).is_err());
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_second_rewrite_keeps_first_backup() {
    let dir = tempdir().unwrap();
    let labels = dir.path().join("labels");
    fs::create_dir_all(&labels).unwrap();
    let file = labels.join("a.txt");
    fs::write(&file, "2 0.5 0.5 0.1 0.1\n").unwrap();

    let first: PositionMap = [(2, MappedIndex::Index(1))].into_iter().collect();
    let second: PositionMap = [(1, MappedIndex::Index(0))].into_iter().collect();
    rewrite_annotation_file(&file, &first).unwrap();
    rewrite_annotation_file(&file, &second).unwrap();

    assert_eq!(fs::read_to_string(&file).unwrap(), "0 0.5 0.5 0.1 0.1\n");
    assert_eq!(
        fs::read_to_string(dir.path().join("old_labels").join("a.txt")).unwrap(),
        "2 0.5 0.5 0.1 0.1\n"
    );
}

#[test]
fn test_failed_rewrite_leaves_original() {
    let dir = tempdir().unwrap();
    let labels = dir.path().join("labels");
    fs::create_dir_all(&labels).unwrap();
    let file = labels.join("a.txt");
    let content = "2 0.5 0.5 0.1 0.1\n0 0.1 0.1 0.2 0.2\n";
    fs::write(&file, content).unwrap();
    // A plain file where the backup directory should go
    fs::write(dir.path().join("old_labels"), "not a directory").unwrap();

    let map: PositionMap = [(2, MappedIndex::Index(1))].into_iter().collect();
    let result = rewrite_annotation_file(&file, &map);

    assert!(matches!(result, Err(PartitionError::Io { .. })));
    assert_eq!(fs::read_to_string(&file).unwrap(), content);
    // The staged temporary file is discarded
    assert_eq!(file_names(&labels), vec!["a.txt"]);
}

#[test]
fn test_rewrite_annotation_dirs_sums_counts() {
    let dir = tempdir().unwrap();
    let dirs: Vec<PathBuf> = ["train", "valid"]
        .iter()
        .map(|split| dir.path().join(split).join("labels"))
        .collect();
    for labels in &dirs {
        fs::create_dir_all(labels).unwrap();
        fs::write(labels.join("a.txt"), "3 0 0 1 1\n").unwrap();
    }

    let map: PositionMap = [(3, MappedIndex::Index(2))].into_iter().collect();
    let stats = rewrite_annotation_dirs(&dirs, &map).unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.lines_modified, 2);
}

#[test]
fn test_prune_and_relabel() {
    let dir = tempdir().unwrap();
    let yaml = dir.path().join("data.yaml");
    write_yaml(&yaml, "nc: 3\nnames:\n- cat\n- dog\n- bird\n");
    let labels = dir.path().join("train").join("labels");
    fs::create_dir_all(&labels).unwrap();
    fs::write(labels.join("a.txt"), "2 0.5 0.5 0.1 0.1\n").unwrap();

    let (pruned, _, stats) = prune_and_relabel(&yaml, &["dog"], &[labels.clone()]).unwrap();
    assert_eq!(pruned.names, vec!["cat", "bird"]);
    assert_eq!(stats.lines_modified, 1);
    assert_eq!(
        fs::read_to_string(labels.join("a.txt")).unwrap(),
        "1 0.5 0.5 0.1 0.1\n"
    );
    assert_eq!(
        TaxonomyFile::load(&yaml).unwrap().taxonomy.names,
        vec!["cat", "bird"]
    );
}

#[test]
fn test_prune_and_relabel_failure_keeps_sidecar() {
    let dir = tempdir().unwrap();
    let yaml = dir.path().join("data.yaml");
    let content = "nc: 3\nnames:\n- cat\n- dog\n- bird\n";
    write_yaml(&yaml, content);
    let labels = dir.path().join("train").join("labels");
    fs::create_dir_all(&labels).unwrap();
    fs::write(labels.join("a.txt"), "2 0.5 0.5 0.1 0.1\n").unwrap();
    // Backup directory cannot be created, so the relabel fails
    fs::write(dir.path().join("train").join("old_labels"), "x").unwrap();

    let result = prune_and_relabel(&yaml, &["dog"], &[labels.clone()]);
    assert!(matches!(result, Err(PartitionError::Io { .. })));
    assert_eq!(fs::read_to_string(&yaml).unwrap(), content);

    let missing = prune_and_relabel(&yaml, &["dog"], &[dir.path().join("missing")]);
    assert!(matches!(missing, Err(PartitionError::InvalidArgument(_))));
    assert_eq!(fs::read_to_string(&yaml).unwrap(), content);
}
