use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use crate::error::{PartitionError, Result};
use crate::types::DEFAULT_SEED;

static SHUFFLE_RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();

/// Seed the process-wide shuffle source. Only the first initialisation wins;
/// returns `false` if the source was already seeded.
pub fn init_shuffle_rng(seed: u64) -> bool {
    SHUFFLE_RNG
        .set(Mutex::new(StdRng::seed_from_u64(seed)))
        .is_ok()
}

/// Lock the process-wide shuffle source, seeding it with [`DEFAULT_SEED`] on
/// first use.
///
/// Successive calls share one generator, so two splits in the same process
/// get different but reproducible permutations.
pub fn shuffle_rng() -> MutexGuard<'static, StdRng> {
    SHUFFLE_RNG
        .get_or_init(|| Mutex::new(StdRng::seed_from_u64(DEFAULT_SEED)))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
                label
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Build the bounded pool used for file copies; `0` lets rayon pick.
pub fn create_io_thread_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("copy-{}", i))
        .build()
        .map_err(|e| PartitionError::invalid_argument(format!("cannot build worker pool: {}", e)))
}

/// Remove `path` and everything under it, then recreate it empty.
/// A missing `path` is not an error.
pub fn recreate_directory(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => log::warn!(
            "Directory {:?} already existed. Deleted its previous contents.",
            path
        ),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(PartitionError::io(path, e)),
    }
    fs::create_dir_all(path).map_err(|e| PartitionError::io(path, e))
}

/// File name of `path` as a UTF-8 string, or an invalid-argument error.
pub fn file_name_str(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PartitionError::invalid_argument(format!(
                "path has no UTF-8 file name: {}",
                path.display()
            ))
        })
}

/// Temporary file in the directory of `path`, so persisting it over `path`
/// is a same-filesystem rename.
pub fn temp_file_beside(path: &Path) -> Result<tempfile::NamedTempFile> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tempfile::NamedTempFile::new_in(dir).map_err(|e| PartitionError::io(dir, e))
}
