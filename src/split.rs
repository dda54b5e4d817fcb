//! Deterministic ratio splitting of ordered collections.
//!
//! Every function takes an optional shuffle source. `None` keeps the input
//! order; `Some(rng)` permutes the input once before cutting it, so a seeded
//! generator reproduces the same buckets run after run.

use log::info;
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{PartitionError, Result};
use crate::ratios::{ratios_from_parts, size_ratios_for_split, validate_ratios};

// Guards `floor(ratio * total)` against products like 6.999999999999999
const FLOOR_EPSILON: f64 = 1e-9;

/// Bucket sizes for `total` items: `floor(ratio * total)` for every ratio but
/// the last, which takes whatever remains.
pub fn bucket_sizes(total: usize, ratios: &[f64]) -> Vec<usize> {
    let mut remaining = total;
    let mut sizes = Vec::with_capacity(ratios.len());
    for ratio in &ratios[..ratios.len().saturating_sub(1)] {
        let count = ((ratio * total as f64) + FLOOR_EPSILON).floor() as usize;
        let count = count.min(remaining);
        remaining -= count;
        sizes.push(count);
    }
    if !ratios.is_empty() {
        sizes.push(remaining);
    }
    sizes
}

/// Divide `items` into one sublist per ratio, in ratio order.
///
/// The sublists are disjoint and their lengths sum to `items.len()`.
pub fn split_by_ratios<T>(
    mut items: Vec<T>,
    ratios: &[f64],
    rng: Option<&mut (dyn RngCore + '_)>,
) -> Result<Vec<Vec<T>>> {
    validate_ratios(ratios)?;

    if let Some(rng) = rng {
        items.shuffle(rng);
    }

    let sizes = bucket_sizes(items.len(), ratios);
    let mut rest = items.into_iter();
    let divided: Vec<Vec<T>> = sizes
        .iter()
        .map(|&count| rest.by_ref().take(count).collect())
        .collect();

    info!(
        "Divided list into {} parts with ratios {:?}",
        divided.len(),
        ratios
    );
    Ok(divided)
}

/// Divide `items` into `parts` near-equal sublists.
pub fn split_by_n_parts<T>(
    items: Vec<T>,
    parts: usize,
    rng: Option<&mut (dyn RngCore + '_)>,
) -> Result<Vec<Vec<T>>> {
    let ratios = ratios_from_parts(parts)?;
    split_by_ratios(items, &ratios, rng)
}

/// Divide `items` into sublists of at most `size` elements; the last one
/// holds the remainder.
pub fn split_by_size<T>(
    items: Vec<T>,
    size: usize,
    rng: Option<&mut (dyn RngCore + '_)>,
) -> Result<Vec<Vec<T>>> {
    let ratios = size_ratios_for_split(items.len(), size)?;
    info!(
        "Dividing list into {} parts of {} elements max.",
        ratios.len(),
        size
    );
    split_by_ratios(items, &ratios, rng)
}

/// Bucket names paired with their proportions, in iteration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRatios(Vec<(String, f64)>);

impl NamedRatios {
    pub fn new(entries: Vec<(String, f64)>) -> Result<Self> {
        if entries.is_empty() {
            return Err(PartitionError::invalid_argument(
                "at least one named ratio is required",
            ));
        }
        let mut seen = HashSet::new();
        if let Some((dup, _)) = entries.iter().find(|(name, _)| !seen.insert(name.as_str())) {
            return Err(PartitionError::invalid_argument(format!(
                "split name '{}' given more than once",
                dup
            )));
        }
        Ok(Self(entries))
    }

    /// Pair `names` with `ratios`, or with equal shares when `ratios` is
    /// `None`.
    pub fn from_parts(names: &[&str], ratios: Option<&[f64]>) -> Result<Self> {
        let ratios = match ratios {
            Some(r) => r.to_vec(),
            None => ratios_from_parts(names.len())?,
        };
        if ratios.len() != names.len() {
            return Err(PartitionError::invalid_argument(format!(
                "number of ratios ({}) must match number of named parts ({})",
                ratios.len(),
                names.len()
            )));
        }
        Self::new(
            names
                .iter()
                .map(|n| n.to_string())
                .zip(ratios)
                .collect(),
        )
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn ratios(&self) -> Vec<f64> {
        self.0.iter().map(|(_, r)| *r).collect()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, r)| *r)
    }
}

impl Default for NamedRatios {
    fn default() -> Self {
        Self(vec![
            ("train".to_string(), 0.8),
            ("valid".to_string(), 0.1),
            ("test".to_string(), 0.1),
        ])
    }
}

/// Split `items` by named proportions, returning `(name, sublist)` pairs in
/// the order of `named`.
pub fn split_by_named_ratios<T>(
    items: Vec<T>,
    named: &NamedRatios,
    rng: Option<&mut (dyn RngCore + '_)>,
) -> Result<Vec<(String, Vec<T>)>> {
    info!(
        "Dividing list into named parts {:?} with ratios {:?}",
        named.names().collect::<Vec<_>>(),
        named.ratios()
    );
    let lists = split_by_ratios(items, &named.ratios(), rng)?;
    Ok(named.names().map(str::to_string).zip(lists).collect())
}

/// Split two index-aligned collections with one permutation and one set of
/// bucket boundaries, so `left[i]` and `right[i]` always share a bucket.
pub fn split_paired_by_named_ratios<A, B>(
    left: Vec<A>,
    right: Vec<B>,
    named: &NamedRatios,
    rng: Option<&mut (dyn RngCore + '_)>,
) -> Result<Vec<(String, Vec<A>, Vec<B>)>> {
    if left.len() != right.len() {
        return Err(PartitionError::CorrespondenceViolation(format!(
            "paired collections differ in size ({} vs {})",
            left.len(),
            right.len()
        )));
    }
    let zipped: Vec<(A, B)> = left.into_iter().zip(right).collect();
    Ok(split_by_named_ratios(zipped, named, rng)?
        .into_iter()
        .map(|(name, pairs)| {
            let (a, b): (Vec<A>, Vec<B>) = pairs.into_iter().unzip();
            (name, a, b)
        })
        .collect())
}
