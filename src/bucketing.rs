//! Deterministic hashing and bucket range computation.
//!
//! Everything here is a pure function: the same inputs produce the same outputs on every
//! platform and across process restarts. This is what keeps a user in the same variation
//! across devices.
use serde::{Deserialize, Serialize};

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// Half-open range `[start, end)` of the hash space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct BucketRange {
    pub start: f64,
    pub end: f64,
}

impl BucketRange {
    pub fn new(start: f64, end: f64) -> BucketRange {
        BucketRange { start, end }
    }

    pub fn contains(&self, n: f64) -> bool {
        self.start <= n && n < self.end
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

impl From<(f64, f64)> for BucketRange {
    fn from((start, end): (f64, f64)) -> Self {
        BucketRange { start, end }
    }
}

impl From<BucketRange> for (f64, f64) {
    fn from(value: BucketRange) -> Self {
        (value.start, value.end)
    }
}

/// A shared slice of the hash space used to make experiments mutually exclusive.
///
/// On the wire it is a `[id, rangeStart, rangeEnd]` tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, f64, f64)", into = "(String, f64, f64)")]
pub struct Namespace {
    pub id: String,
    pub range: BucketRange,
}

impl From<(String, f64, f64)> for Namespace {
    fn from((id, start, end): (String, f64, f64)) -> Self {
        Namespace {
            id,
            range: BucketRange::new(start, end),
        }
    }
}

impl From<Namespace> for (String, f64, f64) {
    fn from(value: Namespace) -> Self {
        (value.id, value.range.start, value.range.end)
    }
}

/// 32-bit Fowler–Noll–Vo (FNV-1a) hash over UTF-16 code units.
pub fn fnv1a32(input: &str) -> u32 {
    input.encode_utf16().fold(FNV32_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV32_PRIME)
    })
}

/// Hash `value` with `seed` into a float in `[0, 1)`.
///
/// Returns `None` for unsupported hash versions.
///
/// ```
/// # use growthbook::bucketing::hash;
/// assert_eq!(hash("", "a", 1), Some(0.22));
/// assert_eq!(hash("b", "a", 1), Some(0.946));
/// assert_eq!(hash("", "a", 3), None);
/// ```
pub fn hash(seed: &str, value: &str, version: u32) -> Option<f64> {
    match version {
        1 => {
            let n = fnv1a32(&format!("{value}{seed}"));
            Some(f64::from(n % 1000) / 1000.0)
        }
        2 => {
            let first = fnv1a32(&format!("{seed}{value}"));
            let n = fnv1a32(&first.to_string());
            Some(f64::from(n % 10_000) / 10_000.0)
        }
        _ => None,
    }
}

/// Return `true` if `hash_value` falls into the namespace range.
pub fn in_namespace(hash_value: &str, namespace: &Namespace) -> bool {
    hash(&format!("__{}", namespace.id), hash_value, 1)
        .is_some_and(|n| namespace.range.contains(n))
}

/// Return `num_variations` weights that are all equal and sum to 1.
pub fn get_equal_weights(num_variations: usize) -> Vec<f64> {
    if num_variations == 0 {
        return Vec::new();
    }
    vec![1.0 / num_variations as f64; num_variations]
}

/// Convert coverage and variation weights into one bucket range per variation.
///
/// Coverage is clamped to `[0, 1]`. Weights fall back to equal weights if missing, if their
/// count does not match `num_variations`, or if they do not sum to 1 (±0.01).
///
/// Ranges are cumulative over the weights and each one is scaled by coverage, so users hashed
/// outside every range are excluded from the experiment.
pub fn get_bucket_ranges(
    num_variations: usize,
    coverage: f64,
    weights: Option<&[f64]>,
) -> Vec<BucketRange> {
    let coverage = if coverage.is_nan() {
        0.0
    } else {
        coverage.clamp(0.0, 1.0)
    };

    let weights = match weights {
        Some(w) if w.len() == num_variations && (0.99..=1.01).contains(&w.iter().sum::<f64>()) => {
            w.to_vec()
        }
        _ => get_equal_weights(num_variations),
    };

    let mut cumulative = 0.0;
    weights
        .into_iter()
        .map(|weight| {
            let start = cumulative;
            cumulative += weight;
            BucketRange::new(round4(start), round4(start + coverage * weight))
        })
        .collect()
}

/// Return index of the first range that contains `n`.
pub fn choose_variation(n: f64, ranges: &[BucketRange]) -> Option<usize> {
    ranges.iter().position(|range| range.contains(n))
}

fn round4(n: f64) -> f64 {
    (n * 10_000.0).round() / 10_000.0
}
