//! Deterministic matrix work unit.
//!
//! The service hands out a task as two seeds and a matrix size. The result is
//! produced by a fixed pipeline: LCG-style matrix fill for each seed, a
//! matrix product, a flatten-to-digits pass, and a SHA-256 hash reduced to a
//! small integer. Everything here is pure apart from the two timing reads in
//! [`compute_result`], so concurrent invocations always agree.

use std::fmt::Write as _;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::ComputeError;

/// Multiplier of the fill recurrence.
const LCG_A: u64 = 0x4b72e682d;
/// Increment of the fill recurrence.
const LCG_B: u64 = 0x2675dcd22;
/// Modulus applied to every generated element.
const LCG_MOD: u64 = 1000;

/// Modulus for the hash-reduce step.
pub const HASH_MODULUS: u64 = 10_000_000;

/// A unit of work fetched from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub matrix_size: usize,
    pub seed1: u64,
    pub seed2: u64,
    pub task_id: String,
}

/// The two derived values submitted back to the service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskResult {
    pub r1: f64,
    pub r2: f64,
}

/// Square matrix of f64 elements in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    size: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// Fill a `size` x `size` matrix from `seed`.
///
/// Each element is `(A * prev + B) mod 1000`, chained in row-major order
/// starting from the seed itself. No other randomness source is involved, so
/// two calls with the same inputs are bit-identical.
pub fn generate_matrix(seed: u64, size: usize) -> Matrix {
    let mut data = Vec::with_capacity(size * size);
    // The first step can overflow u64 for large seeds; widen once.
    let mut current = seed as u128;
    for _ in 0..size * size {
        let value = (LCG_A as u128 * current + LCG_B as u128) % LCG_MOD as u128;
        data.push(value as f64);
        current = value;
    }
    Matrix { size, data }
}

/// Standard matrix product of two square matrices of equal size.
pub fn multiply(a: &Matrix, b: &Matrix) -> Result<Matrix, ComputeError> {
    if a.size != b.size {
        return Err(ComputeError::DimensionMismatch {
            left: a.size,
            right: b.size,
        });
    }
    let n = a.size;
    let mut data = vec![0.0; n * n];
    for i in 0..n {
        for k in 0..n {
            let aik = a.data[i * n + k];
            for j in 0..n {
                data[i * n + j] += aik * b.data[k * n + j];
            }
        }
    }
    Ok(Matrix { size: n, data })
}

/// Concatenate every element rendered to its nearest integer, row-major,
/// with no separators.
pub fn flatten(matrix: &Matrix) -> String {
    let mut out = String::with_capacity(matrix.data.len() * 4);
    for value in &matrix.data {
        // Infallible for String targets.
        let _ = write!(out, "{value:.0}");
    }
    out
}

/// SHA-256 of `flat`, interpreted as a big-endian integer, modulo `modulus`.
pub fn hash_reduce(flat: &str, modulus: u64) -> u64 {
    let digest = Sha256::digest(flat.as_bytes());
    // Byte-wise fold keeps the reduction exact without a bigint dependency:
    // acc stays below modulus, so acc * 256 + byte fits comfortably in u64.
    digest
        .iter()
        .fold(0u64, |acc, &byte| (acc * 256 + byte as u64) % modulus)
}

/// Hash value for a task, before any timing enters the picture.
///
/// Deterministic for a given task: same seeds and size always reduce to the
/// same value.
pub fn task_hash(task: &TaskSpec) -> Result<u64, ComputeError> {
    let a = generate_matrix(task.seed1, task.matrix_size);
    let b = generate_matrix(task.seed2, task.matrix_size);
    let product = multiply(&a, &b)?;
    Ok(hash_reduce(&flatten(&product), HASH_MODULUS))
}

/// Run the full work unit and derive the two submitted values.
///
/// `r1` is the start timestamp in milliseconds divided by the hash; `r2` is
/// the hash divided by the elapsed milliseconds, defined as 0 when the
/// elapsed time rounds to zero. A zero hash makes `r1` undefined and fails
/// with [`ComputeError::DivideByZero`].
pub fn compute_result(task: &TaskSpec) -> Result<TaskResult, ComputeError> {
    let start_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64;
    let started = Instant::now();

    let hash = task_hash(task)?;
    if hash == 0 {
        return Err(ComputeError::DivideByZero);
    }

    let elapsed_ms = started.elapsed().as_millis() as f64;
    let r1 = start_ms / hash as f64;
    let r2 = if elapsed_ms == 0.0 {
        0.0
    } else {
        hash as f64 / elapsed_ms
    };
    Ok(TaskResult { r1, r2 })
}
