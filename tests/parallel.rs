//! Kernels on the rayon path.
//!
//! Forcing the parallel path means lowering the process-wide threshold, so
//! these tests live in their own binary and take turns through `LOCK`.

use briny_rt::config::{DEFAULT_PARALLEL_THRESHOLD, set_parallel_threshold};
use briny_rt::ops::broadcast::BroadcastClassification;
use briny_rt::ops::dispatch::MUL_KERNELS;
use briny_rt::ops::mul::{try_mul_out, try_mul_scalar_out};
use briny_rt::tensors::{DType, HostTensor, Scalar};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, MutexGuard, PoisonError};

static LOCK: Mutex<()> = Mutex::new(());

/// Threshold 0 for as long as it lives.
struct ForceParallel {
    _lock: MutexGuard<'static, ()>,
}

impl ForceParallel {
    fn new() -> Self {
        let guard = LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        set_parallel_threshold(0);
        Self { _lock: guard }
    }
}

impl Drop for ForceParallel {
    fn drop(&mut self) {
        set_parallel_threshold(DEFAULT_PARALLEL_THRESHOLD);
    }
}

fn random_f32(rng: &mut StdRng, n: usize) -> Vec<f32> {
    (0..n).map(|_| rng.random_range(-10.0f32..10.0)).collect()
}

#[test]
fn test_row_broadcast_in_parallel() {
    let (rows, cols) = (64, 257);
    let mut rng = StdRng::seed_from_u64(23);
    let a = random_f32(&mut rng, rows * cols);
    let b = random_f32(&mut rng, cols);
    let expected: Vec<f32> = (0..rows * cols).map(|i| a[i] * b[i % cols]).collect();

    let a = HostTensor::new(&[rows, cols], a);
    let b = HostTensor::new(&[cols], b);
    let _parallel = ForceParallel::new();

    let mut out = HostTensor::zeros(DType::F32, &[rows, cols]);
    try_mul_out(&a, &b, &mut out).unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), expected);

    let mut generic = HostTensor::zeros(DType::F32, &[rows, cols]);
    MUL_KERNELS
        .lookup(BroadcastClassification::GenericNd, DType::F32, DType::F32, DType::F32)
        .unwrap()
        .run(&a, &b, &mut generic);
    assert_eq!(generic.to_vec::<f32>().unwrap(), expected);
}

#[test]
fn test_promoting_scalar_in_parallel() {
    let n = 10_003;
    let a = HostTensor::new(&[n], (0..n as i32).collect::<Vec<_>>());
    let _parallel = ForceParallel::new();

    let mut out = HostTensor::zeros(DType::F32, &[n]);
    try_mul_scalar_out(&a, Scalar::Float(0.5), &mut out).unwrap();
    let expected: Vec<f32> = (0..n).map(|i| i as f32 * 0.5).collect();
    assert_eq!(out.to_vec::<f32>().unwrap(), expected);
}

#[test]
fn test_mixed_dtypes_in_parallel() {
    let (rows, cols) = (40, 130);
    let mut rng = StdRng::seed_from_u64(7);
    let a: Vec<i32> = (0..rows * cols).map(|_| rng.random_range(-100..100)).collect();
    let b = random_f32(&mut rng, cols);
    let expected: Vec<f32> = (0..rows * cols)
        .map(|i| a[i] as f32 * b[i % cols])
        .collect();

    let a = HostTensor::new(&[rows, cols], a);
    let b = HostTensor::new(&[cols], b);
    let _parallel = ForceParallel::new();

    let mut out = HostTensor::zeros(DType::F32, &[rows, cols]);
    try_mul_out(&a, &b, &mut out).unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), expected);
}
