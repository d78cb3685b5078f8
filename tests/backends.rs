//! End-to-end equivalence of the serial, thread and process backends.

use std::collections::HashMap;
use std::path::PathBuf;

use crossbeam::channel::Sender;
use ndarray::Array3;

use halo_pipeline::chunking::ChunkSpec;
use halo_pipeline::filters::to_u8;
use halo_pipeline::pool::ProcessPool;
use halo_pipeline::task::{CancelToken, ChunkOutcome, ChunkTask, Job};
use halo_pipeline::{
    run_pipeline, Backend, FilterStep, Pipeline, PipelineError, PoolConfig, PoolManager, WorkerPool,
};

const BACKENDS: [Backend; 3] = [Backend::Serial, Backend::Threads, Backend::Processes];

fn worker_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_halo-worker"))
}

fn manager() -> PoolManager {
    PoolManager::new(PoolConfig::default().with_worker_program(worker_bin()))
}

/// 60x80 RGB gradient: (i*255/(h-1), j*255/(w-1), (i+j)*255/(2(w-1))).
fn gradient_image() -> Array3<f32> {
    let (h, w) = (60usize, 80usize);
    Array3::from_shape_fn((h, w, 3), |(i, j, c)| match c {
        0 => i as f32 * 255.0 / (h - 1) as f32,
        1 => j as f32 * 255.0 / (w - 1) as f32,
        _ => (i + j) as f32 * 255.0 / (2 * (w - 1)) as f32,
    })
}

fn full_pipeline() -> Pipeline {
    let steps = vec![
        ("grayscale", HashMap::new()),
        ("gaussian", HashMap::new()),
        ("sobel", HashMap::new()),
        ("sharpen", HashMap::from([("alpha".to_string(), 1.0)])),
        ("brightness", HashMap::from([("delta".to_string(), -10.0)])),
    ];
    Pipeline::from_steps(&steps).unwrap()
}

fn assert_close(a: &Array3<f32>, b: &Array3<f32>, label: &str) {
    assert_eq!(a.dim(), b.dim(), "{}: shape", label);
    let (qa, qb) = (to_u8(a.view()), to_u8(b.view()));
    for ((idx, &x), &y) in qa.indexed_iter().zip(qb.iter()) {
        assert!(
            (x as i16 - y as i16).abs() <= 1,
            "{}: pixel {:?} differs: {} vs {}",
            label,
            idx,
            x,
            y
        );
    }
}

// ============================================================================
// Equivalence
// ============================================================================

#[test]
fn test_gradient_all_backends_agree() {
    let img = gradient_image();
    let pipeline = full_pipeline();
    let serial = run_pipeline(img.view(), &pipeline).unwrap();
    assert_eq!(serial.dim(), (60, 80, 1));

    let manager = manager();
    for backend in BACKENDS {
        for workers in [1, 2, 4] {
            let out = manager.run(img.view(), &pipeline, workers, backend).unwrap();
            assert_close(&out, &serial, &format!("{} x{}", backend, workers));
        }
    }
}

#[test]
fn test_worker_count_above_height_is_clamped() {
    let img = gradient_image();
    let pipeline: Pipeline = "gaussian,sharpen:1.0,brightness:-10".parse().unwrap();
    let serial = run_pipeline(img.view(), &pipeline).unwrap();

    let manager = manager();
    for backend in [Backend::Threads, Backend::Processes] {
        let out = manager.run(img.view(), &pipeline, 100, backend).unwrap();
        assert_close(&out, &serial, &format!("{} x100", backend));
        assert_eq!(manager.current(), Some((backend, 60)));
    }
}

#[test]
fn test_one_row_chunks_diverge_through_sobel() {
    // Every chunk rescales Sobel to its own peak, so one-row cores near the
    // image border come out brighter than in the whole-image run.
    let img = gradient_image();
    let pipeline = full_pipeline();
    let serial = to_u8(run_pipeline(img.view(), &pipeline).unwrap().view());

    let manager = manager();
    for backend in [Backend::Threads, Backend::Processes] {
        let out = manager.run(img.view(), &pipeline, 100, backend).unwrap();
        assert_eq!(manager.current(), Some((backend, 60)));

        let out = to_u8(out.view());
        let max_diff = out
            .iter()
            .zip(serial.iter())
            .map(|(&a, &b)| (a as i16 - b as i16).abs())
            .max()
            .unwrap_or(0);
        assert!(max_diff > 1, "{}: expected per-chunk normalization drift, got {}", backend, max_diff);
    }
}

#[test]
fn test_uniform_image_is_blur_fixed_point() {
    let img = Array3::<f32>::from_elem((8, 8, 1), 100.0);
    let pipeline: Pipeline = "gaussian".parse().unwrap();

    let manager = manager();
    for backend in BACKENDS {
        let out = manager.run(img.view(), &pipeline, 4, backend).unwrap();
        assert!(out.iter().all(|&v| v == 100.0), "{}", backend);
    }
}

#[test]
fn test_unknown_step_fails_every_backend() {
    let img = gradient_image();
    let manager = manager();

    for backend in BACKENDS {
        let result = Pipeline::from_steps(&[("gaussian", HashMap::new()), ("invert", HashMap::new())])
            .and_then(|pipeline| manager.run(img.view(), &pipeline, 2, backend));
        match result {
            Err(PipelineError::InvalidStep(name)) => assert_eq!(name, "invert"),
            other => panic!("{}: expected InvalidStep, got {:?}", backend, other.map(|a| a.dim())),
        }
    }
}

// ============================================================================
// Pool Lifecycle
// ============================================================================

#[test]
fn test_process_pool_is_reused_then_rebuilt() {
    let img = gradient_image();
    let pipeline: Pipeline = "gaussian".parse().unwrap();
    let manager = manager();

    manager.run(img.view(), &pipeline, 2, Backend::Processes).unwrap();
    manager.run(img.view(), &pipeline, 2, Backend::Processes).unwrap();
    assert_eq!(manager.builds(), 1);

    manager.run(img.view(), &pipeline, 3, Backend::Processes).unwrap();
    assert_eq!(manager.builds(), 2);
    assert_eq!(manager.current(), Some((Backend::Processes, 3)));

    manager.run(img.view(), &pipeline, 3, Backend::Threads).unwrap();
    assert_eq!(manager.builds(), 3);
    assert_eq!(manager.current(), Some((Backend::Threads, 3)));
}

#[test]
fn test_missing_worker_program_is_rebuild_error() {
    let manager = PoolManager::new(PoolConfig::default().with_worker_program("/nonexistent/halo-worker"));
    let img = gradient_image();

    let err = manager
        .run(img.view(), &"gaussian".parse().unwrap(), 2, Backend::Processes)
        .unwrap_err();

    assert!(matches!(err, PipelineError::PoolRebuild { backend: Backend::Processes, .. }));
    assert_eq!(manager.current(), None);
}

#[test]
fn test_concurrent_callers_share_one_manager() {
    let img = gradient_image();
    let pipeline: Pipeline = "gaussian,sharpen:1.0,brightness:-10".parse().unwrap();
    let serial = run_pipeline(img.view(), &pipeline).unwrap();
    let manager = manager();

    std::thread::scope(|scope| {
        for caller in 0..6 {
            let (img, pipeline, serial, manager) = (&img, &pipeline, &serial, &manager);
            scope.spawn(move || {
                for round in 0..6 {
                    let backend = if (caller + round) % 2 == 0 { Backend::Threads } else { Backend::Processes };
                    let workers = 1 + (caller + round) % 4;
                    let out = manager.run(img.view(), pipeline, workers, backend).unwrap();
                    assert_eq!(&out, serial, "caller {} round {}: {} x{}", caller, round, backend, workers);
                }
            });
        }
    });

    assert!(manager.current().is_some());
}

// ============================================================================
// Process Boundary
// ============================================================================

fn job(index: usize, buffer: Array3<f32>, steps: Vec<FilterStep>, reply: &Sender<ChunkOutcome>) -> Job {
    let rows = buffer.dim().0;
    Job {
        task: ChunkTask {
            index,
            buffer,
            spec: ChunkSpec { slice_start: 0, core_start: 0, core_end: rows, slice_end: rows },
            pipeline: Pipeline::new(steps),
        },
        cancel: CancelToken::new(),
        reply: reply.clone(),
    }
}

#[test]
fn test_worker_error_crosses_process_boundary() {
    let pool = ProcessPool::spawn(&worker_bin(), 1).unwrap();
    let (tx, rx) = crossbeam::channel::unbounded();

    // Two channels cannot be collapsed to luminance.
    pool.submit(job(7, Array3::zeros((3, 3, 2)), vec![FilterStep::Sobel], &tx)).unwrap();
    let outcome = rx.recv().unwrap();

    assert_eq!(outcome.index, 7);
    match outcome.result {
        Err(PipelineError::WorkerFailure { index, message }) => {
            assert_eq!(index, Some(7));
            assert!(message.contains("channel"), "{}", message);
        }
        other => panic!("unexpected outcome: {:?}", other.map(|a| a.dim())),
    }
    // A pipeline error leaves the child alive.
    assert!(pool.is_healthy());
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_unframable_chunk_keeps_worker_alive() {
    let pool = ProcessPool::spawn(&worker_bin(), 1).unwrap();
    let (tx, rx) = crossbeam::channel::unbounded();

    // No pixels, but an axis too long for the frame header.
    let wide = Array3::<f32>::zeros((0, u32::MAX as usize + 1, 1));
    pool.submit(job(0, wide, vec![FilterStep::GaussianBlur], &tx)).unwrap();
    let outcome = rx.recv().unwrap();
    assert!(matches!(outcome.result, Err(PipelineError::WorkerFailure { index: Some(0), .. })));
    assert!(pool.is_healthy());

    let buffer = Array3::from_elem((2, 2, 1), 5.0);
    pool.submit(job(1, buffer, vec![FilterStep::Brightness { delta: 1.0 }], &tx)).unwrap();
    let outcome = rx.recv().unwrap();
    assert_eq!(outcome.result.unwrap(), Array3::from_elem((2, 2, 1), 6.0));
}

#[test]
fn test_process_pool_matches_in_process_result() {
    let pool = ProcessPool::spawn(&worker_bin(), 2).unwrap();
    let (tx, rx) = crossbeam::channel::unbounded();
    let steps = vec![FilterStep::GaussianBlur, FilterStep::Brightness { delta: 3.5 }];
    let buffer = Array3::from_shape_fn((5, 6, 1), |(y, x, _)| (y * 6 + x) as f32);

    let expected = Pipeline::new(steps.clone()).apply(buffer.view()).unwrap();
    pool.submit(job(0, buffer, steps, &tx)).unwrap();

    let outcome = rx.recv().unwrap();
    assert_eq!(outcome.result.unwrap(), expected);
}

#[cfg(unix)]
#[test]
fn test_dead_workers_fail_queued_jobs() {
    // `false` exits at once without reading a frame.
    let pool = ProcessPool::spawn(std::path::Path::new("false"), 1).unwrap();
    let (tx, rx) = crossbeam::channel::unbounded();

    for index in 0..3 {
        pool.submit(job(index, Array3::zeros((2, 2, 1)), vec![], &tx)).unwrap();
    }
    drop(tx);

    let outcomes: Vec<_> = rx.iter().collect();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.result.is_err()));
    assert!(!pool.is_healthy());
}

#[cfg(unix)]
#[test]
fn test_unhealthy_process_pool_is_rebuilt() {
    let manager = PoolManager::new(PoolConfig::default().with_worker_program("false"));
    let img = Array3::<f32>::from_elem((4, 4, 1), 1.0);
    let pipeline: Pipeline = "gaussian".parse().unwrap();

    let first = manager.run(img.view(), &pipeline, 1, Backend::Processes);
    assert!(matches!(first, Err(PipelineError::WorkerFailure { .. })));

    let _ = manager.run(img.view(), &pipeline, 1, Backend::Processes);
    assert_eq!(manager.builds(), 2);
}
