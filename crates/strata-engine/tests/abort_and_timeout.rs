//! Integration test: failure propagation and teardown.
//!
//! A kernel failure or a harvest timeout must surface as the run's
//! error, and either way no node may outlive the run and no cell may be
//! left in the arena.

use std::sync::Arc;
use std::time::Duration;

use strata_core::{EngineError, KernelError};
use strata_engine::{ConfigError, LocalService, Mesh, MeshConfig};
use strata_kernel::Kernel;
use strata_test_utils::{FailingKernel, SlowKernel, StepCounter};

fn setup(kernel: impl Kernel, config: MeshConfig) -> (Arc<LocalService>, Mesh) {
    let service = Arc::new(LocalService::new(config.arena.clone()));
    let mesh = Mesh::new(service.clone(), Arc::new(kernel), config).unwrap();
    (service, mesh)
}

#[test]
fn kernel_failure_is_the_root_cause() {
    let (service, mesh) = setup(FailingKernel::at(3, 2), MeshConfig::default());
    match mesh.init_execute(9, 4) {
        Err(EngineError::KernelFailure {
            kernel,
            reason: KernelError::ExecutionFailed { reason },
        }) => {
            assert_eq!(kernel, "failing");
            assert!(reason.contains("column 3"), "{reason}");
        }
        other => panic!("expected KernelFailure, got {other:?}"),
    }
    assert_eq!(service.live_nodes(), 0);
    assert_eq!(mesh.arena().live(), 0);
}

#[test]
fn failure_in_the_first_step_tears_down() {
    let (service, mesh) = setup(FailingKernel::at(0, 1), MeshConfig::default());
    match mesh.init_execute(5, 3) {
        Err(EngineError::KernelFailure { kernel, .. }) => assert_eq!(kernel, "failing"),
        other => panic!("expected KernelFailure, got {other:?}"),
    }
    assert_eq!(service.live_nodes(), 0);
    assert_eq!(mesh.arena().live(), 0);
}

#[test]
fn mesh_is_reusable_after_failure() {
    let service = Arc::new(LocalService::new(Default::default()));
    let failing = Mesh::new(
        service.clone(),
        Arc::new(FailingKernel::at(2, 2)),
        MeshConfig::default(),
    )
    .unwrap();
    assert!(failing.init_execute(6, 3).is_err());

    let healthy = Mesh::new(
        service.clone(),
        Arc::new(StepCounter::new()),
        MeshConfig::default(),
    )
    .unwrap();
    let out = healthy.init_execute(6, 3).unwrap();
    assert_eq!(out.results.len(), 6);
    healthy.release(&out.results);
    assert_eq!(service.live_nodes(), 0);
    assert_eq!(healthy.arena().live(), 0);
}

#[test]
fn harvest_timeout_aborts_slow_run() {
    let config = MeshConfig {
        harvest_timeout: Some(Duration::from_millis(20)),
        ..MeshConfig::default()
    };
    let (service, mesh) = setup(SlowKernel::new(Duration::from_millis(50)), config);
    match mesh.init_execute(5, 4) {
        Err(EngineError::Timeout { waited }) => {
            assert_eq!(waited, Duration::from_millis(20));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert_eq!(service.live_nodes(), 0);
    assert_eq!(mesh.arena().live(), 0);
}

#[test]
fn generous_timeout_lets_run_finish() {
    let config = MeshConfig {
        harvest_timeout: Some(Duration::from_secs(30)),
        ..MeshConfig::default()
    };
    let (_service, mesh) = setup(SlowKernel::new(Duration::from_millis(1)), config);
    let out = mesh.init_execute(5, 2).unwrap();
    assert_eq!(out.results.len(), 5);
    mesh.release(&out.results);
    assert_eq!(mesh.arena().live(), 0);
}

// ── Construction errors ─────────────────────────────────────────────

#[test]
fn even_stencil_width_is_rejected() {
    let config = MeshConfig {
        stencil_width: 4,
        ..MeshConfig::default()
    };
    let service = Arc::new(LocalService::new(config.arena.clone()));
    match Mesh::new(service, Arc::new(StepCounter::new()), config) {
        Err(ConfigError::InvalidStencilWidth { width: 4 }) => {}
        other => panic!("expected InvalidStencilWidth, got {other:?}"),
    }
}

#[test]
fn single_row_is_rejected() {
    let config = MeshConfig {
        rows_per_level: 1,
        ..MeshConfig::default()
    };
    let service = Arc::new(LocalService::new(config.arena.clone()));
    match Mesh::new(service, Arc::new(StepCounter::new()), config) {
        Err(ConfigError::TooFewRows { rows: 1 }) => {}
        other => panic!("expected TooFewRows, got {other:?}"),
    }
}
