//! Tests for error types

use elastic_runtime_core::core::{AppResult, CoreError, ProcessorKind};

#[test]
fn test_unknown_resource_error() {
    let err = CoreError::UnknownResource("node1".to_string());
    assert_eq!(format!("{err}"), "unknown resource: node1");
}

#[test]
fn test_capacity_underflow_error() {
    let err = CoreError::CapacityUnderflow {
        kind: ProcessorKind::Gpu,
        available: 1,
        requested: 2,
    };
    assert_eq!(
        format!("{err}"),
        "capacity underflow on gpu: requested 2, available 1"
    );
}

#[test]
fn test_rescue_failure_error() {
    let err = CoreError::DataRescueFailure {
        data: "d1".to_string(),
        reason: "disk full".to_string(),
    };
    assert_eq!(format!("{err}"), "rescue of data `d1` failed: disk full");
}

#[test]
fn test_no_data_sources_error() {
    let err = CoreError::NoDataSources("d2".to_string());
    assert_eq!(format!("{err}"), "could not add any source for data d2");
}

#[test]
fn test_core_error_converts_into_app_result() {
    fn edge() -> AppResult<()> {
        Err(CoreError::UnknownAction(7).into())
    }
    let err = edge().unwrap_err();
    assert_eq!(err.to_string(), "unknown action: 7");
    assert_eq!(err.downcast_ref::<CoreError>(), Some(&CoreError::UnknownAction(7)));
}
