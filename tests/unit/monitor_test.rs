//! Tests for action monitors

use elastic_runtime_core::core::{
    ActionEvent, ActionMonitor, ChannelMonitor, FailureReason, RecordingMonitor, WorkerKey,
};
use elastic_runtime_core::data::DataLocation;

#[test]
fn test_events_serialize_with_tag() {
    let event = ActionEvent::Assigned {
        action: 4,
        worker: WorkerKey::permanent("node1"),
        implementation: 1,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "assigned");
    assert_eq!(json["worker"]["name"], "node1");

    let failed = ActionEvent::Failed {
        action: 5,
        reason: FailureReason::NodeLost,
    };
    let back: ActionEvent = serde_json::from_str(&serde_json::to_string(&failed).unwrap()).unwrap();
    assert_eq!(back, failed);
}

#[test]
fn test_terminal_classification() {
    assert!(ActionEvent::Completed { action: 1 }.is_terminal());
    assert!(ActionEvent::Cancelled { action: 1 }.is_terminal());
    assert!(!ActionEvent::Ready { action: 1 }.is_terminal());
    assert!(!ActionEvent::ValueProduced {
        action: 1,
        name: "out".into(),
        data_type: "file".into(),
        location: DataLocation::private("h", "/out"),
    }
    .is_terminal());
}

#[test]
fn test_recording_monitor_filters_by_action() {
    let monitor = RecordingMonitor::new(16);
    monitor.on_event(&ActionEvent::Created { action: 1 });
    monitor.on_event(&ActionEvent::Created { action: 2 });
    monitor.on_event(&ActionEvent::Ready { action: 1 });
    assert_eq!(
        monitor.events_for(1),
        vec![
            ActionEvent::Created { action: 1 },
            ActionEvent::Ready { action: 1 }
        ]
    );
}

#[test]
fn test_channel_monitor_across_threads() {
    let (monitor, rx) = ChannelMonitor::channel();
    let handle = std::thread::spawn(move || {
        for action in 0..10 {
            monitor.on_event(&ActionEvent::Created { action });
        }
    });
    handle.join().unwrap();
    let received: Vec<u64> = rx.try_iter().map(|e| e.action()).collect();
    assert_eq!(received, (0..10).collect::<Vec<_>>());
}
