//! Tests for agent request models

use elastic_runtime_core::core::{ProcessorKind, ResourceDescriptor};
use elastic_runtime_core::data::DataLocation;
use elastic_runtime_core::runtime::{RemoteDataRequest, RemoteSource, ResourceOffer, TaskRequest};

#[test]
fn test_resource_offer_from_json() {
    let json = r#"{
        "name": "node1",
        "description": { "cpu": 4, "gpu": 1 },
        "adaptor": { "adaptor": "comm", "properties": { "port": "46101" } }
    }"#;
    let offer: ResourceOffer = serde_json::from_str(json).unwrap();
    assert_eq!(offer.name, "node1");
    assert_eq!(offer.description.get(ProcessorKind::Cpu), 4);
    assert_eq!(offer.description.get(ProcessorKind::Gpu), 1);
    assert_eq!(offer.adaptor.properties["port"], "46101");
}

#[test]
fn test_remote_data_request_sources() {
    let json = r#"{
        "renaming": "d1v2",
        "sources": [
            { "kind": "location", "location": { "type": "private", "host": "node2", "path": "/tmp/d1v2" } },
            { "kind": "local_alias", "name": "d1v1" }
        ]
    }"#;
    let request: RemoteDataRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.sources.len(), 2);
    assert_eq!(
        request.sources[0],
        RemoteSource::Location {
            location: DataLocation::private("node2", "/tmp/d1v2"),
            resource: None,
        }
    );
}

#[test]
fn test_task_request_defaults() {
    let json = r#"{
        "submission": {
            "implementations": [ { "requirement": { "cpu": 1 }, "handler": "app.Main.run" } ]
        }
    }"#;
    let request: TaskRequest = serde_json::from_str(json).unwrap();
    assert!(request.resources.is_empty());
    assert!(request.remote_data.is_empty());
    assert_eq!(request.submission.implementations[0].requirement, ResourceDescriptor::cpus(1));
    assert_eq!(request.submission.priority, 0);
}
