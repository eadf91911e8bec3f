mod common;

use common::{TestCloud, full_stack};
use serde_json::json;
use std::time::Duration;
use vdcflow_cloud::{CloudError, DiskType};
use vdcflow_engine::{EngineError, ResourceKind};

async fn installed() -> TestCloud {
    let env = TestCloud::without_retry();
    env.load(full_stack()).await;
    env.runtime.install_all().await.unwrap();
    env
}

#[tokio::test]
async fn test_install_creates_machine_with_forwards() {
    let env = installed().await;
    let remote = env.cloud.machine_by_name("vm1").unwrap();
    assert_eq!(remote.memory, 2048);
    assert_eq!(remote.vcpus, 2);
    assert_eq!(remote.status, "RUNNING");

    let space = env.cloud.space_by_name("vdc1").unwrap();
    let forwards = env.cloud.portforwards(space.id);
    assert_eq!(forwards.len(), 1);
    assert_eq!(forwards[0].public_port, 2222);
    assert_eq!(forwards[0].local_port, 22);
    assert_eq!(forwards[0].machine_id, remote.id);

    let info = env
        .runtime
        .get_info(ResourceKind::Machine, "vm1")
        .await
        .unwrap();
    assert_eq!(info["machineID"], remote.id);
    assert_eq!(info["ipPublic"], json!(space.external_network_ip));
}

#[tokio::test]
async fn test_power_actions() {
    let env = installed().await;

    let out = env
        .run(ResourceKind::Machine, "vm1", "stop", json!({}))
        .await;
    assert_eq!(out["status"], "HALTED");
    assert_eq!(env.cloud.machine_by_name("vm1").unwrap().status, "HALTED");

    let out = env
        .run(ResourceKind::Machine, "vm1", "start", json!({}))
        .await;
    assert_eq!(out["status"], "RUNNING");
    assert_eq!(env.cloud.machine_by_name("vm1").unwrap().status, "RUNNING");
}

#[tokio::test]
async fn test_snapshot_rollback_requires_halted_machine() {
    let env = installed().await;

    let first = env
        .run(ResourceKind::Machine, "vm1", "snapshot", json!({"name": "before"}))
        .await;
    assert_eq!(first["name"], "before");
    let second = env
        .run(ResourceKind::Machine, "vm1", "snapshot", json!({}))
        .await;
    assert!(second["name"].as_str().unwrap().starts_with("vm1-"));

    let listed = env
        .run(ResourceKind::Machine, "vm1", "snapshot_list", json!({}))
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 2);

    let epoch = first["epoch"].clone();
    let err = env
        .runtime
        .execute(
            ResourceKind::Machine,
            "vm1",
            "snapshot_rollback",
            json!({"snapshotEpoch": epoch}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
    assert_eq!(env.cloud.call_count("rollback_snapshot"), 0);

    env.run(ResourceKind::Machine, "vm1", "stop", json!({})).await;
    env.run(
        ResourceKind::Machine,
        "vm1",
        "snapshot_rollback",
        json!({"epoch": epoch}),
    )
    .await;
    let listed = env
        .run(ResourceKind::Machine, "vm1", "snapshot_list", json!({}))
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    env.run(
        ResourceKind::Machine,
        "vm1",
        "snapshot_delete",
        json!({"snapshotEpoch": epoch}),
    )
    .await;
    let listed = env
        .run(ResourceKind::Machine, "vm1", "snapshot_list", json!({}))
        .await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_attach_and_detach_data_disk() {
    let env = installed().await;
    let info = env
        .runtime
        .get_info(ResourceKind::Disk, "data1")
        .await
        .unwrap();
    let disk_id = info["diskId"].as_u64().unwrap();
    let remote = env.cloud.disk(disk_id).unwrap();
    assert_eq!(remote.size, 20);
    assert_eq!(remote.iotune.total_iops_sec, Some(500));

    let out = env
        .run(ResourceKind::Machine, "vm1", "disk_attach", json!({"disk": "data1"}))
        .await;
    assert_eq!(out["diskId"], disk_id);
    let machine = env.cloud.machine_by_name("vm1").unwrap();
    assert!(machine.disks.contains(&disk_id));

    env.run(ResourceKind::Machine, "vm1", "disk_detach", json!({"disk": "data1"}))
        .await;
    let machine = env.cloud.machine_by_name("vm1").unwrap();
    assert!(!machine.disks.contains(&disk_id));
    let info = env
        .runtime
        .get_info(ResourceKind::Machine, "vm1")
        .await
        .unwrap();
    assert!(!info["disks"].as_array().unwrap().contains(&json!(disk_id)));
}

#[tokio::test]
async fn test_disk_add_then_delete() {
    let env = installed().await;

    let out = env
        .run(
            ResourceKind::Machine,
            "vm1",
            "disk_add",
            json!({"name": "scratch", "size": 50}),
        )
        .await;
    let disk_id = out["diskId"].as_u64().unwrap();
    let disk = env.cloud.disk(disk_id).unwrap();
    assert_eq!(disk.disk_type, DiskType::Data);
    assert_eq!(disk.size, 50);
    assert!(env.cloud.machine_by_name("vm1").unwrap().disks.contains(&disk_id));

    env.run(
        ResourceKind::Machine,
        "vm1",
        "disk_delete",
        json!({"diskId": disk_id}),
    )
    .await;
    assert!(env.cloud.disk(disk_id).is_none());
    assert_eq!(env.cloud.call_count("detach_disk"), 1);
}

#[tokio::test]
async fn test_boot_disk_is_protected() {
    let env = installed().await;
    let boot = env.cloud.machine_by_name("vm1").unwrap().boot_disk_id;

    let err = env
        .runtime
        .execute(
            ResourceKind::Machine,
            "vm1",
            "disk_delete",
            json!({"diskId": boot}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Precondition(_)));
    assert!(env.cloud.disk(boot).is_some());

    let err = env
        .runtime
        .execute(
            ResourceKind::Machine,
            "vm1",
            "disk_add",
            json!({"name": "boot2", "type": "B"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "type"));
}

#[tokio::test]
async fn test_machine_portforward_actions() {
    let env = installed().await;
    let space = env.cloud.space_by_name("vdc1").unwrap();

    let out = env
        .run(
            ResourceKind::Machine,
            "vm1",
            "portforward_create",
            json!({"ports": [{"source": 2222, "destination": 22}, {"source": 8443, "destination": 443}]}),
        )
        .await;
    assert_eq!(out["changed"], 1);
    assert_eq!(env.cloud.portforwards(space.id).len(), 2);

    let out = env
        .run(
            ResourceKind::Machine,
            "vm1",
            "portforward_delete",
            json!({"ports": [{"source": 2222, "destination": 22}]}),
        )
        .await;
    assert_eq!(out["changed"], 1);
    let info = env
        .runtime
        .get_info(ResourceKind::Machine, "vm1")
        .await
        .unwrap();
    assert_eq!(info["ports"].as_array().unwrap().len(), 1);
    assert_eq!(info["ports"][0]["source"], 8443);

    let err = env
        .runtime
        .execute(
            ResourceKind::Machine,
            "vm1",
            "portforward_create",
            json!({"ports": [{"source": 0, "destination": 22}]}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "ports"));
}

#[tokio::test]
async fn test_vdc_portforward_for_machine() {
    let env = installed().await;
    let space = env.cloud.space_by_name("vdc1").unwrap();
    let args = json!({"machine": "vm1", "ports": [{"source": 8080, "destination": 80}]});

    let out = env
        .run(
            ResourceKind::VirtualDatacenter,
            "vdc1",
            "portforward_create",
            args.clone(),
        )
        .await;
    assert_eq!(out["changed"], 1);
    let out = env
        .run(
            ResourceKind::VirtualDatacenter,
            "vdc1",
            "portforward_create",
            args.clone(),
        )
        .await;
    assert_eq!(out["changed"], 0);
    assert_eq!(env.cloud.portforwards(space.id).len(), 2);

    let out = env
        .run(
            ResourceKind::VirtualDatacenter,
            "vdc1",
            "portforward_delete",
            args,
        )
        .await;
    assert_eq!(out["changed"], 1);
    assert_eq!(env.cloud.portforwards(space.id).len(), 1);
}

#[tokio::test]
async fn test_machine_update() {
    let env = installed().await;

    let changed = env
        .run(ResourceKind::Machine, "vm1", "update", json!({"memory": 4096}))
        .await;
    assert_eq!(changed, json!(true));
    assert_eq!(env.cloud.machine_by_name("vm1").unwrap().memory, 4096);
    assert_eq!(env.cloud.call_count("save_machine"), 1);

    let changed = env
        .run(ResourceKind::Machine, "vm1", "update", json!({"vcpus": 2}))
        .await;
    assert_eq!(changed, json!(false));
    assert_eq!(env.cloud.call_count("save_machine"), 1);
}

#[tokio::test]
async fn test_disk_update_limits_and_size() {
    let env = installed().await;

    let err = env
        .runtime
        .execute(
            ResourceKind::Disk,
            "data1",
            "update",
            json!({"readIopsSec": 100}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
    assert_eq!(env.cloud.call_count("set_disk_limit_io"), 1);

    let changed = env
        .run(
            ResourceKind::Disk,
            "data1",
            "update",
            json!({"totalBytesSec": 1000}),
        )
        .await;
    assert_eq!(changed, json!(true));
    assert_eq!(env.cloud.call_count("set_disk_limit_io"), 1);
    assert_eq!(env.cloud.call_count("save_disk"), 1);

    let err = env
        .runtime
        .execute(ResourceKind::Disk, "data1", "update", json!({"size": 5}))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "size"));

    env.run(ResourceKind::Disk, "data1", "update", json!({"size": 40}))
        .await;
    let info = env
        .runtime
        .get_info(ResourceKind::Disk, "data1")
        .await
        .unwrap();
    let remote = env.cloud.disk(info["diskId"].as_u64().unwrap()).unwrap();
    assert_eq!(remote.size, 40);
    assert_eq!(remote.iotune.total_bytes_sec, Some(1000));
    assert_eq!(remote.iotune.total_iops_sec, Some(500));
    assert_eq!(env.cloud.call_count("save_disk"), 2);
}

#[tokio::test]
async fn test_disk_update_saves_once_per_change() {
    let env = installed().await;
    env.cloud.clear_calls();

    let changed = env
        .run(
            ResourceKind::Disk,
            "data1",
            "update",
            json!({"description": "scratch"}),
        )
        .await;
    assert_eq!(changed, json!(true));
    assert_eq!(env.cloud.call_count("save_disk"), 1);

    let changed = env
        .run(
            ResourceKind::Disk,
            "data1",
            "update",
            json!({"size": 50, "totalBytesSec": 2000}),
        )
        .await;
    assert_eq!(changed, json!(true));
    assert_eq!(env.cloud.call_count("save_disk"), 2);
    assert_eq!(env.cloud.call_count("set_disk_limit_io"), 0);

    let changed = env
        .run(
            ResourceKind::Disk,
            "data1",
            "update",
            json!({"description": "scratch"}),
        )
        .await;
    assert_eq!(changed, json!(false));
    assert_eq!(env.cloud.call_count("save_disk"), 2);

    let info = env
        .runtime
        .get_info(ResourceKind::Disk, "data1")
        .await
        .unwrap();
    let remote = env.cloud.disk(info["diskId"].as_u64().unwrap()).unwrap();
    assert_eq!(remote.description, "scratch");
    assert_eq!(remote.size, 50);
    assert_eq!(remote.iotune.total_bytes_sec, Some(2000));
}

#[tokio::test]
async fn test_vdc_and_machine_actions_run_concurrently() {
    let env = installed().await;
    let forward = env.runtime.execute(
        ResourceKind::VirtualDatacenter,
        "vdc1",
        "portforward_create",
        json!({"machine": "vm1", "ports": [{"source": 8080, "destination": 80}]}),
    );
    let stop = env
        .runtime
        .execute(ResourceKind::Machine, "vm1", "stop", json!({}));

    let (forward, stop) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(forward, stop)
    })
    .await
    .expect("vdc and machine actions must not wait on each other");

    assert_eq!(forward.unwrap()["changed"], 1);
    assert_eq!(stop.unwrap()["status"], "HALTED");
}

#[tokio::test]
async fn test_vdc_portforward_for_unknown_machine() {
    let env = installed().await;
    let err = env
        .runtime
        .execute(
            ResourceKind::VirtualDatacenter,
            "vdc1",
            "portforward_create",
            json!({"machine": "vm9", "ports": [{"source": 8080, "destination": 80}]}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cloud(CloudError::NotFound(_))));
    assert_eq!(env.cloud.call_count("create_portforward"), 1);
}
