use ecs_saveload::{
    MigrationRegistry, OperationStatus, ProgressSink, SaveLoadError, SaveLoadParameters,
    SaveLoadRequest, SaveLoadService, Saveable, SaveableComponent, ScopeBound, World,
    spawn_worker,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Inventory {
    items: Vec<String>,
    gold: u64,
}

impl SaveableComponent for Inventory {
    const TYPE_NAME: &'static str = "game::Inventory";
}

fn service(dir: &Path, batch_size: usize) -> SaveLoadService {
    SaveLoadService::new(
        SaveLoadParameters::new("2.1.0", dir).batch_size(batch_size),
        Arc::new(MigrationRegistry::new()),
    )
    .unwrap()
    .with_component::<Inventory>()
    .unwrap()
}

fn populate(world: &mut World, count: u64) {
    for gold in 0..count {
        let entity = world.create_entity();
        world.insert(entity, Saveable);
        world.insert(
            entity,
            Inventory {
                items: vec![format!("item-{}", gold)],
                gold,
            },
        );
    }
}

fn total_gold(world: &World) -> u64 {
    world
        .entities_with::<Inventory>()
        .into_iter()
        .filter_map(|entity| world.get::<Inventory>(entity).map(|inv| inv.gold))
        .sum()
}

#[tokio::test]
async fn test_async_save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let service = service(dir.path(), 50);
    let mut world = World::new();
    populate(&mut world, 10);

    let report = service.save_async(&mut world, "slot", None).await.unwrap();
    assert_eq!(report.entities, 10);
    assert!(service.save_path("slot").exists());

    let mut world = World::new();
    let report = service.load_async(&mut world, "slot", None).await.unwrap();
    assert_eq!(report.entities, 10);
    assert_eq!(total_gold(&world), 45);
    assert_eq!(service.status(), OperationStatus::Idle);
}

#[tokio::test]
async fn test_async_load_reports_progress_per_batch() {
    let dir = TempDir::new().unwrap();
    let service = service(dir.path(), 3);
    let mut world = World::new();
    populate(&mut world, 7);
    let scoped = world.create_entity();
    world.insert(scoped, Saveable);
    world.insert(scoped, ScopeBound::new("DEFAULT"));
    world.insert(
        scoped,
        Inventory {
            items: Vec::new(),
            gold: 100,
        },
    );
    service.save_async(&mut world, "slot", None).await.unwrap();

    let values = Mutex::new(Vec::new());
    let sink: &ProgressSink<'_> = &|progress: f32| values.lock().unwrap().push(progress);
    let report = service
        .load_async(&mut world, "slot", Some(sink))
        .await
        .unwrap();
    assert_eq!(report.entities, 8);
    assert_eq!(total_gold(&world), 121);

    let values = values.into_inner().unwrap();
    // 0.1, 0.3, 0.4, three persistent batches, 0.7, one scope batch, 1.0, 1.0
    assert_eq!(values.len(), 10);
    assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(values.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(values.last(), Some(&1.0));
}

#[tokio::test]
async fn test_async_load_failure_tears_down_world() {
    let dir = TempDir::new().unwrap();
    let service = service(dir.path(), 10);
    let mut world = World::new();
    populate(&mut world, 2);

    let result = service.load_async(&mut world, "absent", None).await;
    assert!(matches!(result, Err(SaveLoadError::MissingWorldSnapshot(_))));
    assert!(world.is_empty());
    assert!(!service.is_busy());
}

#[tokio::test]
async fn test_async_operations_reject_overlap() {
    let dir = TempDir::new().unwrap();
    let service = service(dir.path(), 1);
    let mut world = World::new();
    populate(&mut world, 4);

    let observed = Mutex::new(Vec::new());
    let sink: &ProgressSink<'_> = &|_progress: f32| {
        let nested = service.save(&mut World::new(), "other");
        observed.lock().unwrap().push((
            service.status(),
            matches!(nested, Err(SaveLoadError::OperationInProgress)),
        ));
    };
    let report = service
        .save_async(&mut world, "slot", Some(sink))
        .await
        .unwrap();
    assert_eq!(report.entities, 4);
    assert_eq!(report.components_failed, 0);
    let observed = observed.into_inner().unwrap();
    assert_eq!(observed.len(), 3);
    assert!(
        observed
            .iter()
            .all(|(status, rejected)| *status == OperationStatus::Saving && *rejected)
    );
    assert!(!service.save_path("other").exists());

    // A second task polled between batch boundaries of a running load.
    let mut other = World::new();
    populate(&mut other, 1);
    let (loaded, overlapping) = tokio::join!(
        service.load_async(&mut world, "slot", None),
        async {
            tokio::task::yield_now().await;
            service.save_async(&mut other, "other", None).await
        }
    );
    let loaded = loaded.unwrap();
    assert_eq!(loaded.entities, 4);
    assert!(!loaded.had_errors());
    assert_eq!(total_gold(&world), 6);
    assert!(matches!(overlapping, Err(SaveLoadError::OperationInProgress)));
    assert!(!service.save_path("other").exists());
    assert_eq!(service.status(), OperationStatus::Idle);
}

#[tokio::test]
async fn test_request_worker_serves_saves_and_loads() {
    let dir = TempDir::new().unwrap();
    let mut world = World::new();
    populate(&mut world, 4);

    let (sender, worker) = spawn_worker(service(dir.path(), 2), world, 8);

    let saved = sender.save("slot").await.unwrap();
    assert_eq!(saved.entities, 4);

    let pending = sender
        .dispatch(SaveLoadRequest::Load("slot".to_string()))
        .await
        .unwrap();
    let loaded = pending.await.unwrap().unwrap();
    assert_eq!(loaded.entities, 4);

    let failed = sender.load("never-saved").await;
    assert!(matches!(failed, Err(SaveLoadError::MissingWorldSnapshot(_))));

    drop(sender);
    let (service, world) = worker.await.unwrap();
    assert!(world.is_empty());
    assert_eq!(service.status(), OperationStatus::Idle);
}

#[tokio::test]
async fn test_request_sender_reports_closed_worker() {
    let dir = TempDir::new().unwrap();
    let (sender, worker) = spawn_worker(service(dir.path(), 2), World::new(), 1);
    worker.abort();
    let _ = worker.await;

    let result = sender.save("slot").await;
    assert!(matches!(result, Err(SaveLoadError::WorkerClosed)));
}

#[test]
fn test_async_save_driven_by_block_on() {
    let dir = TempDir::new().unwrap();
    let service = service(dir.path(), 5);
    let mut world = World::new();
    populate(&mut world, 3);

    let report =
        tokio_test::block_on(service.save_async(&mut world, "slot", None)).unwrap();
    assert_eq!(report.entities, 3);
    assert!(service.has_scope_data("slot", "DEFAULT").unwrap());
}
