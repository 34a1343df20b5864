use ecs_saveload::{
    Document, MigrationBuilder, MigrationRegistry, SaveLoadError, SaveLoadParameters,
    SaveLoadService, Saveable, SaveableComponent, World,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WeaponV1 {
    name: String,
    damage: String,
}

impl SaveableComponent for WeaponV1 {
    const TYPE_NAME: &'static str = "game::Weapon";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Stats {
    damage: u32,
    speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Weapon {
    title: String,
    stats: Stats,
    rarity: String,
}

impl SaveableComponent for Weapon {
    const TYPE_NAME: &'static str = "game::Weapon";
}

fn weapon_migrations() -> Arc<MigrationRegistry> {
    let registry = Arc::new(MigrationRegistry::new());
    MigrationBuilder::for_component::<Weapon>()
        .from_version("1.0.0")
        .to_version("1.1.0")
        .rename_field("name", "title")
        .convert_value("damage", |raw: String| raw.trim().to_string())
        .with_migration(|mut doc| {
            let raw = doc
                .get("damage")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("damage is not text"))?;
            let damage: u32 = raw.parse()?;
            doc.insert("damage".to_string(), json!(damage));
            Ok(doc)
        })
        .from_version("1.1.0")
        .to_version("2.0.0")
        .with_migration(|mut doc| {
            let damage = doc.remove("damage").unwrap_or(json!(0));
            doc.insert("stats".to_string(), json!({"damage": damage, "speed": 1.0}));
            Ok(doc)
        })
        .add_field_if_absent("rarity", |_| json!("common"))
        .replace_nested_value("stats.speed", 1.0, 1.5)
        .register(&registry)
        .unwrap();
    registry
}

#[test]
fn test_registry_applies_only_ranges_inside_window() {
    let registry = weapon_migrations();
    let old = doc(json!({"name": "Axe", "damage": " 12 "}));

    let partial = registry
        .apply_document("game::Weapon", "1.0.0", "1.1.0", old.clone())
        .unwrap();
    assert_eq!(Value::Object(partial), json!({"title": "Axe", "damage": 12}));

    let full = registry
        .apply_document("game::Weapon", "1.0.0", "2.0.0", old)
        .unwrap();
    assert_eq!(
        Value::Object(full),
        json!({"title": "Axe", "stats": {"damage": 12, "speed": 1.5}, "rarity": "common"})
    );

    let ranges = registry.ranges("game::Weapon").unwrap();
    assert_eq!(ranges.len(), 2);
}

#[test]
fn test_two_hop_upgrade_through_save_file() {
    let dir = TempDir::new().unwrap();
    let old = SaveLoadService::new(
        SaveLoadParameters::new("1.0.0", dir.path()),
        Arc::new(MigrationRegistry::new()),
    )
    .unwrap()
    .with_component::<WeaponV1>()
    .unwrap();

    let mut world = World::new();
    let sword = world.create_entity();
    world.insert(sword, Saveable);
    world.insert(
        sword,
        WeaponV1 {
            name: "Sword".to_string(),
            damage: "30".to_string(),
        },
    );
    let broken = world.create_entity();
    world.insert(broken, Saveable);
    world.insert(
        broken,
        WeaponV1 {
            name: "Stick".to_string(),
            damage: "lots".to_string(),
        },
    );
    old.save(&mut world, "slot").unwrap();

    let new = SaveLoadService::new(
        SaveLoadParameters::new("2.0.0", dir.path()),
        weapon_migrations(),
    )
    .unwrap()
    .with_component::<Weapon>()
    .unwrap();
    let mut world = World::new();
    let report = new.load(&mut world, "slot").unwrap();
    assert_eq!(report.entities, 1);
    assert_eq!(report.entities_rejected, 1);

    let weapons = world.entities_with::<Weapon>();
    assert_eq!(weapons.len(), 1);
    assert_eq!(
        world.get::<Weapon>(weapons[0]),
        Some(&Weapon {
            title: "Sword".to_string(),
            stats: Stats {
                damage: 30,
                speed: 1.5,
            },
            rarity: "common".to_string(),
        })
    );

    // Records written by 2.0.0 load again without re-running migrations.
    new.save(&mut world, "slot").unwrap();
    let report = new.load(&mut world, "slot").unwrap();
    assert_eq!(report.entities, 1);
}

#[test]
fn test_concurrent_registration_keeps_one_migration_per_range() {
    let registry = Arc::new(MigrationRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || {
                MigrationBuilder::new("game::Door")
                    .from_version("1.0")
                    .to_version("1.1")
                    .rename_field("open", "is_open")
                    .register(&registry)
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| matches!(err, SaveLoadError::DuplicateMigration { .. }))
    );

    let migrated = registry
        .apply_document("game::Door", "1.0", "1.1", doc(json!({"open": true})))
        .unwrap();
    assert_eq!(Value::Object(migrated), json!({"is_open": true}));
}
