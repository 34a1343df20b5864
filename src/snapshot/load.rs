use super::component::ComponentCodec;
use super::guard::{
    LoadEvent, OperationKind, OperationReport, OperationTicket, ProgressSink, lerp,
    report_progress,
};
use super::model::{
    ComponentRecord, DEFAULT_AUTHORED_VERSION, EntityRecord, SCOPE_COLLECTION, SCOPE_ID_FIELD,
    ScopeSnapshot, WORLD_COLLECTION, WorldSnapshot,
};
use super::service::SaveLoadService;
use crate::core::{Result, SaveLoadError, from_document};
use crate::storage::{DocumentStore, Query};
use crate::world::{Entity, Saveable, ScopeBound, WasLoadedFromSave, World};
use log::{debug, error, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info_span};

impl SaveLoadService {
    /// Replaces every live saveable entity with the contents of `save_name`.
    ///
    /// Entity failures are isolated: an entity with a component that cannot be
    /// resolved, migrated, decoded or post-processed is dropped and counted in
    /// [`OperationReport::entities_rejected`]. Store failures are fatal and
    /// leave `world` cleared, since its contents can no longer be trusted.
    pub fn load(&self, world: &mut World, save_name: &str) -> Result<OperationReport> {
        self.load_with_progress(world, save_name, None)
    }

    pub fn load_with_progress(
        &self,
        world: &mut World,
        save_name: &str,
        progress: Option<&ProgressSink<'_>>,
    ) -> Result<OperationReport> {
        let ticket = self.guard.begin(OperationKind::Load)?;
        let span = info_span!("saveload.load", save = %save_name, scope = %self.current_scope());
        let _enter = span.enter();
        let started = Instant::now();

        let result = self.load_blocking(world, save_name, progress);
        self.finish_load(&ticket, world, result, started)
    }

    /// Async [`SaveLoadService::load_with_progress`]. The store is read on the
    /// blocking pool; rebuilding yields to the scheduler every
    /// [`batch_size`](crate::SaveLoadParameters::batch_size) entities.
    pub async fn load_async(
        &self,
        world: &mut World,
        save_name: &str,
        progress: Option<&ProgressSink<'_>>,
    ) -> Result<OperationReport> {
        let ticket = self.guard.begin(OperationKind::Load)?;
        let span =
            info_span!("saveload.load_async", save = %save_name, scope = %self.current_scope());
        let started = Instant::now();

        let result = self
            .load_async_inner(world, save_name, progress)
            .instrument(span)
            .await;
        self.finish_load(&ticket, world, result, started)
    }

    /// Reloads a single scope from `save_name` without touching persistent
    /// entities or other scopes.
    ///
    /// Live saveable entities bound to `scope_id` are replaced by the stored
    /// ones. If the save holds no record for the scope nothing changes.
    /// Unlike a full load, a failure here does not clear the world.
    pub fn load_scope_data(
        &self,
        world: &mut World,
        save_name: &str,
        scope_id: &str,
    ) -> Result<OperationReport> {
        let ticket = self.guard.begin(OperationKind::Load)?;
        let span = info_span!("saveload.load_scope", save = %save_name, scope = %scope_id);
        let _enter = span.enter();
        let started = Instant::now();

        let result = self.load_scope_blocking(world, save_name, scope_id);
        self.complete(&ticket, result, started)
    }

    fn load_blocking(
        &self,
        world: &mut World,
        save_name: &str,
        progress: Option<&ProgressSink<'_>>,
    ) -> Result<OperationReport> {
        let mut report = OperationReport::new(OperationKind::Load, save_name);
        let scope_id = self.current_scope().to_string();

        report_progress(progress, 0.1);
        let (world_snapshot, scope_snapshot) =
            read_snapshots(&self.save_path(save_name), save_name, &scope_id)?;
        report_progress(progress, 0.3);

        self.discard_saveable(world, None);
        self.notify(LoadEvent::Started);
        report_progress(progress, 0.4);

        self.rebuild(
            world,
            world_snapshot.persistent_entities,
            None,
            &mut report,
            progress,
            (0.4, 0.7),
        )?;
        if let Some(scope) = scope_snapshot {
            self.rebuild(
                world,
                scope.entities,
                Some(scope.scope_id.as_str()),
                &mut report,
                progress,
                (0.7, 1.0),
            )?;
        }

        report_progress(progress, 1.0);
        Ok(report)
    }

    async fn load_async_inner(
        &self,
        world: &mut World,
        save_name: &str,
        progress: Option<&ProgressSink<'_>>,
    ) -> Result<OperationReport> {
        let mut report = OperationReport::new(OperationKind::Load, save_name);
        let scope_id = self.current_scope().to_string();
        let path = self.save_path(save_name);
        let name = save_name.to_string();

        report_progress(progress, 0.1);
        let (world_snapshot, scope_snapshot) =
            tokio::task::spawn_blocking(move || read_snapshots(&path, &name, &scope_id))
                .await
                .map_err(|e| SaveLoadError::store_io("Load reader task failed", e))??;
        report_progress(progress, 0.3);

        self.discard_saveable(world, None);
        self.notify(LoadEvent::Started);
        report_progress(progress, 0.4);

        self.rebuild_async(
            world,
            world_snapshot.persistent_entities,
            None,
            &mut report,
            progress,
            (0.4, 0.7),
        )
        .await?;
        if let Some(scope) = scope_snapshot {
            self.rebuild_async(
                world,
                scope.entities,
                Some(scope.scope_id.as_str()),
                &mut report,
                progress,
                (0.7, 1.0),
            )
            .await?;
        }

        report_progress(progress, 1.0);
        Ok(report)
    }

    fn load_scope_blocking(
        &self,
        world: &mut World,
        save_name: &str,
        scope_id: &str,
    ) -> Result<OperationReport> {
        let mut report = OperationReport::new(OperationKind::Load, save_name);

        let store = DocumentStore::open(self.save_path(save_name))?;
        let scope = read_scope(&store, scope_id)?;
        store.close()?;

        let Some(scope) = scope else {
            debug!("Save '{}' has no data for scope '{}'", save_name, scope_id);
            return Ok(report);
        };

        self.discard_saveable(world, Some(scope_id));
        self.rebuild(world, scope.entities, Some(scope_id), &mut report, None, (0.0, 1.0))?;
        Ok(report)
    }

    /// Removes live saveable entities: all of them, or only those bound to `scope_id`.
    fn discard_saveable(&self, world: &mut World, scope_id: Option<&str>) -> usize {
        let mut removed = 0;
        for entity in world.entities_with::<Saveable>() {
            let matches = match scope_id {
                None => true,
                Some(scope_id) => world
                    .get::<ScopeBound>(entity)
                    .is_some_and(|bound| bound.scope_id == scope_id),
            };
            if matches && world.remove_entity(entity) {
                removed += 1;
            }
        }
        debug!("Discarded {} live saveable entities before rebuilding", removed);
        removed
    }

    fn rebuild(
        &self,
        world: &mut World,
        records: Vec<EntityRecord>,
        scope_id: Option<&str>,
        report: &mut OperationReport,
        progress: Option<&ProgressSink<'_>>,
        (start, end): (f32, f32),
    ) -> Result<()> {
        let total = records.len().max(1) as f32;
        let batch_size = self.parameters.batch_size.max(1);
        for (index, record) in records.into_iter().enumerate() {
            if index % batch_size == 0 {
                report_progress(progress, lerp(start, end, index as f32 / total));
            }
            self.rebuild_entity(world, record, scope_id, report)?;
        }
        report_progress(progress, end);
        Ok(())
    }

    async fn rebuild_async(
        &self,
        world: &mut World,
        records: Vec<EntityRecord>,
        scope_id: Option<&str>,
        report: &mut OperationReport,
        progress: Option<&ProgressSink<'_>>,
        (start, end): (f32, f32),
    ) -> Result<()> {
        let total = records.len().max(1) as f32;
        let batch_size = self.parameters.batch_size.max(1);
        for (index, record) in records.into_iter().enumerate() {
            if index % batch_size == 0 {
                report_progress(progress, lerp(start, end, index as f32 / total));
                tokio::task::yield_now().await;
            }
            self.rebuild_entity(world, record, scope_id, report)?;
        }
        report_progress(progress, end);
        Ok(())
    }

    /// Creates one entity from its record. Returns `Err` only for operation-fatal failures.
    fn rebuild_entity(
        &self,
        world: &mut World,
        record: EntityRecord,
        scope_id: Option<&str>,
        report: &mut OperationReport,
    ) -> Result<()> {
        let entity = world.create_entity();
        let mut valid = true;
        let mut hooks: Vec<(i32, Arc<dyn ComponentCodec>)> = Vec::new();

        for component in record.components {
            let type_name = component.type_name.clone();
            match self.restore_component(world, entity, component) {
                Ok((codec, Some(priority))) => hooks.push((priority, codec)),
                Ok((_, None)) => {}
                Err(err) if err.is_operation_fatal() => {
                    world.remove_entity(entity);
                    return Err(err);
                }
                Err(err) => {
                    valid = false;
                    report.components_failed += 1;
                    error!("Failed to load component {} of {}: {}", type_name, entity, err);
                }
            }
        }

        // Stable sort: equal priorities keep record order.
        hooks.sort_by_key(|(priority, _)| *priority);
        for (_, codec) in hooks {
            if let Err(err) = codec.post_load(world, entity) {
                valid = false;
                report.components_failed += 1;
                error!("Post-load failed on {}: {}", entity, err);
                break;
            }
        }

        if !valid {
            world.remove_entity(entity);
            report.entities_rejected += 1;
            warn!("{} was not fully restored and has been removed", entity);
            return Ok(());
        }

        world.insert(entity, Saveable);
        world.insert(entity, WasLoadedFromSave);
        if let Some(scope_id) = scope_id {
            world.insert(entity, ScopeBound::new(scope_id));
        }
        report.entities += 1;
        Ok(())
    }

    fn restore_component(
        &self,
        world: &mut World,
        entity: Entity,
        record: ComponentRecord,
    ) -> Result<(Arc<dyn ComponentCodec>, Option<i32>)> {
        let ComponentRecord {
            type_name,
            authored_version,
            payload,
        } = record;

        let codec = self.resolve_codec(&type_name)?;
        let authored = authored_version
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORED_VERSION);
        let migrated = self.migrations.apply_document(
            codec.type_name(),
            authored,
            &self.parameters.app_version,
            payload,
        )?;
        let priority = codec.load(world, entity, migrated)?;
        Ok((codec, priority))
    }

    fn finish_load(
        &self,
        ticket: &OperationTicket<'_>,
        world: &mut World,
        result: Result<OperationReport>,
        started: Instant,
    ) -> Result<OperationReport> {
        if let Err(err) = &result {
            error!("Load failed, tearing down the entity store: {}", err);
            world.clear();
        }
        self.notify(LoadEvent::Finished);
        self.complete(ticket, result, started)
    }
}

/// Reads the world record and the record of `scope_id` from the store at `path`.
pub(crate) fn read_snapshots(
    path: &Path,
    save_name: &str,
    scope_id: &str,
) -> Result<(WorldSnapshot, Option<ScopeSnapshot>)> {
    let store = DocumentStore::open(path)?;

    let world_doc = store
        .collection(WORLD_COLLECTION)
        .and_then(|worlds| worlds.find_one(&Query::All))
        .cloned();
    let Some(world_doc) = world_doc else {
        return Err(SaveLoadError::MissingWorldSnapshot(save_name.to_string()));
    };
    let world: WorldSnapshot = from_document("WorldSnapshot", world_doc)
        .map_err(|e| SaveLoadError::store_io("Malformed world record", e))?;

    let scope = read_scope(&store, scope_id)?;
    store.close()?;
    Ok((world, scope))
}

fn read_scope(store: &DocumentStore, scope_id: &str) -> Result<Option<ScopeSnapshot>> {
    let Some(doc) = store
        .collection(SCOPE_COLLECTION)
        .and_then(|scopes| scopes.find_one(&Query::eq(SCOPE_ID_FIELD, scope_id)))
    else {
        return Ok(None);
    };
    from_document("ScopeSnapshot", doc.clone())
        .map(Some)
        .map_err(|e| SaveLoadError::store_io("Malformed scope record", e))
}
