use super::guard::{
    OperationKind, OperationReport, OperationTicket, ProgressSink, report_progress,
};
use super::model::{
    ComponentRecord, EntityRecord, SCOPE_COLLECTION, SCOPE_ID_FIELD, ScopeSnapshot,
    WORLD_COLLECTION, WorldSnapshot,
};
use super::service::SaveLoadService;
use crate::core::{Result, SaveLoadError, to_document};
use crate::storage::{DocumentStore, Query};
use crate::world::{Entity, Saveable, ScopeBound, World};
use log::{debug, error};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{Instrument, Level, event, info_span};

impl SaveLoadService {
    /// Saves every saveable entity into `save_name`.
    ///
    /// The world record is replaced wholesale; of the scope records only the
    /// current scope's is replaced. Components that fail to encode are logged
    /// and left out; the rest of their entity still saves.
    pub fn save(&self, world: &mut World, save_name: &str) -> Result<OperationReport> {
        self.save_with_progress(world, save_name, None)
    }

    pub fn save_with_progress(
        &self,
        world: &mut World,
        save_name: &str,
        progress: Option<&ProgressSink<'_>>,
    ) -> Result<OperationReport> {
        let ticket = self.guard.begin(OperationKind::Save)?;
        let span = info_span!("saveload.save", save = %save_name, scope = %self.current_scope());
        let _enter = span.enter();
        let started = Instant::now();

        let mut report = OperationReport::new(OperationKind::Save, save_name);
        report_progress(progress, 0.1);
        let (world_snapshot, scope_snapshot) = self.gather(world, save_name, &mut report);
        report_progress(progress, 0.8);

        let result = write_snapshots(self.save_path(save_name), world_snapshot, scope_snapshot)
            .map(|()| {
                report_progress(progress, 1.0);
                report
            });
        self.complete(&ticket, result, started)
    }

    /// Async [`SaveLoadService::save_with_progress`]. Gathering runs on the
    /// calling task; the file write runs on the blocking pool and is awaited.
    pub async fn save_async(
        &self,
        world: &mut World,
        save_name: &str,
        progress: Option<&ProgressSink<'_>>,
    ) -> Result<OperationReport> {
        let ticket = self.guard.begin(OperationKind::Save)?;
        let span = info_span!("saveload.save_async", save = %save_name, scope = %self.current_scope());
        let started = Instant::now();

        let result = self
            .save_async_inner(world, save_name, progress)
            .instrument(span)
            .await;
        self.complete(&ticket, result, started)
    }

    async fn save_async_inner(
        &self,
        world: &mut World,
        save_name: &str,
        progress: Option<&ProgressSink<'_>>,
    ) -> Result<OperationReport> {
        let mut report = OperationReport::new(OperationKind::Save, save_name);
        report_progress(progress, 0.1);
        let (world_snapshot, scope_snapshot) = self.gather(world, save_name, &mut report);
        report_progress(progress, 0.8);

        let path = self.save_path(save_name);
        tokio::task::spawn_blocking(move || write_snapshots(path, world_snapshot, scope_snapshot))
            .await
            .map_err(|e| SaveLoadError::store_io("Save writer task failed", e))??;

        report_progress(progress, 1.0);
        Ok(report)
    }

    fn gather(
        &self,
        world: &mut World,
        save_name: &str,
        report: &mut OperationReport,
    ) -> (WorldSnapshot, ScopeSnapshot) {
        let active_scope = self.current_scope().to_string();
        let mut world_snapshot = WorldSnapshot::new(save_name);
        let mut scope_snapshot = ScopeSnapshot::new(active_scope.clone());
        let mut other_scopes = 0usize;

        for entity in world.entities_with::<Saveable>() {
            let Some(record) = self.save_entity(world, entity, report) else {
                continue;
            };

            match world.get::<ScopeBound>(entity) {
                None => world_snapshot.persistent_entities.push(record),
                Some(bound) if bound.scope_id == active_scope => {
                    scope_snapshot.entities.push(record)
                }
                Some(_) => {
                    other_scopes += 1;
                    continue;
                }
            }
            report.entities += 1;
        }

        if other_scopes > 0 {
            debug!(
                "Skipped {} entities bound to scopes other than '{}'",
                other_scopes, active_scope
            );
        }
        (world_snapshot, scope_snapshot)
    }

    fn save_entity(
        &self,
        world: &mut World,
        entity: Entity,
        report: &mut OperationReport,
    ) -> Option<EntityRecord> {
        let mut record = EntityRecord::default();
        for codec in self.components.codecs() {
            match codec.save(world, entity) {
                None => {}
                Some(Ok(payload)) => record.components.push(ComponentRecord {
                    type_name: codec.type_name().to_string(),
                    authored_version: Some(self.parameters.app_version.clone()),
                    payload,
                }),
                Some(Err(err)) => {
                    report.components_failed += 1;
                    error!(
                        "Failed to save component {} of {}: {}",
                        codec.type_name(),
                        entity,
                        err
                    );
                }
            }
        }

        // A pre-save hook may have removed the entity itself.
        if !world.contains(entity) {
            debug!("{} was removed while saving and is left out", entity);
            return None;
        }
        (!record.is_empty()).then_some(record)
    }

    /// Stamps timing on the outcome, marks the status failed on error and logs the result.
    pub(crate) fn complete(
        &self,
        ticket: &OperationTicket<'_>,
        result: Result<OperationReport>,
        started: Instant,
    ) -> Result<OperationReport> {
        let elapsed = started.elapsed();
        match result {
            Ok(mut report) => {
                report.elapsed = elapsed;
                event!(
                    Level::INFO,
                    kind = ?report.kind,
                    entities = report.entities,
                    rejected = report.entities_rejected,
                    components_failed = report.components_failed,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "operation completed"
                );
                Ok(report)
            }
            Err(err) => {
                ticket.fail();
                event!(
                    Level::ERROR,
                    error = %err,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "operation failed"
                );
                Err(err)
            }
        }
    }
}

/// Replaces the world record and the record of `scope`'s scope in the store at `path`.
pub(crate) fn write_snapshots(
    path: PathBuf,
    world: WorldSnapshot,
    scope: ScopeSnapshot,
) -> Result<()> {
    let world_doc = to_document("WorldSnapshot", &world)?;
    let scope_doc = to_document("ScopeSnapshot", &scope)?;

    let mut store = DocumentStore::open(&path)?;

    let worlds = store.collection_mut(WORLD_COLLECTION);
    worlds.delete(&Query::All);
    worlds.upsert(world_doc);

    let scopes = store.collection_mut(SCOPE_COLLECTION);
    scopes.delete(&Query::eq(SCOPE_ID_FIELD, scope.scope_id.as_str()));
    scopes.upsert(scope_doc);

    store.close()
}
