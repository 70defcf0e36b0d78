//! In-process scene store and cost ledger, used for local development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use reel_models::{CostEntry, ProjectId, SceneId, SceneJob, ScenePatch, VideoStatus};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{is_generating_job, CostLedger, SceneStore};

/// Scene rows in a map behind a mutex. Conditional writes check and apply
/// under the same lock, so they are atomic.
#[derive(Default)]
pub struct InMemorySceneStore {
    scenes: Mutex<HashMap<SceneId, SceneJob>>,
}

impl InMemorySceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the given rows already present.
    pub fn with_scenes(scenes: impl IntoIterator<Item = SceneJob>) -> Self {
        let map = scenes.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self {
            scenes: Mutex::new(map),
        }
    }

    /// Replace a row as-is, bypassing patch semantics.
    pub async fn put(&self, scene: SceneJob) {
        self.scenes.lock().await.insert(scene.id.clone(), scene);
    }
}

#[async_trait]
impl SceneStore for InMemorySceneStore {
    async fn get(&self, id: &SceneId) -> FirestoreResult<Option<SceneJob>> {
        Ok(self.scenes.lock().await.get(id).cloned())
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> FirestoreResult<Vec<SceneJob>> {
        let scenes = self.scenes.lock().await;
        let mut rows: Vec<SceneJob> = scenes
            .values()
            .filter(|s| &s.project_id == project_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn list_generating(
        &self,
        project_id: Option<&ProjectId>,
    ) -> FirestoreResult<Vec<SceneJob>> {
        let scenes = self.scenes.lock().await;
        let mut rows: Vec<SceneJob> = scenes
            .values()
            .filter(|s| s.is_generating() && s.job_id.is_some())
            .filter(|s| project_id.map_or(true, |p| &s.project_id == p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn create(&self, scene: &SceneJob) -> FirestoreResult<()> {
        let mut scenes = self.scenes.lock().await;
        if scenes.contains_key(&scene.id) {
            return Err(FirestoreError::AlreadyExists(format!("scenes/{}", scene.id)));
        }
        scenes.insert(scene.id.clone(), scene.clone());
        Ok(())
    }

    async fn write(&self, id: &SceneId, patch: &ScenePatch) -> FirestoreResult<Option<SceneJob>> {
        let mut scenes = self.scenes.lock().await;
        Ok(scenes.get_mut(id).map(|scene| {
            scene.apply(patch, Utc::now());
            scene.clone()
        }))
    }

    async fn write_if_status(
        &self,
        id: &SceneId,
        expected: &[VideoStatus],
        patch: &ScenePatch,
    ) -> FirestoreResult<Option<SceneJob>> {
        let mut scenes = self.scenes.lock().await;
        match scenes.get_mut(id) {
            Some(scene) if expected.contains(&scene.status) => {
                scene.apply(patch, Utc::now());
                Ok(Some(scene.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn write_if_job(
        &self,
        id: &SceneId,
        job_id: &str,
        patch: &ScenePatch,
    ) -> FirestoreResult<Option<SceneJob>> {
        let mut scenes = self.scenes.lock().await;
        match scenes.get_mut(id) {
            Some(scene) if is_generating_job(scene, job_id) => {
                scene.apply(patch, Utc::now());
                Ok(Some(scene.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// Cost entries kept in memory.
#[derive(Default)]
pub struct InMemoryCostLedger {
    entries: Mutex<Vec<CostEntry>>,
}

impl InMemoryCostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<CostEntry> {
        self.entries.lock().await.clone()
    }

    /// Running total for one project.
    pub async fn total(&self, project_id: &ProjectId) -> f64 {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| &e.project_id == project_id)
            .map(|e| e.amount)
            .sum()
    }
}

#[async_trait]
impl CostLedger for InMemoryCostLedger {
    async fn record(&self, entry: &CostEntry) -> FirestoreResult<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}
