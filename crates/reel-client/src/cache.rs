//! Local view of one project's scenes.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use tokio::time::{Duration, Instant};

use reel_models::{SceneId, SceneJob, ScenePatch, SceneUpdate, VideoStatus};

/// Pre-mutation copy of one scene, restored if the remote call fails.
#[derive(Debug, Clone)]
pub struct Snapshot {
    scene: SceneJob,
}

/// The single authoritative client-side copy of a project's scenes.
#[derive(Debug, Default)]
pub struct SceneCache {
    scenes: BTreeMap<SceneId, SceneJob>,
    submitting: HashSet<SceneId>,
    last_mutation: Option<Instant>,
}

impl SceneCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SceneId) -> Option<&SceneJob> {
        self.scenes.get(id)
    }

    pub fn scenes(&self) -> Vec<SceneJob> {
        self.scenes.values().cloned().collect()
    }

    /// Replace everything with a fresh server listing.
    pub fn replace_all(&mut self, scenes: Vec<SceneJob>) {
        self.scenes = scenes.into_iter().map(|s| (s.id.clone(), s)).collect();
    }

    pub fn upsert(&mut self, scene: SceneJob) {
        self.scenes.insert(scene.id.clone(), scene);
    }

    pub fn snapshot(&self, id: &SceneId) -> Option<Snapshot> {
        self.scenes.get(id).map(|scene| Snapshot {
            scene: scene.clone(),
        })
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.upsert(snapshot.scene);
    }

    /// Apply a patch locally. Returns false if the scene is not loaded.
    pub fn apply(&mut self, id: &SceneId, patch: &ScenePatch) -> bool {
        match self.scenes.get_mut(id) {
            Some(scene) => {
                scene.apply(patch, Utc::now());
                true
            }
            None => false,
        }
    }

    /// Fold a poll cycle update into the cache.
    pub fn apply_update(&mut self, update: &SceneUpdate) {
        let patch = if update.timed_out {
            ScenePatch::timed_out()
        } else {
            match (update.status, &update.result_url) {
                (VideoStatus::Done, Some(url)) => ScenePatch::done(url.as_str()),
                (VideoStatus::Failed, _) => {
                    ScenePatch::failed(update.error_text.clone().unwrap_or_default())
                }
                _ => return,
            }
        };
        self.apply(&update.scene_id, &patch);
    }

    /// Scenes with a job outstanding, including ones whose submit is in flight.
    pub fn outstanding(&self) -> usize {
        let generating = self
            .scenes
            .values()
            .filter(|s| s.is_generating() && !self.submitting.contains(&s.id))
            .count();
        generating + self.submitting.len()
    }

    /// Mark a submission in flight. False if one already is.
    pub fn begin_submit(&mut self, id: &SceneId) -> bool {
        self.submitting.insert(id.clone())
    }

    pub fn end_submit(&mut self, id: &SceneId) {
        self.submitting.remove(id);
    }

    /// Start the realtime cooldown window.
    pub fn touch(&mut self) {
        self.last_mutation = Some(Instant::now());
    }

    pub fn in_cooldown(&self, cooldown: Duration) -> bool {
        self.last_mutation
            .map_or(false, |at| at.elapsed() < cooldown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::ProjectId;

    fn scene(id: &str) -> SceneJob {
        SceneJob::new(SceneId::from(id), ProjectId::from("p1"))
    }

    #[test]
    fn test_snapshot_restore_undoes_local_patch() {
        let mut cache = SceneCache::new();
        let mut s1 = scene("s1");
        s1.apply(&ScenePatch::generating("abc"), Utc::now());
        cache.upsert(s1.clone());

        let snapshot = cache.snapshot(&s1.id).unwrap();
        assert!(cache.apply(&s1.id, &ScenePatch::reset()));
        assert_eq!(cache.get(&s1.id).unwrap().status, VideoStatus::Pending);

        cache.restore(snapshot);
        assert_eq!(cache.get(&s1.id).unwrap(), &s1);
    }

    #[test]
    fn test_apply_updates() {
        let mut cache = SceneCache::new();
        for id in ["s1", "s2", "s3"] {
            let mut s = scene(id);
            s.apply(&ScenePatch::generating(format!("job-{}", id)), Utc::now());
            cache.upsert(s);
        }

        cache.apply_update(&SceneUpdate::completed(SceneId::from("s1"), "https://cdn/1.mp4"));
        cache.apply_update(&SceneUpdate::failed(SceneId::from("s2"), "nope"));
        cache.apply_update(&SceneUpdate::timed_out(SceneId::from("s3"), "late"));

        let s1 = cache.get(&SceneId::from("s1")).unwrap();
        assert_eq!(s1.status, VideoStatus::Done);
        assert_eq!(s1.result_url.as_deref(), Some("https://cdn/1.mp4"));
        assert_eq!(cache.get(&SceneId::from("s2")).unwrap().status, VideoStatus::Failed);
        let s3 = cache.get(&SceneId::from("s3")).unwrap();
        assert_eq!(s3.status, VideoStatus::Pending);
        assert!(s3.job_id.is_none());
        assert_eq!(cache.outstanding(), 0);
    }

    #[test]
    fn test_outstanding_counts_in_flight_submits_once() {
        let mut cache = SceneCache::new();
        let mut s1 = scene("s1");
        s1.apply(&ScenePatch::generating("abc"), Utc::now());
        cache.upsert(s1);
        cache.upsert(scene("s2"));

        assert!(cache.begin_submit(&SceneId::from("s2")));
        assert!(!cache.begin_submit(&SceneId::from("s2")));
        assert_eq!(cache.outstanding(), 2);

        cache.end_submit(&SceneId::from("s2"));
        assert_eq!(cache.outstanding(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_window() {
        let mut cache = SceneCache::new();
        let cooldown = Duration::from_secs(5);
        assert!(!cache.in_cooldown(cooldown));

        cache.touch();
        assert!(cache.in_cooldown(cooldown));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!cache.in_cooldown(cooldown));
    }
}
