//! Scene repository backed by Firestore.
//!
//! Layout: `scenes/{scene_id}` with a `project_id` field.
//!
//! Firestore has no "update where status = x", so conditional writes read the
//! document, check the status, then patch with a `currentDocument.updateTime`
//! precondition. A precondition failure means someone else wrote in between;
//! the read-check-patch cycle is repeated a few times before giving up, since
//! the concurrent write may have touched unrelated fields.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use reel_models::{ProjectId, SceneId, SceneJob, ScenePatch, ShotType, VideoStatus};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_cas_conflict;
use crate::store::{is_generating_job, SceneStore};
use crate::types::{Document, FromFirestoreValue, StructuredQuery, ToFirestoreValue, Value};

const COLLECTION: &str = "scenes";
const CAS_MAX_ATTEMPTS: u32 = 3;

/// Firestore implementation of [`SceneStore`].
#[derive(Clone)]
pub struct FirestoreSceneStore {
    client: FirestoreClient,
}

impl FirestoreSceneStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    async fn query(&self, filters: Vec<(&str, Value)>) -> FirestoreResult<Vec<SceneJob>> {
        let docs = self
            .client
            .run_query("", StructuredQuery::equal_all(COLLECTION, filters))
            .await?;

        docs.iter().map(document_to_scene).collect()
    }
}

#[async_trait]
impl SceneStore for FirestoreSceneStore {
    async fn get(&self, id: &SceneId) -> FirestoreResult<Option<SceneJob>> {
        match self.client.get_document(COLLECTION, id.as_str()).await? {
            Some(doc) => Ok(Some(document_to_scene(&doc)?)),
            None => Ok(None),
        }
    }

    async fn list_by_project(&self, project_id: &ProjectId) -> FirestoreResult<Vec<SceneJob>> {
        self.query(vec![("project_id", project_id.as_str().to_firestore_value())])
            .await
    }

    async fn list_generating(
        &self,
        project_id: Option<&ProjectId>,
    ) -> FirestoreResult<Vec<SceneJob>> {
        let mut filters = vec![("status", VideoStatus::Generating.as_str().to_firestore_value())];
        if let Some(project_id) = project_id {
            filters.push(("project_id", project_id.as_str().to_firestore_value()));
        }

        let scenes = self.query(filters).await?;
        Ok(scenes.into_iter().filter(|s| s.job_id.is_some()).collect())
    }

    async fn create(&self, scene: &SceneJob) -> FirestoreResult<()> {
        self.client
            .create_document(COLLECTION, scene.id.as_str(), scene_to_fields(scene))
            .await?;
        info!(scene_id = %scene.id, project_id = %scene.project_id, "Created scene record");
        Ok(())
    }

    async fn write(&self, id: &SceneId, patch: &ScenePatch) -> FirestoreResult<Option<SceneJob>> {
        let mask = patch.field_paths();
        let fields = patch_to_fields(patch, Utc::now());

        match self
            .client
            .update_document(COLLECTION, id.as_str(), fields, &mask)
            .await
        {
            Ok(doc) => Ok(Some(document_to_scene(&doc)?)),
            Err(FirestoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_if_status(
        &self,
        id: &SceneId,
        expected: &[VideoStatus],
        patch: &ScenePatch,
    ) -> FirestoreResult<Option<SceneJob>> {
        self.write_when(id, patch, |scene| expected.contains(&scene.status))
            .await
    }

    async fn write_if_job(
        &self,
        id: &SceneId,
        job_id: &str,
        patch: &ScenePatch,
    ) -> FirestoreResult<Option<SceneJob>> {
        self.write_when(id, patch, |scene| is_generating_job(scene, job_id))
            .await
    }
}

impl FirestoreSceneStore {
    /// Read, check `condition`, patch under an `updateTime` precondition.
    async fn write_when<F>(
        &self,
        id: &SceneId,
        patch: &ScenePatch,
        condition: F,
    ) -> FirestoreResult<Option<SceneJob>>
    where
        F: Fn(&SceneJob) -> bool + Send + Sync,
    {
        let mask = patch.field_paths();

        for attempt in 1..=CAS_MAX_ATTEMPTS {
            let Some(doc) = self.client.get_document(COLLECTION, id.as_str()).await? else {
                return Ok(None);
            };
            let mut scene = document_to_scene(&doc)?;

            if !condition(&scene) {
                debug!(
                    scene_id = %id,
                    status = %scene.status,
                    "Conditional write skipped: condition not met"
                );
                return Ok(None);
            }

            let update_time = doc.update_time.as_deref().ok_or_else(|| {
                FirestoreError::invalid_document(format!("{}/{} has no updateTime", COLLECTION, id))
            })?;

            let now = Utc::now();
            match self
                .client
                .update_document_with_precondition(
                    COLLECTION,
                    id.as_str(),
                    patch_to_fields(patch, now),
                    &mask,
                    update_time,
                )
                .await
            {
                Ok(_) => {
                    scene.apply(patch, now);
                    return Ok(Some(scene));
                }
                Err(e) if e.is_precondition_failed() => {
                    record_cas_conflict(COLLECTION);
                    debug!(scene_id = %id, attempt, "Conditional write lost a race, re-reading");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }
}

// ============================================================================
// Document conversion
// ============================================================================

fn scene_to_fields(scene: &SceneJob) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("project_id".to_string(), scene.project_id.as_str().to_firestore_value());
    fields.insert("status".to_string(), scene.status.as_str().to_firestore_value());
    fields.insert("job_id".to_string(), scene.job_id.to_firestore_value());
    fields.insert("result_url".to_string(), scene.result_url.to_firestore_value());
    fields.insert("error_text".to_string(), scene.error_text.to_firestore_value());
    fields.insert(
        "status_updated_at".to_string(),
        scene.status_updated_at.to_firestore_value(),
    );
    fields.insert(
        "source_image_url".to_string(),
        scene.source_image_url.to_firestore_value(),
    );
    fields.insert("prompt_text".to_string(), scene.prompt_text.to_firestore_value());
    fields.insert("shot_type".to_string(), scene.shot_type.as_str().to_firestore_value());
    fields
}

/// Fields for a patch. Must stay aligned with [`ScenePatch::field_paths`].
fn patch_to_fields(patch: &ScenePatch, now: DateTime<Utc>) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    if let Some(status) = patch.status {
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
        fields.insert("status_updated_at".to_string(), now.to_firestore_value());
    }
    if let Some(job_id) = &patch.job_id {
        fields.insert("job_id".to_string(), job_id.to_firestore_value());
    }
    if let Some(result_url) = &patch.result_url {
        fields.insert("result_url".to_string(), result_url.to_firestore_value());
    }
    if let Some(error_text) = &patch.error_text {
        fields.insert("error_text".to_string(), error_text.to_firestore_value());
    }
    fields
}

fn document_to_scene(doc: &Document) -> FirestoreResult<SceneJob> {
    let id = doc
        .id()
        .ok_or_else(|| FirestoreError::invalid_document("Scene document has no name"))?;

    let project_id: String = doc
        .field("project_id")
        .ok_or_else(|| FirestoreError::invalid_document(format!("Scene {} has no project_id", id)))?;

    let status = match doc.field::<String>("status") {
        Some(s) => s
            .parse::<VideoStatus>()
            .map_err(|e| FirestoreError::invalid_document(format!("Scene {}: {}", id, e)))?,
        None => VideoStatus::Pending,
    };

    let status_updated_at = doc
        .field::<DateTime<Utc>>("status_updated_at")
        .or_else(|| {
            doc.update_time
                .as_ref()
                .and_then(|t| DateTime::<Utc>::from_firestore_value(&Value::TimestampValue(t.clone())))
        })
        .unwrap_or_else(Utc::now);

    Ok(SceneJob {
        id: SceneId::from(id),
        project_id: ProjectId::from(project_id),
        status,
        job_id: doc.field("job_id"),
        result_url: doc.field("result_url"),
        error_text: doc.field("error_text"),
        status_updated_at,
        source_image_url: doc.field("source_image_url"),
        prompt_text: doc.field("prompt_text"),
        shot_type: doc
            .field::<String>("shot_type")
            .and_then(|s| ShotType::parse_lenient(&s))
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_PATH: &str = "/v1/projects/demo/databases/(default)/documents/scenes/s1";

    fn doc_json(status: &str, job_id: Option<&str>) -> serde_json::Value {
        let job = match job_id {
            Some(j) => json!({ "stringValue": j }),
            None => json!({ "nullValue": null }),
        };
        json!({
            "name": "projects/demo/databases/(default)/documents/scenes/s1",
            "fields": {
                "project_id": { "stringValue": "p1" },
                "status": { "stringValue": status },
                "job_id": job,
                "result_url": { "nullValue": null },
                "error_text": { "nullValue": null },
                "status_updated_at": { "timestampValue": "2025-03-01T12:00:00Z" },
                "shot_type": { "stringValue": "close_up" }
            },
            "updateTime": "2025-03-01T12:00:00.123456Z"
        })
    }

    async fn store(server: &MockServer) -> FirestoreSceneStore {
        let client = FirestoreClient::new(FirestoreConfig::emulator("demo", server.uri())).unwrap();
        FirestoreSceneStore::new(client)
    }

    #[test]
    fn test_document_to_scene() {
        let doc: Document = serde_json::from_value(doc_json("generating", Some("req-1"))).unwrap();
        let scene = document_to_scene(&doc).unwrap();
        assert_eq!(scene.id.as_str(), "s1");
        assert_eq!(scene.project_id.as_str(), "p1");
        assert_eq!(scene.status, VideoStatus::Generating);
        assert_eq!(scene.job_id.as_deref(), Some("req-1"));
        assert_eq!(scene.shot_type, ShotType::CloseUp);
        assert!(scene.check_invariants().is_ok());
    }

    #[test]
    fn test_patch_fields_match_mask() {
        let patch = ScenePatch::timed_out();
        let fields = patch_to_fields(&patch, Utc::now());
        let mut mask = patch.field_paths();
        mask.sort_unstable();
        let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, mask);
        assert_eq!(fields["job_id"], Value::NullValue(()));
    }

    #[tokio::test]
    async fn test_write_if_status_applies_with_update_time_precondition() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc_json("generating", Some("req-1"))))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path(DOC_PATH))
            .and(query_param("currentDocument.updateTime", "2025-03-01T12:00:00.123456Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc_json("done", Some("req-1"))))
            .expect(1)
            .mount(&server)
            .await;

        let store = store(&server).await;
        let updated = store
            .write_if_status(
                &SceneId::from("s1"),
                &[VideoStatus::Generating],
                &ScenePatch::done("https://cdn/clip.mp4"),
            )
            .await
            .unwrap()
            .expect("write should apply");

        assert_eq!(updated.status, VideoStatus::Done);
        assert_eq!(updated.result_url.as_deref(), Some("https://cdn/clip.mp4"));
        assert_eq!(updated.job_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_write_if_status_skips_unexpected_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc_json("done", Some("req-1"))))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = store(&server).await;
        let result = store
            .write_if_status(&SceneId::from("s1"), &[VideoStatus::Generating], &ScenePatch::timed_out())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_write_if_status_reports_zero_rows_on_lost_race() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc_json("generating", Some("req-1"))))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "status": "FAILED_PRECONDITION", "message": "stale" }
            })))
            .expect(CAS_MAX_ATTEMPTS as u64)
            .mount(&server)
            .await;

        let store = store(&server).await;
        let result = store
            .write_if_status(
                &SceneId::from("s1"),
                &[VideoStatus::Generating],
                &ScenePatch::failed("boom"),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_write_if_status_missing_record() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store(&server).await;
        let result = store
            .write_if_status(&SceneId::from("s1"), &VideoStatus::SUBMITTABLE, &ScenePatch::generating("j"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_generating_filters_missing_job_ids() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/projects/demo/databases/(default)/documents:runQuery"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "document": doc_json("generating", Some("req-1")), "readTime": "2025-03-01T12:00:01Z" },
                { "document": doc_json("generating", None), "readTime": "2025-03-01T12:00:01Z" }
            ])))
            .mount(&server)
            .await;

        let store = store(&server).await;
        let scenes = store.list_generating(None).await.unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].job_id.as_deref(), Some("req-1"));
    }
}
