//! Cost ledger backed by Firestore.
//!
//! Each entry becomes `cost_logs/{uuid}`; the same commit increments
//! `projects/{project_id}.total_cost`.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use reel_models::CostEntry;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::CostLedger;
use crate::types::{ToFirestoreValue, Value, Write};

const COST_LOGS: &str = "cost_logs";
const PROJECTS: &str = "projects";

#[derive(Clone)]
pub struct FirestoreCostLedger {
    client: FirestoreClient,
}

impl FirestoreCostLedger {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CostLedger for FirestoreCostLedger {
    async fn record(&self, entry: &CostEntry) -> FirestoreResult<()> {
        // Fixed id so a retried commit cannot log the same entry twice.
        let log_id = Uuid::new_v4().to_string();
        let writes = vec![
            Write::create(
                self.client.full_document_name(COST_LOGS, &log_id),
                entry_to_fields(entry),
            ),
            Write::increment(
                self.client
                    .full_document_name(PROJECTS, entry.project_id.as_str()),
                "total_cost",
                entry.amount.to_firestore_value(),
            ),
        ];

        match self.client.commit(writes).await {
            Ok(_) => {}
            Err(FirestoreError::AlreadyExists(_)) => {
                debug!(log_id = %log_id, "Cost entry already committed");
            }
            Err(e) => return Err(e),
        }

        info!(
            project_id = %entry.project_id,
            scene_id = entry.scene_id.as_ref().map(|s| s.as_str()).unwrap_or(""),
            amount = entry.amount,
            "Recorded cost entry"
        );
        Ok(())
    }
}

fn entry_to_fields(entry: &CostEntry) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("project_id".to_string(), entry.project_id.as_str().to_firestore_value());
    fields.insert(
        "scene_id".to_string(),
        entry.scene_id.as_ref().map(|s| s.to_string()).to_firestore_value(),
    );
    fields.insert("service".to_string(), entry.service.to_firestore_value());
    fields.insert("operation".to_string(), entry.operation.to_firestore_value());
    fields.insert("cost".to_string(), entry.amount.to_firestore_value());
    fields.insert("created_at".to_string(), entry.created_at.to_firestore_value());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use reel_models::{ProjectId, SceneId};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_record_commits_log_and_total_increment() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/projects/demo/databases/(default)/documents:commit"))
            .and(body_partial_json(serde_json::json!({
                "writes": [
                    { "currentDocument": { "exists": false } },
                    { "updateTransforms": [ { "fieldPath": "total_cost" } ] }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "commitTime": "2025-03-01T12:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = FirestoreClient::new(FirestoreConfig::emulator("demo", server.uri())).unwrap();
        let ledger = FirestoreCostLedger::new(client);

        let entry = CostEntry::new(ProjectId::from("p1"), "fal", "image_to_video", 0.28)
            .for_scene(SceneId::from("s1"));
        ledger.record(&entry).await.unwrap();
    }

    #[test]
    fn test_entry_fields() {
        let entry = CostEntry::new(ProjectId::from("p1"), "fal", "image_to_video", 0.28);
        let fields = entry_to_fields(&entry);
        assert_eq!(fields["cost"], Value::DoubleValue(0.28));
        assert_eq!(fields["scene_id"], Value::NullValue(()));
    }
}
