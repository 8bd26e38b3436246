// src/crm/mod.rs
//! CRM access through its REST webhook: list, get and partial update only.

use crate::core::{HttpError, ServiceClient};
use crate::error::CrmError;
use crate::types::crm::{CrmErrorBody, CrmGetResponse, CrmListResponse, CrmUpdateResponse};
use crate::types::CrmRecord;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Records per `list` call; the CRM ignores larger requests
pub const CRM_PAGE_LIMIT: u64 = 50;

#[async_trait]
pub trait CrmApi: Send + Sync {
    /// One page of records starting at `offset`, ordered by id
    async fn list(
        &self,
        select: &[String],
        filter: &Map<String, Value>,
        offset: u64,
    ) -> Result<Vec<CrmRecord>, CrmError>;

    async fn get(&self, id: &str) -> Result<CrmRecord, CrmError>;

    /// Partial update carrying only `fields`
    async fn update(&self, id: &str, fields: &Map<String, Value>) -> Result<(), CrmError>;
}

pub struct RestCrm {
    client: ServiceClient,
    entity: String,
    timeout: Duration,
}

impl RestCrm {
    /// `webhook_url` already embeds the access token
    pub fn new(http: reqwest::Client, webhook_url: &str, timeout: Duration) -> Self {
        Self {
            client: ServiceClient::with_client(http, webhook_url, "crm"),
            entity: "contact".to_string(),
            timeout,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    fn method(&self, action: &str) -> String {
        format!("crm.{}.{}", self.entity, action)
    }
}

fn crm_error(e: HttpError) -> CrmError {
    match &e {
        HttpError::Status { status, body, .. } => {
            let message = serde_json::from_str::<CrmErrorBody>(body)
                .ok()
                .and_then(|parsed| match (parsed.error, parsed.error_description) {
                    (Some(code), Some(description)) => Some(format!("{}: {}", code, description)),
                    (Some(code), None) => Some(code),
                    (None, Some(description)) => Some(description),
                    (None, None) => None,
                })
                .unwrap_or_else(|| body.clone());
            CrmError::Status {
                status: *status,
                message,
            }
        }
        HttpError::Transport { .. } => CrmError::Transport(e.to_string()),
        HttpError::Decode { .. } => CrmError::Decode(e.to_string()),
    }
}

#[async_trait]
impl CrmApi for RestCrm {
    async fn list(
        &self,
        select: &[String],
        filter: &Map<String, Value>,
        offset: u64,
    ) -> Result<Vec<CrmRecord>, CrmError> {
        let payload = json!({
            "select": select,
            "filter": filter,
            "order": {"ID": "ASC"},
            "start": offset,
        });

        let response: CrmListResponse = self
            .client
            .post_json(&self.method("list"), &payload, self.timeout)
            .await
            .map_err(crm_error)?;

        debug!(
            "CRM list offset={} returned {} records (next={:?}, total={:?})",
            offset,
            response.result.len(),
            response.next,
            response.total
        );

        let mut records = Vec::with_capacity(response.result.len());
        for raw in response.result {
            match CrmRecord::from_value(raw) {
                Some(record) => records.push(record),
                None => warn!("Skipping CRM record without id at offset {}", offset),
            }
        }
        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<CrmRecord, CrmError> {
        let response: CrmGetResponse = self
            .client
            .post_json(&self.method("get"), &json!({ "id": id }), self.timeout)
            .await
            .map_err(crm_error)?;

        CrmRecord::from_value(response.result)
            .ok_or_else(|| CrmError::Decode(format!("record {} has no id", id)))
    }

    async fn update(&self, id: &str, fields: &Map<String, Value>) -> Result<(), CrmError> {
        let payload = json!({
            "id": id,
            "fields": fields,
            "params": {"REGISTER_SONET_EVENT": "N"},
        });

        let response: CrmUpdateResponse = self
            .client
            .post_json(&self.method("update"), &payload, self.timeout)
            .await
            .map_err(crm_error)?;

        if response.result {
            Ok(())
        } else {
            Err(CrmError::Rejected(id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn crm(server: &mockito::Server) -> RestCrm {
        RestCrm::new(
            ServiceClient::build_http_client().unwrap(),
            &format!("{}/rest/1/secret", server.url()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_list_sends_select_filter_and_offset() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/1/secret/crm.contact.list")
            .match_body(Matcher::PartialJson(json!({
                "select": ["ID", "UF_RESUME"],
                "filter": {"ID": "7"},
                "start": 50,
            })))
            .with_status(200)
            .with_body(r#"{"result":[{"ID":"7","UF_RESUME":"ABCDEFGHIJ1234567890"},{"NAME":"no id"}],"total":51}"#)
            .create_async()
            .await;

        let mut filter = Map::new();
        filter.insert("ID".to_string(), json!("7"));
        let select = vec!["ID".to_string(), "UF_RESUME".to_string()];

        let records = crm(&server).list(&select, &filter, 50).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].external_id, "7");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_result_false_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/1/secret/crm.contact.update")
            .match_body(Matcher::PartialJson(json!({"id": "9", "fields": {"UF_RESUME": ""}})))
            .with_status(200)
            .with_body(r#"{"result":false}"#)
            .create_async()
            .await;

        let mut fields = Map::new();
        fields.insert("UF_RESUME".to_string(), json!(""));
        let err = crm(&server).update("9", &fields).await.unwrap_err();
        assert!(matches!(err, CrmError::Rejected(id) if id == "9"));
    }

    #[tokio::test]
    async fn test_error_body_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/1/secret/crm.contact.update")
            .with_status(503)
            .with_body(r#"{"error":"QUERY_LIMIT_EXCEEDED","error_description":"Too many requests"}"#)
            .create_async()
            .await;

        let err = crm(&server).update("9", &Map::new()).await.unwrap_err();
        match err {
            CrmError::Status { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "QUERY_LIMIT_EXCEEDED: Too many requests");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_and_deal_entity() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/1/secret/crm.deal.get")
            .match_body(Matcher::Json(json!({"id": "12"})))
            .with_status(200)
            .with_body(r#"{"result":{"ID":"12","TITLE":"Driver"}}"#)
            .create_async()
            .await;

        let record = crm(&server).with_entity("deal").get("12").await.unwrap();
        assert_eq!(record.external_id, "12");
        assert_eq!(record.field_text("TITLE").as_deref(), Some("Driver"));
    }
}
