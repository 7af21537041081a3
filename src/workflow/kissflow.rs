//! Kissflow process API client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{WorkflowApi, WorkflowItem};
use crate::config::WorkflowConfig;
use crate::error::WorkflowError;

pub struct KissflowClient {
    base_url: String,
    process_id: String,
    access_key_id: String,
    access_key_secret: SecretString,
    client: reqwest::Client,
}

impl KissflowClient {
    pub fn new(config: &WorkflowConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url.clone(),
            process_id: config.process_id.clone(),
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
            client,
        }
    }

    fn list_url(&self) -> String {
        format!("{}/admin/{}/item", self.base_url, self.process_id)
    }

    fn item_url(&self, item_id: &str) -> String {
        format!("{}/{}/{item_id}", self.base_url, self.process_id)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("X-Access-Key-Id", &self.access_key_id)
            .header("X-Access-Key-Secret", self.access_key_secret.expose_secret())
            .header("Accept", "application/json")
    }

    async fn read_json(resp: reqwest::Response) -> Result<Value, WorkflowError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WorkflowError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.json()
            .await
            .map_err(|e| WorkflowError::InvalidResponse(e.to_string()))
    }
}

/// Pull the item list out of a listing response (`{"Data": [...]}` or a bare array).
pub fn items_from_listing(value: Value) -> Result<Vec<WorkflowItem>, WorkflowError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("Data") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(WorkflowError::InvalidResponse(
                    "listing Data is not an array".into(),
                ));
            }
        },
        _ => {
            return Err(WorkflowError::InvalidResponse(
                "listing is neither an object nor an array".into(),
            ));
        }
    };
    Ok(items
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(obj) => Some(obj),
            _ => None,
        })
        .collect())
}

#[async_trait]
impl WorkflowApi for KissflowClient {
    async fn list_items(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> Result<Vec<WorkflowItem>, WorkflowError> {
        let resp = self
            .authorized(self.client.get(self.list_url()))
            .query(&[("page_number", page_number), ("page_size", page_size)])
            .send()
            .await
            .map_err(|e| WorkflowError::Http(e.to_string()))?;
        items_from_listing(Self::read_json(resp).await?)
    }

    async fn get_item(&self, item_id: &str) -> Result<WorkflowItem, WorkflowError> {
        let resp = self
            .authorized(self.client.get(self.item_url(item_id)))
            .send()
            .await
            .map_err(|e| WorkflowError::Http(e.to_string()))?;
        match Self::read_json(resp).await? {
            Value::Object(item) => Ok(item),
            _ => Err(WorkflowError::InvalidResponse("item is not an object".into())),
        }
    }

    async fn update_item(&self, item_id: &str, fields: &WorkflowItem) -> Result<(), WorkflowError> {
        let resp = self
            .authorized(self.client.put(self.item_url(item_id)))
            .json(fields)
            .send()
            .await
            .map_err(|e| WorkflowError::Http(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WorkflowError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn client() -> KissflowClient {
        KissflowClient::new(
            &WorkflowConfig {
                base_url: "https://acme.kissflow.com/process/2/Ac1".into(),
                process_id: "AOG".into(),
                access_key_id: "id".into(),
                access_key_secret: SecretString::from("secret"),
                page_size: 100,
                max_pages: 100,
                reference_fields: vec!["Grant_ID".into()],
                comments_field: "KYC_Comments".into(),
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn urls_follow_process_layout() {
        let c = client();
        assert_eq!(
            c.list_url(),
            "https://acme.kissflow.com/process/2/Ac1/admin/AOG/item"
        );
        assert_eq!(
            c.item_url("Pk123"),
            "https://acme.kissflow.com/process/2/Ac1/AOG/Pk123"
        );
    }

    #[test]
    fn listing_accepts_data_wrapper_and_bare_array() {
        let wrapped = items_from_listing(json!({"Data": [{"_id": "a"}, 3]})).unwrap();
        assert_eq!(wrapped.len(), 1);
        let bare = items_from_listing(json!([{"_id": "a"}, {"_id": "b"}])).unwrap();
        assert_eq!(bare.len(), 2);
        assert!(items_from_listing(json!({})).unwrap().is_empty());
        assert!(items_from_listing(json!("nope")).is_err());
    }
}
