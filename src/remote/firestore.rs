use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{RemoteCatalog, RemoteDocument};
use crate::error::{CatalogError, Result};
use crate::settings::RemoteConfig;

/// Documents requested per list call.
const PAGE_SIZE: usize = 300;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct FirestoreDocument {
    /// Full resource name, ending in `/{collection}/{id}`.
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Client for the menu collection via the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreCatalog {
    client: Client,
    documents_url: String,
    auth_token: Option<String>,
    write_timeout: Duration,
}

impl FirestoreCatalog {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            client: Client::new(),
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents/{}",
                config.api_base.trim_end_matches('/'),
                config.project_id,
                config.collection
            ),
            auth_token: config.auth_token.clone(),
            write_timeout: Duration::from_secs(config.write_timeout_secs),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_page(&self, page_token: Option<&str>) -> Result<ListDocumentsResponse> {
        let mut url = Url::parse(&self.documents_url)
            .map_err(|e| CatalogError::RemoteUnreachable(format!("Invalid Firestore URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("pageSize", &PAGE_SIZE.to_string());
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| CatalogError::RemoteUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::RemoteUnreachable(format!(
                "Firestore returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::RemoteUnreachable(format!("Failed to parse documents: {}", e)))
    }
}

#[async_trait]
impl RemoteCatalog for FirestoreCatalog {
    fn backend(&self) -> &'static str {
        "firestore"
    }

    async fn fetch_all(&self) -> Result<Vec<RemoteDocument>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.fetch_page(page_token.as_deref()).await?;
            for doc in page.documents {
                match decode_document(&doc) {
                    Some(decoded) => documents.push(decoded),
                    None => tracing::warn!("Skipping malformed menu document {}", doc.name),
                }
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!("Fetched {} menu documents from Firestore", documents.len());
        Ok(documents)
    }

    async fn put(&self, doc: &RemoteDocument) -> Result<()> {
        let request = self
            .client
            .patch(format!("{}/{}", self.documents_url, doc.id))
            .json(&encode_fields(doc)?)
            .timeout(self.write_timeout);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| CatalogError::RemoteWriteFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::RemoteWriteFailed(format!(
                "PATCH {} returned {}: {}",
                doc.id, status, body
            )));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .delete(format!("{}/{}", self.documents_url, id))
            .timeout(self.write_timeout);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| CatalogError::RemoteWriteFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::RemoteWriteFailed(format!(
                "DELETE {} returned {}: {}",
                id, status, body
            )));
        }
        Ok(())
    }
}

/// Request body for a document write.
fn encode_fields(doc: &RemoteDocument) -> Result<Value> {
    let price = doc.price.to_f64().ok_or_else(|| {
        CatalogError::RemoteWriteFailed(format!("price {} is not representable", doc.price))
    })?;
    Ok(json!({
        "fields": {
            "name": { "stringValue": doc.name },
            "description": { "stringValue": doc.description },
            "price": { "doubleValue": price },
            "imageName": { "stringValue": doc.image_name },
        }
    }))
}

/// Turn a Firestore document into a catalog document.
///
/// Returns `None` when the id, name or price is missing or unusable.
/// Missing description and image default to empty strings.
fn decode_document(doc: &FirestoreDocument) -> Option<RemoteDocument> {
    let id = doc.name.rsplit('/').next().filter(|id| !id.is_empty())?;
    let name = string_field(&doc.fields, "name")?;
    let price = number_field(&doc.fields, "price")?;
    if price.is_sign_negative() && !price.is_zero() {
        return None;
    }

    Some(RemoteDocument {
        id: id.to_string(),
        name,
        description: string_field(&doc.fields, "description").unwrap_or_default(),
        price,
        image_name: string_field(&doc.fields, "imageName").unwrap_or_default(),
    })
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

fn number_field(fields: &Map<String, Value>, key: &str) -> Option<Decimal> {
    let value = fields.get(key)?;
    if let Some(double) = value.get("doubleValue").and_then(Value::as_f64) {
        return Decimal::from_f64(double).map(|d| d.round_dp(4).normalize());
    }
    // integerValue is transmitted as a decimal string.
    let integer = value.get("integerValue")?;
    match integer {
        Value::String(s) => s.parse::<i64>().ok().map(Decimal::from),
        Value::Number(n) => n.as_i64().map(Decimal::from),
        _ => None,
    }
}
