use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use plant_types::models::{NewPhoto, Photo, PhotoQuery};

use super::{Endpoints, check};
use crate::credential::{Credential, apply_optional};
use crate::error::{StorageError, StorageResult};
use crate::live::ChangeFeed;
use crate::traits::DocumentStore;

const COLLECTION: &str = "photos";

/// The `photos` collection of a Firestore database, over REST.
///
/// REST has no push channel, so subscriptions poll `runQuery` every
/// `poll_interval`.
#[derive(Clone)]
pub struct Firestore {
    http: Client,
    project_id: String,
    endpoints: Endpoints,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

impl Firestore {
    pub fn new(
        http: Client,
        project_id: impl Into<String>,
        endpoints: Endpoints,
        poll_interval: Duration,
    ) -> Self {
        Self {
            http,
            project_id: project_id.into(),
            endpoints,
            poll_interval,
        }
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents",
            self.endpoints.firestore, self.project_id
        )
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url(), COLLECTION, urlencoding::encode(id))
    }
}

#[async_trait]
impl DocumentStore for Firestore {
    async fn create(&self, photo: NewPhoto, credential: &Credential) -> StorageResult<Photo> {
        let body = encode_fields(&photo, Utc::now());
        let req = self
            .http
            .post(format!("{}/{}", self.documents_url(), COLLECTION))
            .json(&body);
        let response = check(credential.apply(req).send().await?, COLLECTION).await?;
        let doc: Document = response.json().await?;
        let photo = decode_document(doc)?;

        debug!("Created document {} for {}", photo.id, photo.user_id);
        Ok(photo)
    }

    async fn get(&self, id: &str, credential: Option<&Credential>) -> StorageResult<Photo> {
        let req = self.http.get(self.document_url(id));
        let response = check(apply_optional(req, credential).send().await?, id).await?;
        decode_document(response.json().await?)
    }

    async fn delete(&self, id: &str, credential: &Credential) -> StorageResult<()> {
        // Without the precondition Firestore reports success for a missing
        // document, which would let a repeated delete reach the object store.
        let req = self
            .http
            .delete(self.document_url(id))
            .query(&[("currentDocument.exists", "true")]);
        check(credential.apply(req).send().await?, id).await?;

        debug!("Deleted document {}", id);
        Ok(())
    }

    async fn query(
        &self,
        query: &PhotoQuery,
        credential: Option<&Credential>,
    ) -> StorageResult<Vec<Photo>> {
        let req = self
            .http
            .post(format!("{}:runQuery", self.documents_url()))
            .json(&structured_query(query));
        let response = check(apply_optional(req, credential).send().await?, COLLECTION).await?;
        let items: Vec<RunQueryItem> = response.json().await?;

        // The collection has no schema; a record this client cannot read is
        // left out of the listing rather than failing it.
        let photos = items
            .into_iter()
            .filter_map(|item| item.document)
            .filter_map(|doc| {
                decode_document(doc)
                    .inspect_err(|e| warn!("Skipping unreadable photo document: {}", e))
                    .ok()
            });
        Ok(query.apply(photos))
    }

    fn changes(&self) -> ChangeFeed {
        ChangeFeed::poll(self.poll_interval)
    }
}

/// Typed field map for a create request.
fn encode_fields(photo: &NewPhoto, created_at: DateTime<Utc>) -> Value {
    let mut fields = Map::new();
    fields.insert("userId".into(), json!({ "stringValue": photo.user_id }));
    fields.insert("userEmail".into(), json!({ "stringValue": photo.user_email }));
    fields.insert("imageUrl".into(), json!({ "stringValue": photo.image_url }));
    if let Some(caption) = &photo.caption {
        fields.insert("caption".into(), json!({ "stringValue": caption }));
    }
    fields.insert(
        "createdAt".into(),
        json!({ "timestampValue": created_at.to_rfc3339_opts(SecondsFormat::Micros, true) }),
    );
    json!({ "fields": fields })
}

fn structured_query(query: &PhotoQuery) -> Value {
    let mut structured = json!({
        "from": [{ "collectionId": COLLECTION }],
        "orderBy": [{
            "field": { "fieldPath": "createdAt" },
            "direction": "DESCENDING"
        }]
    });
    if let Some(owner) = &query.owner {
        structured["where"] = json!({
            "fieldFilter": {
                "field": { "fieldPath": "userId" },
                "op": "EQUAL",
                "value": { "stringValue": owner }
            }
        });
    }
    json!({ "structuredQuery": structured })
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

fn decode_document(doc: Document) -> StorageResult<Photo> {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StorageError::Decode(format!("document name {:?}", doc.name)))?
        .to_string();

    let created_at = doc
        .fields
        .get("createdAt")
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .or(doc.create_time)
        .ok_or_else(|| StorageError::Decode(format!("{id}: no createdAt")))?;

    let user_id = string_field(&doc.fields, "userId")
        .ok_or_else(|| StorageError::Decode(format!("{id}: no userId")))?;
    let image_url = string_field(&doc.fields, "imageUrl")
        .ok_or_else(|| StorageError::Decode(format!("{id}: no imageUrl")))?;

    Ok(Photo {
        id,
        user_id,
        user_email: string_field(&doc.fields, "userEmail").unwrap_or_default(),
        image_url,
        caption: string_field(&doc.fields, "caption"),
        created_at,
    })
}
