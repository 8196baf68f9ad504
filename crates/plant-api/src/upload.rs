use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State},
};
use bytes::Bytes;
use chrono::Utc;
use tracing::{info, warn};

use plant_storage::traits::FALLBACK_CONTENT_TYPE;
use plant_storage::{Credential, CredentialPlacement, DocumentStore, ObjectStore, keys};
use plant_types::api::UploadResponse;
use plant_types::models::{NewPhoto, Photo};

use crate::error::ApiError;
use crate::state::AppState;

/// One validated upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub data: Bytes,
    pub file_name: String,
    pub content_type: Option<String>,
    pub user_id: String,
    pub user_email: String,
    pub caption: Option<String>,
    pub credential: Credential,
}

/// Multipart fields as they arrived, before validation.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(Bytes, String, Option<String>)>,
    user_id: Option<String>,
    user_email: Option<String>,
    caption: Option<String>,
    id_token: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match name.as_str() {
                "file" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let content_type = field.content_type().map(str::to_string);
                    let data = field.bytes().await?;
                    form.file = Some((data, file_name, content_type));
                }
                "userId" => form.user_id = Some(field.text().await?),
                "userEmail" => form.user_email = Some(field.text().await?),
                "caption" => form.caption = Some(field.text().await?),
                "idToken" => form.id_token = Some(field.text().await?),
                _ => {}
            }
        }

        Ok(form)
    }

    /// Check the required fields. Nothing has touched a store yet.
    fn validate(self, placement: CredentialPlacement) -> Result<UploadRequest, ApiError> {
        let (data, file_name, content_type) = self
            .file
            .filter(|(data, _, _)| !data.is_empty())
            .ok_or(ApiError::MissingFields)?;
        let user_id = non_empty(self.user_id).ok_or(ApiError::MissingFields)?;
        let id_token = non_empty(self.id_token).ok_or(ApiError::MissingFields)?;

        Ok(UploadRequest {
            data,
            file_name,
            content_type: non_empty(content_type),
            user_id,
            user_email: self.user_email.unwrap_or_default(),
            caption: non_empty(self.caption),
            credential: Credential::new(id_token, placement),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Write the bytes, then the record. No compensation: a failed record write
/// leaves the object behind.
pub struct UploadPipeline {
    objects: Arc<dyn ObjectStore>,
    documents: Arc<dyn DocumentStore>,
}

impl UploadPipeline {
    pub fn new(objects: Arc<dyn ObjectStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { objects, documents }
    }

    pub async fn run(&self, req: UploadRequest) -> Result<Photo, ApiError> {
        let key = keys::photo_key(&req.user_id, &req.file_name, Utc::now());
        let content_type = req.content_type.as_deref().unwrap_or(FALLBACK_CONTENT_TYPE);

        if let Err(e) = self
            .objects
            .put(&key, req.data, content_type, &req.credential)
            .await
        {
            warn!("Object write for {} failed: {}", key, e);
            return Err(ApiError::ObjectWrite(e));
        }

        let new_photo = NewPhoto {
            user_id: req.user_id,
            user_email: req.user_email,
            image_url: self.objects.retrieval_url(&key),
            caption: req.caption,
        };

        match self.documents.create(new_photo, &req.credential).await {
            Ok(photo) => {
                info!("Uploaded photo {} for {} at {}", photo.id, photo.user_id, key);
                Ok(photo)
            }
            Err(e) => {
                warn!("Metadata write failed, object {} is orphaned: {}", key, e);
                Err(ApiError::MetadataWrite { key, source: e })
            }
        }
    }
}

async fn handle_upload(
    state: AppState,
    multipart: Multipart,
    placement: CredentialPlacement,
) -> Result<Json<UploadResponse>, ApiError> {
    let req = UploadForm::read(multipart).await?.validate(placement)?;
    let photo = UploadPipeline::new(state.objects.clone(), state.documents.clone())
        .run(req)
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        photo,
    }))
}

/// POST /api/upload: credential travels as a bearer header.
pub async fn upload_photo(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    handle_upload(state, multipart, CredentialPlacement::Header).await
}

/// POST /api/upload/token-param: credential travels as `access_token`.
pub async fn upload_photo_token_param(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    handle_upload(state, multipart, CredentialPlacement::QueryParam).await
}
