use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    error::ServiceError,
    model::{Classifier, Prediction},
    preprocess::preprocess_image,
    store::{PredictionRecord, PredictionStore},
};

const IMAGE_FIELD: &str = "image";

/// Handles shared by every request. A missing handle means the dependency
/// failed at startup and the routes that need it answer with a 500.
#[derive(Clone, Default)]
pub struct AppContext {
    pub classifier: Option<Arc<dyn Classifier>>,
    pub store: Option<Arc<dyn PredictionStore>>,
}

impl AppContext {
    pub fn new(
        classifier: Option<Arc<dyn Classifier>>,
        store: Option<Arc<dyn PredictionStore>>,
    ) -> Self {
        AppContext { classifier, store }
    }
}

pub fn router(ctx: AppContext, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/predict", post(predict_handler))
        .route("/history", get(history_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(ctx))
}

async fn index() -> &'static str {
    "Corn leaf disease classification API is active"
}

async fn health_check(State(ctx): State<Arc<AppContext>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "OK",
        "model_loaded": ctx.classifier.is_some(),
        "database_available": ctx.store.is_some(),
    }))
}

async fn predict_handler(
    State(ctx): State<Arc<AppContext>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, ServiceError> {
    let classifier = ctx.classifier.clone().ok_or(ServiceError::ModelUnavailable)?;
    let store = ctx.store.as_ref().ok_or(ServiceError::StoreUnavailable)?;

    // A body that is not multipart carries no image field either.
    let image_data = match multipart {
        Ok(multipart) => read_image_field(multipart).await?,
        Err(_) => None,
    }
    .ok_or_else(ServiceError::missing_image)?;

    let prediction = tokio::task::spawn_blocking(move || -> Result<Prediction, ServiceError> {
        let batch = preprocess_image(&image_data)?;
        let probabilities = classifier.classify(&batch)?;
        Ok(Prediction::from_probabilities(&probabilities)?)
    })
    .await
    .map_err(|err| ServiceError::Internal(err.to_string()))??;

    store
        .record(
            prediction.label.as_str(),
            prediction.confidence,
            Utc::now().naive_utc(),
        )
        .await?;

    tracing::info!(
        label = %prediction.label,
        confidence = prediction.confidence,
        "Prediction recorded"
    );
    Ok(Json(prediction))
}

/// Returns the first uploaded file part named `image`. Plain form fields are ignored.
async fn read_image_field(mut multipart: Multipart) -> Result<Option<Bytes>, ServiceError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(IMAGE_FIELD) && field.file_name().is_some() {
            let bytes = field.bytes().await.map_err(multipart_error)?;
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

fn multipart_error(err: MultipartError) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge
    } else {
        ServiceError::Validation(err.body_text())
    }
}

async fn history_handler(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<Vec<PredictionRecord>>, ServiceError> {
    let store = ctx.store.as_ref().ok_or(ServiceError::StoreUnavailable)?;
    let records = store.list_all().await?;
    Ok(Json(records))
}
