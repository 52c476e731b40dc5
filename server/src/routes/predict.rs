//! Prediction endpoint
//!
//! `POST /predict` takes a multipart upload in the `photo` field and answers
//! with the arg-max label and its probability.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::state::SharedState;

/// Multipart field carrying the image
pub const PHOTO_FIELD: &str = "photo";

/// Client-facing message for processing failures
const GENERIC_FAILURE: &str = "Failed to process image";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn client_error(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn server_error(state: &SharedState, detail: String) -> ApiError {
    error!("Prediction failed: {}", detail);
    let message = if state.config.expose_errors {
        detail
    } else {
        GENERIC_FAILURE.to_string()
    };
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
}

/// POST /predict - Classify an uploaded leaf photo
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Rejected non-multipart request: {}", e);
        client_error("No file part")
    })?;

    let bytes = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(PHOTO_FIELD) => {
                break field.bytes().await.map_err(|e| {
                    warn!("Failed to read upload: {}", e);
                    client_error("Invalid multipart request")
                })?;
            }
            Ok(Some(_)) => continue,
            Ok(None) => return Err(client_error("No file part")),
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return Err(client_error("Invalid multipart request"));
            }
        }
    };

    let classifier = state.classifier.clone();
    let result = tokio::task::spawn_blocking(move || classifier.predict_bytes(&bytes)).await;

    match result {
        Ok(Ok(prediction)) => {
            info!(
                "Prediction: index {} ({}) with confidence {:.2}",
                prediction.class_index, prediction.label, prediction.confidence
            );
            Ok(Json(PredictResponse {
                label: prediction.label,
                confidence: prediction.confidence,
            }))
        }
        Ok(Err(e)) => Err(server_error(&state, e.to_string())),
        Err(e) => Err(server_error(&state, format!("inference task failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::router;
    use crate::state::{AppState, ServerConfig};

    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, Response};
    use image::{ImageFormat, Rgb, RgbImage};
    use tomato_leaf::{decode_prediction, Classifier, ImageTensor, Prediction};
    use tower::ServiceExt;

    const BOUNDARY: &str = "leafboundary";

    /// Always answers with a one-hot vector and counts forward passes
    struct OneHotClassifier {
        labels: Vec<String>,
        index: usize,
        calls: AtomicUsize,
    }

    impl OneHotClassifier {
        fn new(index: usize) -> Arc<Self> {
            Arc::new(Self {
                labels: ["bacterial_spot", "early_blight", "late_blight", "leaf_mold", "healthy"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                index,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Classifier for OneHotClassifier {
        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn predict(&self, _image: &ImageTensor) -> tomato_leaf::Result<Prediction> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut probabilities = vec![0.0; self.labels.len()];
            probabilities[self.index] = 1.0;
            decode_prediction(&probabilities, &self.labels)
        }
    }

    fn app(classifier: Arc<OneHotClassifier>, expose_errors: bool) -> axum::Router {
        let config = ServerConfig {
            expose_errors,
            ..ServerConfig::default()
        };
        router(Arc::new(AppState::new(config, classifier)))
    }

    fn png() -> Vec<u8> {
        let img = RgbImage::from_pixel(3, 2, Rgb([40, 160, 40]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn multipart_request(field: &str, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"leaf.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    /// Body whose `photo` part is cut off before its closing boundary
    fn truncated_upload() -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{PHOTO_FIELD}\"; filename=\"leaf.png\"\r\nContent-Type: image/png\r\n\r\npartial image data"
        );
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: Response<Body>) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_one_hot_healthy() {
        let response = app(OneHotClassifier::new(4), false)
            .oneshot(multipart_request(PHOTO_FIELD, &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!({"label": "healthy", "confidence": 1.0})
        );
    }

    #[tokio::test]
    async fn test_missing_photo_field() {
        let classifier = OneHotClassifier::new(0);
        let response = app(classifier.clone(), false)
            .oneshot(multipart_request("image", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "No file part");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_multipart_request() {
        let classifier = OneHotClassifier::new(0);
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app(classifier.clone(), false).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "No file part");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_truncated_upload_is_client_error() {
        let classifier = OneHotClassifier::new(0);
        let response = app(classifier.clone(), false)
            .oneshot(truncated_upload())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "Invalid multipart request");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_corrupt_image_then_recovers() {
        let classifier = OneHotClassifier::new(1);
        let app = app(classifier.clone(), false);

        let response = app
            .clone()
            .oneshot(multipart_request(PHOTO_FIELD, b"definitely not a png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(response).await["error"], GENERIC_FAILURE);

        let response = app
            .oneshot(multipart_request(PHOTO_FIELD, &png()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["label"], "early_blight");
    }

    #[tokio::test]
    async fn test_exposed_error_text() {
        let response = app(OneHotClassifier::new(0), true)
            .oneshot(multipart_request(PHOTO_FIELD, b"garbage"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(!message.is_empty());
        assert_ne!(message, GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn test_health_lists_labels() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app(OneHotClassifier::new(0), false)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["labels"][4], "healthy");
    }
}
