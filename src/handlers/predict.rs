//! Prediction handler
//!
//! Per request: pick the response format, require POST and an `image` file
//! field, save the upload, preprocess, infer, run the persistence policy and
//! answer as JSON or HTML.

use axum::{
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header::ACCEPT, HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::inference::Label;
use crate::views::{self, ResponseFormat, ResultView};
use crate::{AppError, AppResult, AppState};

const IMAGE_FIELD: &str = "image";

#[derive(Debug, Default)]
pub struct PredictQuery {
    pub json: Option<String>,
}

impl PredictQuery {
    /// Last `json` value wins when the flag is repeated.
    pub fn from_uri(uri: &Uri) -> Self {
        match Query::<Vec<(String, String)>>::try_from_uri(uri) {
            Ok(Query(pairs)) => Self {
                json: pairs
                    .into_iter()
                    .filter(|(key, _)| key == "json")
                    .map(|(_, value)| value)
                    .last(),
            },
            Err(e) => {
                tracing::debug!("Ignoring unparsable query string: {}", e);
                Self::default()
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub prediction: Label,
    pub probability: f32,
    pub image_url: String,
}

/// JSON when `?json=1|true|yes` or when `Accept` mentions `application/json`
pub fn negotiate(query: &PredictQuery, headers: &HeaderMap) -> ResponseFormat {
    let by_query = query
        .json
        .as_deref()
        .map(|v| ["1", "true", "yes"].contains(&v))
        .unwrap_or(false);

    let by_header = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("application/json"));

    if by_query || by_header {
        ResponseFormat::Json
    } else {
        ResponseFormat::Html
    }
}

/// GET|POST /predict/
pub async fn predict(State(state): State<AppState>, req: Request) -> Response {
    let query = PredictQuery::from_uri(req.uri());
    let format = negotiate(&query, req.headers());

    if req.method() != Method::POST {
        return match format {
            ResponseFormat::Json => AppError::MethodNotAllowed.respond(format),
            ResponseFormat::Html => Html(views::home_page()).into_response(),
        };
    }

    match run(&state, req).await {
        Ok(view) => match format {
            ResponseFormat::Json => Json(PredictResponse {
                prediction: view.prediction,
                probability: view.probability,
                image_url: view.image_url,
            })
            .into_response(),
            ResponseFormat::Html => Html(views::result_page(&view)).into_response(),
        },
        Err(e) => e.respond(format),
    }
}

struct Upload {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

async fn run(state: &AppState, req: Request) -> AppResult<ResultView> {
    let upload = read_image_field(state, req).await?;

    let stored = state
        .storage
        .save_upload(upload.file_name.as_deref(), &upload.bytes)
        .await?;

    // Decode and inference are CPU bound
    let pipeline = state.pipeline.clone();
    let path = stored.absolute_path.clone();
    let (prediction, resized) = tokio::task::spawn_blocking(move || {
        let preprocessed = pipeline.preprocess(&path)?;
        let prediction = pipeline.infer(&preprocessed.tensor)?;
        Ok::<_, crate::inference::PipelineError>((prediction, preprocessed.image))
    })
    .await
    .map_err(|e| AppError::InternalError(format!("inference task failed: {}", e)))??;

    let outcome = state.policy.apply(&stored, &prediction, resized).await;

    tracing::info!(
        "Predicted {} (p={:.4}) for {} [record: {:?}, archived: {}]",
        prediction.label,
        prediction.probability,
        stored.relative_path,
        outcome.record_id,
        outcome.archived.is_some()
    );

    Ok(ResultView::new(
        prediction.label,
        prediction.probability,
        state.storage.url(&stored.relative_path),
    ))
}

/// Find the `image` file field in a multipart body.
///
/// A non-multipart body, or a file input left empty (no file name, no
/// bytes), counts as a missing field. A named empty file goes on to fail
/// decoding.
async fn read_image_field(state: &AppState, req: Request) -> AppResult<Upload> {
    let mut multipart = Multipart::from_request(req, state).await.map_err(|e| {
        tracing::debug!("Not a multipart request: {}", e);
        AppError::MissingImageField
    })?;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(AppError::MissingImageField),
            Err(e) => return Err(multipart_error(e)),
        };

        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.is_empty() && file_name.as_deref().map_or(true, str::is_empty) {
            return Err(AppError::MissingImageField);
        }

        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::ValidationError(format!("Malformed multipart body: {}", err.body_text()))
    }
}
