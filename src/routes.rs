use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, Form, FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::any::Any;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, warn};

use crate::converter::{ConversionRequest, ConvertResponse};
use crate::error::ConvertError;
use crate::html::render_index;
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router<AppState> {
    let body_limit = state.settings.max_content_length;

    Router::new()
        .route("/", get(index))
        .route("/convert", post(convert_code))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Full application with the middleware stack, ready to serve
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(create_routes(state.clone()))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "internal error".to_string()
    };
    error!("Request handler panicked: {}", message);
    (StatusCode::OK, Json(ConvertResponse::failure(message))).into_response()
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_index(
        state.converter.languages(),
        &state.settings.allowed_extensions,
    ))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let keys: Vec<&str> = state
        .converter
        .languages()
        .iter()
        .map(|l| l.key.as_str())
        .collect();
    Json(json!({
        "status": "healthy",
        "supported_languages": keys
    }))
}

async fn convert_code(
    State(state): State<AppState>,
    form: ConvertForm,
) -> Result<Json<ConvertResponse>, ConvertError> {
    let mut source_text = form.code_input.unwrap_or_default();

    // An accepted upload replaces any inline code.
    if let Some(file) = form.file {
        if state.uploads.is_allowed(&file.filename) {
            source_text = state.uploads.read_upload(&file.filename, &file.data).await?;
        } else {
            warn!("Ignoring upload with disallowed extension: {}", file.filename);
        }
    }

    let request = ConversionRequest::validate(
        &source_text,
        form.target_language.as_deref(),
        form.custom_prompt.as_deref(),
    )?;

    let result = state
        .converter
        .convert(
            &request.source_text,
            &request.target_language_key,
            &request.extra_instructions,
        )
        .await;

    Ok(Json(result.into()))
}

pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

/// Fields of the `/convert` form, from either a multipart or an url-encoded body
#[derive(Default)]
pub struct ConvertForm {
    pub target_language: Option<String>,
    pub custom_prompt: Option<String>,
    pub code_input: Option<String>,
    pub file: Option<UploadedFile>,
}

impl ConvertForm {
    fn text_slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "target_language" => Some(&mut self.target_language),
            "custom_prompt" => Some(&mut self.custom_prompt),
            "code_input" => Some(&mut self.code_input),
            _ => None,
        }
    }

    /// A repeated field keeps its first value.
    fn set_text(&mut self, name: &str, value: String) {
        match self.text_slot(name) {
            Some(slot) => {
                if slot.is_none() {
                    *slot = Some(value);
                }
            }
            None => debug!("Ignoring unknown form field: {}", name),
        }
    }

    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = Self::default();
        for (name, value) in pairs {
            form.set_text(&name, value);
        }
        form
    }

    async fn from_multipart(multipart: &mut Multipart) -> Result<Self, ConvertError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                // Browsers send an empty part when no file was chosen.
                if !filename.is_empty() && form.file.is_none() {
                    form.file = Some(UploadedFile { filename, data });
                }
            } else if form.text_slot(&name).is_some() {
                let value = field.text().await?;
                form.set_text(&name, value);
            } else {
                debug!("Ignoring unknown form field: {}", name);
                field.bytes().await?;
            }
        }

        Ok(form)
    }
}

#[async_trait]
impl<S> FromRequest<S> for ConvertForm
where
    S: Send + Sync,
{
    type Rejection = ConvertError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ConvertError::Unexpected(e.body_text()))?;
            Self::from_multipart(&mut multipart).await
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| ConvertError::Unexpected(e.body_text()))?;
            Ok(Self::from_pairs(pairs))
        } else {
            // Anything that is not a form carries no form fields.
            debug!("Request without form content type: {:?}", content_type);
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockCompletionClient;
    use crate::settings::Settings;
    use axum::{body::Body, http::Request as HttpRequest};
    use std::path::Path;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "cfconvert-test-boundary";

    fn app(client: Arc<MockCompletionClient>, upload_dir: &Path) -> Router {
        let settings = Settings {
            upload_dir: upload_dir.to_path_buf(),
            ..Settings::default()
        };
        build_app(AppState::with_client(settings, client))
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str)>) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        if let Some((filename, content)) = file {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn multipart_request(body: String) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri("/convert")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn urlencoded_request(body: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri("/convert")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_lists_configured_keys() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("unused");
        let response = app(client.clone(), dir.path())
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({
                "status": "healthy",
                "supported_languages": ["react", "ruby", "python", "php", "java", "csharp"]
            })
        );
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn index_renders_form() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(MockCompletionClient::replying("unused"), dir.path())
            .oneshot(HttpRequest::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("<option value=\"csharp\">C# with ASP.NET</option>"));
    }

    #[tokio::test]
    async fn inline_code_is_converted() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("<?php echo 1;");
        let response = app(client.clone(), dir.path())
            .oneshot(urlencoded_request(
                "target_language=php&code_input=%3Ccfoutput%3E1%3C%2Fcfoutput%3E",
            ))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["converted_code"], "<?php echo 1;");
        assert_eq!(body["usage"]["total_tokens"], 150);
        assert!(body.get("error").is_none());

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].messages[1].content.contains("<cfoutput>1</cfoutput>"));
        assert!(requests[0].messages[1].content.contains("and PHP."));
    }

    #[tokio::test]
    async fn blank_code_is_rejected_without_upstream_call() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("unused");
        let response = app(client.clone(), dir.path())
            .oneshot(urlencoded_request("target_language=php&code_input=+++"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "success": false, "error": "No ColdFusion code provided" })
        );
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_target_is_rejected_without_upstream_call() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("unused");
        let response = app(client.clone(), dir.path())
            .oneshot(multipart_request(multipart_body(
                &[("code_input", "<cfset x = 1>")],
                None,
            )))
            .await
            .unwrap();

        assert_eq!(
            json_body(response).await,
            json!({ "success": false, "error": "No target language specified" })
        );
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn body_without_content_type_has_no_fields() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("unused");
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/convert")
            .body(Body::empty())
            .unwrap();
        let response = app(client.clone(), dir.path()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "success": false, "error": "No ColdFusion code provided" })
        );
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn repeated_urlencoded_field_keeps_first_value() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("converted");
        let response = app(client.clone(), dir.path())
            .oneshot(urlencoded_request(
                "target_language=php&code_input=cfFirstValue&code_input=cfSecondValue&target_language=java",
            ))
            .await
            .unwrap();

        assert_eq!(json_body(response).await["success"], true);
        let prompt = &client.requests()[0].messages[1].content;
        assert!(prompt.contains("cfFirstValue"));
        assert!(!prompt.contains("cfSecondValue"));
        assert!(prompt.contains("and PHP."));
    }

    #[tokio::test]
    async fn repeated_multipart_field_keeps_first_value() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("converted");
        let response = app(client.clone(), dir.path())
            .oneshot(multipart_request(multipart_body(
                &[
                    ("target_language", "php"),
                    ("code_input", "cfFirstValue"),
                    ("code_input", "cfSecondValue"),
                ],
                None,
            )))
            .await
            .unwrap();

        assert_eq!(json_body(response).await["success"], true);
        let prompt = &client.requests()[0].messages[1].content;
        assert!(prompt.contains("cfFirstValue"));
        assert!(!prompt.contains("cfSecondValue"));
    }

    #[tokio::test]
    async fn upload_supersedes_inline_code() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("converted");
        let response = app(client.clone(), dir.path())
            .oneshot(multipart_request(multipart_body(
                &[
                    ("target_language", "react"),
                    ("code_input", "<cfset inline = true>"),
                    ("custom_prompt", "Use hooks"),
                ],
                Some(("page.cfm", "<cfset uploaded = true>")),
            )))
            .await
            .unwrap();

        assert_eq!(json_body(response).await["success"], true);
        let prompt = &client.requests()[0].messages[1].content;
        assert!(prompt.contains("<cfset uploaded = true>"));
        assert!(!prompt.contains("<cfset inline = true>"));
        assert!(prompt.contains("Use hooks"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn disallowed_upload_falls_back_to_inline_code() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("converted");
        let response = app(client.clone(), dir.path())
            .oneshot(multipart_request(multipart_body(
                &[
                    ("target_language", "ruby"),
                    ("code_input", "<cfset inline = true>"),
                ],
                Some(("payload.exe", "<cfset uploaded = true>")),
            )))
            .await
            .unwrap();

        assert_eq!(json_body(response).await["success"], true);
        let prompt = &client.requests()[0].messages[1].content;
        assert!(prompt.contains("<cfset inline = true>"));
        assert!(!prompt.contains("<cfset uploaded = true>"));
    }

    #[tokio::test]
    async fn upstream_failure_is_reported_and_server_keeps_serving() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::failing(500, "The server had an error");
        let app = app(client.clone(), dir.path());

        let response = app
            .clone()
            .oneshot(urlencoded_request("target_language=java&code_input=x"))
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await,
            json!({ "success": false, "error": "OpenAI API returned 500: The server had an error" })
        );

        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn invalid_utf8_upload_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("unused");
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"target_language\"\r\n\r\nphp\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"bad.cfm\"\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(&[0xFF, 0xFE, 0x00]);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = HttpRequest::builder()
            .method("POST")
            .uri("/convert")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app(client.clone(), dir.path()).oneshot(request).await.unwrap();

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "uploaded file bad.cfm is not valid UTF-8");
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockCompletionClient::replying("unused");
        let settings = Settings {
            upload_dir: dir.path().to_path_buf(),
            max_content_length: 64,
            ..Settings::default()
        };
        let app = build_app(AppState::with_client(settings, client.clone()));

        let code = "x".repeat(1024);
        let response = app
            .oneshot(multipart_request(multipart_body(
                &[("target_language", "php"), ("code_input", code.as_str())],
                None,
            )))
            .await
            .unwrap();

        assert_eq!(json_body(response).await["success"], false);
        assert_eq!(client.call_count(), 0);
    }
}
