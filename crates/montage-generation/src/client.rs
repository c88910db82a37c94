//! HTTP client for task-based generation providers
//!
//! Providers accept a job over `POST <base><endpoint>`, answer with a `{code, msg, data}`
//! envelope carrying a `taskId`, and report progress at `GET <base><status_path>?taskId=`.

use montage_core::config::GenerationSettings;
use montage_core::models::{join_url, Provider, ResolvedModel};
use montage_core::template::display_text;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use tracing::debug;

use crate::error::GenerationError;

const UNKNOWN_ERROR: &str = "Unknown error";

/// Provider-reported job state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Finished. Result URLs are in provider order and never empty.
    Success { result_urls: Vec<String> },
    Failed { message: String },
    /// Anything else, lower-cased (`""` when the provider omitted it).
    InProgress(String),
}

#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    settings: GenerationSettings,
}

impl Debug for ProviderClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ProviderClient")
            .field("status_path", &self.settings.status_path)
            .finish()
    }
}

impl ProviderClient {
    pub fn new(settings: GenerationSettings) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GenerationError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Submit a job and return the provider's task id.
    pub async fn submit(&self, target: &ResolvedModel, body: &Value) -> Result<String, GenerationError> {
        let url = target.submit_url();
        debug!(url = %url, model = %target.model.name, "Submitting generation job");

        let request = self
            .http
            .post(&url)
            .timeout(self.settings.submit_timeout)
            .json(body);
        let response = with_auth(request, &target.provider)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest("Failed to submit generation job", e))?;
        let response = check_status("Generation submit", response).await?;

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::from_reqwest("Failed to parse submit response", e))?;

        parse_submit_envelope(&envelope)
    }

    /// Fetch the current job record for `task_id`.
    pub async fn job_status(&self, provider: &Provider, task_id: &str) -> Result<JobState, GenerationError> {
        let url = join_url(&provider.base_url, &self.settings.status_path);

        let request = self
            .http
            .get(&url)
            .query(&[("taskId", task_id)])
            .timeout(self.settings.status_timeout);
        let response = with_auth(request, provider)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest("Failed to query job status", e))?;
        let response = check_status("Job status", response).await?;

        let record: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::from_reqwest("Failed to parse job status", e))?;

        parse_job_record(&record)
    }

    /// Download a result file.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, GenerationError> {
        let response = self
            .http
            .get(url)
            .timeout(self.settings.download_timeout)
            .send()
            .await
            .map_err(|e| GenerationError::from_reqwest("Failed to download result", e))?;
        let response = check_status("Result download", response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::from_reqwest("Failed to read result body", e))?;

        Ok(bytes.to_vec())
    }
}

fn with_auth(request: RequestBuilder, provider: &Provider) -> RequestBuilder {
    match provider.bearer_token() {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn check_status(context: &str, response: Response) -> Result<Response, GenerationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| UNKNOWN_ERROR.to_string());
    let message = format!("{} failed: {} - {}", context, status, body);

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(GenerationError::Transport(message))
    } else {
        Err(GenerationError::Provider(message))
    }
}

fn code_is_ok(code: Option<&Value>) -> bool {
    match code {
        Some(Value::Number(n)) => n.as_i64() == Some(200) || n.as_f64() == Some(200.0),
        _ => false,
    }
}

/// Validate a submit envelope and extract `data.taskId`.
pub fn parse_submit_envelope(envelope: &Value) -> Result<String, GenerationError> {
    let code = envelope.get("code");
    if !code_is_ok(code) {
        let code = code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        let msg = envelope
            .get("msg")
            .map(display_text)
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
        return Err(GenerationError::Provider(format!(
            "API error (code {}): {}",
            code, msg
        )));
    }

    let data = match envelope.get("data") {
        Some(Value::Object(data)) if !data.is_empty() => data,
        _ => {
            return Err(GenerationError::Provider(
                "Data missing in response".to_string(),
            ))
        }
    };

    match data.get("taskId") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(GenerationError::Provider(
            "Task ID missing in response".to_string(),
        )),
    }
}

/// Interpret a job record `{data: {state, resultJson, failMsg}}`.
pub fn parse_job_record(record: &Value) -> Result<JobState, GenerationError> {
    let data = record.get("data").filter(|d| d.is_object());
    let field = |name: &str| data.and_then(|d| d.get(name));

    let state = field("state")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();

    match state.as_str() {
        "success" => {
            let result_urls = parse_result_urls(field("resultJson"))?;
            if result_urls.is_empty() {
                return Err(GenerationError::Provider(
                    "Result URLs not found".to_string(),
                ));
            }
            Ok(JobState::Success { result_urls })
        }
        "failed" => {
            let message = field("failMsg")
                .map(display_text)
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
            Ok(JobState::Failed { message })
        }
        _ => Ok(JobState::InProgress(state)),
    }
}

/// `resultJson` arrives either as an object or as a string holding JSON.
fn parse_result_urls(result_json: Option<&Value>) -> Result<Vec<String>, GenerationError> {
    let decoded;
    let result = match result_json {
        Some(Value::String(raw)) if raw.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(raw)) => {
            decoded = serde_json::from_str::<Value>(raw).map_err(|e| {
                GenerationError::Provider(format!("Invalid resultJson: {}", e))
            })?;
            &decoded
        }
        Some(other) => other,
        None => return Ok(Vec::new()),
    };

    let urls = result
        .get("resultUrls")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{fixture_model, fixture_provider};
    use mockito::Matcher;
    use serde_json::json;

    fn client() -> ProviderClient {
        ProviderClient::new(GenerationSettings::default()).unwrap()
    }

    #[test]
    fn envelope_with_code_200_yields_task_id() {
        let id = parse_submit_envelope(&json!({"code": 200, "msg": "success", "data": {"taskId": "abc"}}))
            .unwrap();
        assert_eq!(id, "abc");

        let id = parse_submit_envelope(&json!({"code": 200.0, "data": {"taskId": "f"}})).unwrap();
        assert_eq!(id, "f");
    }

    #[test]
    fn error_coded_envelope_carries_code_and_message() {
        let err = parse_submit_envelope(&json!({"code": 500, "msg": "bad request"})).unwrap_err();
        assert_eq!(err.to_string(), "API error (code 500): bad request");

        let err = parse_submit_envelope(&json!({"code": 401})).unwrap_err();
        assert_eq!(err.to_string(), "API error (code 401): Unknown error");
    }

    #[test]
    fn present_envelope_message_is_kept_verbatim() {
        let err = parse_submit_envelope(&json!({"code": 422, "msg": ""})).unwrap_err();
        assert_eq!(err.to_string(), "API error (code 422): ");

        let err = parse_submit_envelope(&json!({"code": 422, "msg": null})).unwrap_err();
        assert_eq!(err.to_string(), "API error (code 422): None");

        let state = parse_job_record(&json!({"data": {"state": "failed", "failMsg": ""}})).unwrap();
        assert_eq!(state, JobState::Failed { message: String::new() });
    }

    #[test]
    fn missing_task_id_is_a_provider_error() {
        let err = parse_submit_envelope(&json!({"code": 200, "data": {}})).unwrap_err();
        assert!(matches!(err, GenerationError::Provider(_)));

        let err = parse_submit_envelope(&json!({"code": 200, "data": {"state": "x"}})).unwrap_err();
        assert_eq!(err.to_string(), "Task ID missing in response");
    }

    #[test]
    fn job_record_states() {
        let state = parse_job_record(&json!({"data": {"state": "SUCCESS", "resultJson": "{\"resultUrls\":[\"https://cdn/x.mp4\"]}"}})).unwrap();
        assert_eq!(
            state,
            JobState::Success {
                result_urls: vec!["https://cdn/x.mp4".to_string()]
            }
        );

        let state = parse_job_record(&json!({"data": {"state": "success", "resultJson": {"resultUrls": ["a.png", "b.png"]}}})).unwrap();
        assert_eq!(
            state,
            JobState::Success {
                result_urls: vec!["a.png".to_string(), "b.png".to_string()]
            }
        );

        let state = parse_job_record(&json!({"data": {"state": "failed", "failMsg": "nsfw"}})).unwrap();
        assert_eq!(state, JobState::Failed { message: "nsfw".to_string() });

        let state = parse_job_record(&json!({"data": {"state": "failed"}})).unwrap();
        assert_eq!(state, JobState::Failed { message: "Unknown error".to_string() });

        let state = parse_job_record(&json!({"data": {"state": "generating"}})).unwrap();
        assert_eq!(state, JobState::InProgress("generating".to_string()));

        let state = parse_job_record(&json!({})).unwrap();
        assert_eq!(state, JobState::InProgress(String::new()));
    }

    #[test]
    fn success_without_urls_is_an_error() {
        let err = parse_job_record(&json!({"data": {"state": "success", "resultJson": "{\"resultUrls\":[]}"}})).unwrap_err();
        assert_eq!(err.to_string(), "Result URLs not found");

        let err = parse_job_record(&json!({"data": {"state": "success", "resultJson": "not json"}})).unwrap_err();
        assert!(err.to_string().starts_with("Invalid resultJson"));
    }

    #[tokio::test]
    async fn submit_posts_template_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/jobs/createTask")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::Json(json!({"prompt": "a cat"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":200,"msg":"success","data":{"taskId":"task-1"}}"#)
            .expect(1)
            .create_async()
            .await;

        let resolved = ResolvedModel {
            provider: fixture_provider(&server.url(), "sk-test"),
            model: fixture_model("/api/v1/jobs/createTask", json!({})),
        };
        let id = client()
            .submit(&resolved, &json!({"prompt": "a cat"}))
            .await
            .unwrap();

        assert_eq!(id, "task-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn submit_without_key_sends_no_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/jobs")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"code":200,"data":{"taskId":"t"}}"#)
            .create_async()
            .await;

        let resolved = ResolvedModel {
            provider: fixture_provider(&server.url(), ""),
            model: fixture_model("jobs", json!({})),
        };
        client().submit(&resolved, &json!({})).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_transport_and_client_errors_are_provider() {
        let mut server = mockito::Server::new_async().await;
        let _busy = server
            .mock("POST", "/busy")
            .with_status(503)
            .create_async()
            .await;
        let _bad = server
            .mock("POST", "/bad")
            .with_status(400)
            .with_body("nope")
            .create_async()
            .await;

        let provider = fixture_provider(&server.url(), "k");
        let busy = ResolvedModel {
            provider: provider.clone(),
            model: fixture_model("/busy", json!({})),
        };
        let bad = ResolvedModel {
            provider,
            model: fixture_model("/bad", json!({})),
        };

        assert!(client().submit(&busy, &json!({})).await.unwrap_err().is_transport());
        let err = client().submit(&bad, &json!({})).await.unwrap_err();
        assert!(matches!(err, GenerationError::Provider(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_transport() {
        let resolved = ResolvedModel {
            provider: fixture_provider("http://127.0.0.1:1", "k"),
            model: fixture_model("/jobs", json!({})),
        };
        let err = client().submit(&resolved, &json!({})).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn job_status_queries_record_info_with_task_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/jobs/recordInfo")
            .match_query(Matcher::UrlEncoded("taskId".into(), "abc".into()))
            .match_header("authorization", "Bearer k")
            .with_status(200)
            .with_body(r#"{"code":200,"data":{"state":"queuing"}}"#)
            .expect(1)
            .create_async()
            .await;

        let state = client()
            .job_status(&fixture_provider(&server.url(), "k"), "abc")
            .await
            .unwrap();

        assert_eq!(state, JobState::InProgress("queuing".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn download_returns_body_bytes() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/out/video.mp4")
            .with_status(200)
            .with_body(b"mp4-bytes".to_vec())
            .create_async()
            .await;

        let bytes = client()
            .download(&format!("{}/out/video.mp4", server.url()))
            .await
            .unwrap();
        assert_eq!(bytes, b"mp4-bytes");
    }
}
