use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{info, warn};

use crate::agent::AgentConfig;
use crate::error::ExecutionError;

/// Sends a structured query to an agent's third-party endpoint.
///
/// Every call is a single POST with the query as its JSON body. Nothing is
/// retried: the endpoint may have side effects.
#[derive(Clone)]
pub struct EndpointExecutor {
    client: Client,
    timeout: Duration,
}

impl EndpointExecutor {
    pub fn new(timeout: Duration) -> Result<Self, ExecutionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutionError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    pub async fn execute(&self, agent: &AgentConfig, query: &Value) -> Result<Value, ExecutionError> {
        info!(agent = %agent.name, endpoint = %agent.endpoint, "executing query");

        let mut request = self
            .client
            .post(&agent.endpoint)
            .header(ACCEPT, "application/json")
            .json(query);
        let credential = agent.credential.expose_secret();
        if !credential.is_empty() {
            request = request.bearer_auth(credential);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;
        let body = decode_body(&text);

        if !status.is_success() {
            warn!(agent = %agent.name, status = status.as_u16(), "endpoint returned an error");
            return Err(ExecutionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(agent = %agent.name, bytes = text.len(), "endpoint responded");
        Ok(body)
    }

    fn classify(&self, err: reqwest::Error) -> ExecutionError {
        if err.is_timeout() {
            ExecutionError::Timeout(self.timeout)
        } else {
            // Strip the URL: it can carry query-string secrets.
            ExecutionError::Transport(err.without_url().to_string())
        }
    }
}

// Endpoints are not guaranteed to speak JSON; anything else is kept as text.
fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use secrecy::SecretString;
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Clone, Default)]
    struct Seen {
        auth: Arc<Mutex<Option<String>>>,
        body: Arc<Mutex<Option<Value>>>,
        hits: Arc<Mutex<usize>>,
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/query")
    }

    fn agent(endpoint: String, credential: &str) -> AgentConfig {
        AgentConfig {
            name: "weather".to_string(),
            credential: SecretString::from(credential.to_string()),
            system_prompt: "You report the weather.".to_string(),
            endpoint,
            endpoint_info: String::new(),
            example_query: json!({"city": "string"}),
            test_scenarios: String::new(),
        }
    }

    async fn recording(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        *seen.auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *seen.body.lock().unwrap() = Some(body);
        *seen.hits.lock().unwrap() += 1;
        Json(json!({"temp_c": 18}))
    }

    #[tokio::test]
    async fn posts_the_query_with_bearer_credential() {
        let seen = Seen::default();
        let url = serve(Router::new().route("/query", post(recording)).with_state(seen.clone())).await;
        let executor = EndpointExecutor::new(Duration::from_secs(5)).unwrap();

        let result = executor
            .execute(&agent(url, "sk-endpoint"), &json!({"city": "Paris"}))
            .await
            .unwrap();

        assert_eq!(result, json!({"temp_c": 18}));
        assert_eq!(seen.auth.lock().unwrap().as_deref(), Some("Bearer sk-endpoint"));
        assert_eq!(*seen.body.lock().unwrap(), Some(json!({"city": "Paris"})));
        assert_eq!(*seen.hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_credential_sends_no_authorization_header() {
        let seen = Seen::default();
        let url = serve(Router::new().route("/query", post(recording)).with_state(seen.clone())).await;
        let executor = EndpointExecutor::new(Duration::from_secs(5)).unwrap();

        executor
            .execute(&agent(url, ""), &json!({"city": "Paris"}))
            .await
            .unwrap();

        assert_eq!(*seen.auth.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn non_success_status_carries_status_and_body() {
        let router = Router::new().route(
            "/query",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "bad request"})),
                )
            }),
        );
        let url = serve(router).await;
        let executor = EndpointExecutor::new(Duration::from_secs(5)).unwrap();

        let err = executor
            .execute(&agent(url, "sk"), &json!({"city": "Paris"}))
            .await
            .unwrap_err();

        match err {
            ExecutionError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, json!({"error": "bad request"}));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let router = Router::new().route(
            "/query",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({}))
            }),
        );
        let url = serve(router).await;
        let executor = EndpointExecutor::new(Duration::from_millis(200)).unwrap();

        let err = executor
            .execute(&agent(url, "sk"), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout(d) if d == Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let executor = EndpointExecutor::new(Duration::from_secs(2)).unwrap();

        let err = executor
            .execute(&agent(format!("http://{addr}/query"), "sk"), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Transport(_)));
    }

    #[test]
    fn non_json_bodies_are_kept_as_text() {
        assert_eq!(decode_body("plain text"), json!("plain text"));
        assert_eq!(decode_body("  "), Value::Null);
        assert_eq!(decode_body("[1,2]"), json!([1, 2]));
    }
}
