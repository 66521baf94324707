use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, Instrument};

use crate::agent::{AgentConfig, Completion, QueryRequest};
use crate::error::{CompletionFailure, PartialCompletion, PipelineError};
use crate::executor::EndpointExecutor;
use crate::generator::QueryGenerator;
use crate::llm::CompletionProvider;
use crate::registry::AgentDirectory;
use crate::shape::ShapePolicy;
use crate::synthesizer::ResponseSynthesizer;

/// Directory -> generation -> execution -> synthesis.
///
/// Each stage is also exposed on its own. Every call is stateless: the agent
/// is looked up once per call and only borrowed by the stages.
pub struct Pipeline {
    directory: Arc<dyn AgentDirectory>,
    generator: QueryGenerator,
    executor: EndpointExecutor,
    synthesizer: ResponseSynthesizer,
}

impl Pipeline {
    pub fn new(
        directory: Arc<dyn AgentDirectory>,
        provider: Arc<dyn CompletionProvider>,
        executor: EndpointExecutor,
        shape_policy: ShapePolicy,
    ) -> Self {
        Self {
            directory,
            generator: QueryGenerator::new(provider.clone(), shape_policy),
            executor,
            synthesizer: ResponseSynthesizer::new(provider),
        }
    }

    pub fn directory(&self) -> &Arc<dyn AgentDirectory> {
        &self.directory
    }

    async fn resolve(&self, agent_name: &str) -> Result<AgentConfig, PipelineError> {
        self.directory
            .get_agent(agent_name)
            .await?
            .ok_or_else(|| PipelineError::AgentNotFound(agent_name.to_string()))
    }

    pub async fn generate_query(&self, request: &QueryRequest) -> Result<Value, PipelineError> {
        validate(request)?;
        let agent = self.resolve(&request.agent_name).await?;
        Ok(self.generator.generate(&agent, &request.user_query).await?)
    }

    /// Runs a query (generated or hand-edited) against the agent's endpoint.
    pub async fn execute_query(&self, agent_name: &str, query: &Value) -> Result<Value, PipelineError> {
        let agent = self.resolve(agent_name).await?;
        Ok(self.executor.execute(&agent, query).await?)
    }

    pub async fn respond(
        &self,
        request: &QueryRequest,
        api_results: &Value,
    ) -> Result<String, PipelineError> {
        validate(request)?;
        let agent = self.resolve(&request.agent_name).await?;
        Ok(self
            .synthesizer
            .synthesize(&agent, &request.user_query, api_results)
            .await?)
    }

    pub async fn complete(&self, request: &QueryRequest) -> Result<Completion, CompletionFailure> {
        let span = tracing::info_span!("complete_query", agent = %request.agent_name);
        let result = self.run_stages(request).instrument(span).await;
        if let Err(failure) = &result {
            error!(
                agent = %request.agent_name,
                stage = %failure.error.stage(),
                kind = failure.error.kind(),
                "query workflow failed: {}",
                failure.error
            );
        }
        result
    }

    async fn run_stages(&self, request: &QueryRequest) -> Result<Completion, CompletionFailure> {
        let mut partial = PartialCompletion::default();
        let fail = |error: PipelineError, partial: &PartialCompletion| {
            CompletionFailure::new(error, partial.clone())
        };

        validate(request).map_err(|e| fail(e, &partial))?;
        let agent = self.resolve(&request.agent_name).await.map_err(|e| fail(e, &partial))?;

        info!("Step 1: query generation");
        let generated_query = self
            .generator
            .generate(&agent, &request.user_query)
            .await
            .map_err(|e| fail(e.into(), &partial))?;
        partial.generated_query = Some(generated_query.clone());

        info!("Step 2: endpoint execution");
        let api_results = self
            .executor
            .execute(&agent, &generated_query)
            .await
            .map_err(|e| fail(e.into(), &partial))?;
        partial.api_results = Some(api_results.clone());

        info!("Step 3: response synthesis");
        let response = self
            .synthesizer
            .synthesize(&agent, &request.user_query, &api_results)
            .await
            .map_err(|e| fail(e.into(), &partial))?;

        info!("query workflow completed");
        Ok(Completion {
            response,
            generated_query,
            api_results,
        })
    }
}

fn validate(request: &QueryRequest) -> Result<(), PipelineError> {
    if request.user_query.trim().is_empty() {
        return Err(PipelineError::InvalidRequest(
            "user_query must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::agent::AgentRecord;
    use crate::error::{ExecutionError, GenerationError, Stage, SynthesisError};
    use crate::registry::MemoryRegistry;
    use crate::testing::ScriptedProvider;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/weather")
    }

    async fn weather_endpoint(hits: Arc<Mutex<usize>>) -> String {
        serve(Router::new().route(
            "/weather",
            post(move || {
                let hits = hits.clone();
                async move {
                    *hits.lock().unwrap() += 1;
                    Json(json!({"temp_c": 18}))
                }
            }),
        ))
        .await
    }

    fn weather_agent(endpoint: String) -> AgentRecord {
        AgentRecord {
            name: "weather".to_string(),
            credential: "sk-weather".to_string(),
            system_prompt: "You report the weather.".to_string(),
            endpoint,
            endpoint_info: "Current conditions by city".to_string(),
            example_query: json!({"city": "string"}),
            test_scenarios: String::new(),
            created_at: None,
        }
    }

    fn pipeline(endpoint: String, provider: Arc<ScriptedProvider>) -> Pipeline {
        let directory = MemoryRegistry::from_records(vec![weather_agent(endpoint)]).unwrap();
        Pipeline::new(
            Arc::new(directory),
            provider,
            EndpointExecutor::new(Duration::from_secs(5)).unwrap(),
            ShapePolicy::Warn,
        )
    }

    fn request(agent_name: &str, user_query: &str) -> QueryRequest {
        QueryRequest {
            agent_name: agent_name.to_string(),
            user_query: user_query.to_string(),
        }
    }

    #[tokio::test]
    async fn weather_scenario_yields_the_full_triple() {
        let hits = Arc::new(Mutex::new(0));
        let endpoint = weather_endpoint(hits.clone()).await;
        let provider = Arc::new(ScriptedProvider::new([
            r#"{"city":"Paris"}"#,
            "It's 18°C in Paris.",
        ]));

        let completion = pipeline(endpoint, provider)
            .complete(&request("weather", "What's the weather in Paris?"))
            .await
            .unwrap();

        assert_eq!(
            completion,
            Completion {
                response: "It's 18°C in Paris.".to_string(),
                generated_query: json!({"city": "Paris"}),
                api_results: json!({"temp_c": 18}),
            }
        );
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn complete_matches_the_composed_stages() {
        let endpoint = weather_endpoint(Arc::new(Mutex::new(0))).await;
        let script = [r#"{"city":"Paris"}"#, "It's 18°C in Paris."];
        let req = request("weather", "What's the weather in Paris?");

        let composed = pipeline(endpoint.clone(), Arc::new(ScriptedProvider::new(script)));
        let query = composed.generate_query(&req).await.unwrap();
        let results = composed.execute_query(&req.agent_name, &query).await.unwrap();
        let answer = composed.respond(&req, &results).await.unwrap();

        let whole = pipeline(endpoint, Arc::new(ScriptedProvider::new(script)))
            .complete(&req)
            .await
            .unwrap();

        assert_eq!(whole.generated_query, query);
        assert_eq!(whole.api_results, results);
        assert_eq!(whole.response, answer);
    }

    #[tokio::test]
    async fn unknown_agent_fails_every_stage_without_network_calls() {
        let hits = Arc::new(Mutex::new(0));
        let endpoint = weather_endpoint(hits.clone()).await;
        let provider = Arc::new(ScriptedProvider::new(["{}", "{}", "{}"]));
        let pipeline = pipeline(endpoint, provider.clone());
        let req = request("ghost", "anything");

        assert!(matches!(
            pipeline.generate_query(&req).await,
            Err(PipelineError::AgentNotFound(_))
        ));
        assert!(matches!(
            pipeline.execute_query("ghost", &json!({})).await,
            Err(PipelineError::AgentNotFound(_))
        ));
        assert!(matches!(
            pipeline.respond(&req, &json!({})).await,
            Err(PipelineError::AgentNotFound(_))
        ));
        let failure = pipeline.complete(&req).await.unwrap_err();
        assert!(matches!(failure.error, PipelineError::AgentNotFound(_)));
        assert_eq!(failure.partial, PartialCompletion::default());

        assert_eq!(provider.calls(), 0);
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_user_query_is_rejected_before_any_call() {
        let provider = Arc::new(ScriptedProvider::new(["{}"]));
        let pipeline = pipeline("http://127.0.0.1:9/unused".to_string(), provider.clone());

        let failure = pipeline.complete(&request("weather", "   ")).await.unwrap_err();

        assert!(matches!(failure.error, PipelineError::InvalidRequest(_)));
        assert_eq!(failure.error.stage(), Stage::Request);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn endpoint_failure_keeps_the_generated_query() {
        let endpoint = serve(Router::new().route(
            "/weather",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "bad request"})),
                )
            }),
        ))
        .await;
        let provider = Arc::new(ScriptedProvider::new([r#"{"city":"Paris"}"#, "unused"]));

        let failure = pipeline(endpoint, provider.clone())
            .complete(&request("weather", "What's the weather in Paris?"))
            .await
            .unwrap_err();

        assert_eq!(failure.error.stage(), Stage::Execution);
        match &failure.error {
            PipelineError::Execution(ExecutionError::Status { status, body }) => {
                assert_eq!(*status, 500);
                assert_eq!(body, &json!({"error": "bad request"}));
            }
            other => panic!("expected endpoint error, got {other:?}"),
        }
        assert_eq!(failure.partial.generated_query, Some(json!({"city": "Paris"})));
        assert_eq!(failure.partial.api_results, None);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn synthesis_failure_reports_both_earlier_results() {
        let endpoint = weather_endpoint(Arc::new(Mutex::new(0))).await;
        let provider = Arc::new(ScriptedProvider::new([r#"{"city":"Paris"}"#, "  "]));

        let failure = pipeline(endpoint, provider)
            .complete(&request("weather", "What's the weather in Paris?"))
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            PipelineError::Synthesis(SynthesisError::EmptyCompletion)
        ));
        assert_eq!(failure.partial.generated_query, Some(json!({"city": "Paris"})));
        assert_eq!(failure.partial.api_results, Some(json!({"temp_c": 18})));
    }

    #[tokio::test]
    async fn generation_failure_never_reaches_the_endpoint() {
        let hits = Arc::new(Mutex::new(0));
        let endpoint = weather_endpoint(hits.clone()).await;
        let provider = Arc::new(ScriptedProvider::new(["no json", "still none"]));

        let failure = pipeline(endpoint, provider)
            .complete(&request("weather", "What's the weather in Paris?"))
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            PipelineError::Generation(GenerationError::Unparseable { attempts: 2 })
        ));
        assert_eq!(failure.partial, PartialCompletion::default());
        assert_eq!(*hits.lock().unwrap(), 0);
    }
}
