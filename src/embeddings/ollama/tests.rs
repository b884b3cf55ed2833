use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OllamaClient {
    let address = server.address();
    let mut config = Config::with_base_dir("/tmp");
    config.ollama.host = address.ip().to_string();
    config.ollama.port = address.port();
    config.embedding.model = "test-model".to_string();

    OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_http_client(
            HttpClient::new(Duration::from_secs(5))
                .with_retry_attempts(2)
                .with_backoff_unit(Duration::from_millis(5)),
        )
}

#[test]
fn client_configuration() {
    let mut config = Config::with_base_dir("/tmp");
    config.ollama.host = "test-host".to_string();
    config.ollama.port = 1234;
    config.embedding.model = "test-model".to_string();
    config.retrieval.retry_attempts = 5;

    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.http.retry_attempts(), 5);
    assert_eq!(client.http.timeout(), Duration::from_secs(30));
}

#[test]
fn client_builder_methods() {
    let config = Config::with_base_dir("/tmp");
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(4);

    assert_eq!(client.http.timeout(), Duration::from_secs(60));
    assert_eq!(client.http.retry_attempts(), 4);
}

#[test]
fn empty_input_makes_no_request() {
    let config = Config::with_base_dir("/tmp");
    let client = OllamaClient::new(&config).expect("Failed to create client");
    let vectors = client.embed_texts(&[]).expect("empty input should succeed");
    assert!(vectors.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_batch_posts_inputs_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_json(json!({
            "model": "test-model",
            "input": ["first", "second"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model",
            "embeddings": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let vectors = client
        .embed_batch(vec!["first".to_string(), "second".to_string()])
        .await
        .expect("embedding should succeed");

    assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_batch_rejects_count_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client
        .embed_batch(vec!["a".to_string(), "b".to_string()])
        .await;

    let error = result.expect_err("count mismatch should fail");
    assert!(error.to_string().contains("Mismatch"));
}

#[tokio::test(flavor = "multi_thread")]
async fn list_models_and_validate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "test-model", "size": 274302450, "digest": "abc"},
                {"name": "other-model"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || {
        let models = client.list_models()?;
        client.health_check()?;
        Ok::<_, anyhow::Error>(models)
    })
    .await
    .expect("task should not panic");

    let models = result.expect("health check should pass");
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].size, Some(274302450));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_model_fails_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "other-model"}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.validate_model())
        .await
        .expect("task should not panic");

    assert!(result.is_err());
}
