use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use sentinel::config::Config;
use sentinel::controller::Controller;
use sentinel::gateway::run_gateway_with_listener;
use sentinel::knowledge::{ManualChunk, ManualsIndex, NO_MATCH_ANSWER, UNAVAILABLE_MESSAGE};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::fakes::{self, FakeChannel, NGINX_CHECK, NGINX_DOWN, NGINX_UP, Reply, ScriptedOracle};

struct GatewayTestServer {
    base: String,
    client: reqwest::Client,
    controller: Arc<Controller>,
    _data: TempDir,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl GatewayTestServer {
    async fn start(channel: FakeChannel, oracle: ScriptedOracle) -> Self {
        let data = TempDir::new().unwrap();
        let controller = fakes::controller(Arc::new(channel), Arc::new(oracle), data.path());
        Self::serve(controller, data).await
    }

    /// Server whose engine answers questions from `manuals`.
    async fn start_with_manuals(manuals: Vec<ManualChunk>) -> Self {
        let data = TempDir::new().unwrap();
        let engine = fakes::engine(
            Arc::new(FakeChannel::new()),
            Arc::new(ScriptedOracle::default()),
            &data.path().join("memory"),
            3,
        )
        .with_knowledge(Arc::new(ManualsIndex::from_chunks(manuals)));
        Self::serve(Arc::new(Controller::new(Arc::new(engine))), data).await
    }

    async fn serve(controller: Arc<Controller>, data: TempDir) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut config = Config::default();
        config.oracle.api_key = Some("sk-test-key".into());
        config.remote.password = Some("hunter2".into());

        let served = Arc::clone(&controller);
        let handle = tokio::spawn(async move {
            run_gateway_with_listener("127.0.0.1", listener, served, &config).await
        });

        Self {
            base: format!("http://127.0.0.1:{port}"),
            client: reqwest::Client::new(),
            controller,
            _data: data,
            handle,
        }
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = self.client.post(format!("{}{path}", self.base));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, path: &str) -> StatusCode {
        self.client
            .delete(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap()
            .status()
    }

    /// Poll `/agent/state` until the run status is `expected`.
    async fn wait_for_status(&self, expected: &str) -> Value {
        for _ in 0..200 {
            let (_, state) = self.get("/agent/state").await;
            if state["status"] == expected {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run never reached status {expected}");
    }
}

impl Drop for GatewayTestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn critical_oracle() -> ScriptedOracle {
    ScriptedOracle::answering(&["nginx crashed", "sudo service nginx restart"])
}

#[tokio::test]
async fn health_reports_run_status() {
    let server = GatewayTestServer::start(FakeChannel::new(), ScriptedOracle::default()).await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["run_status"], "idle");
}

#[tokio::test]
async fn status_runs_a_live_fleet_check() {
    let channel = FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(3, NGINX_DOWN)]);
    let server = GatewayTestServer::start(channel, ScriptedOracle::default()).await;

    let (status, body) = server.get("/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "nginx");
    assert_eq!(body[0]["status"], "stopped");
    assert_eq!(body[0]["type"], "web_server");
}

#[tokio::test]
async fn lifecycle_errors_map_to_client_errors() {
    let server = GatewayTestServer::start(FakeChannel::new(), ScriptedOracle::default()).await;

    let (status, body) = server.post("/agent/stop", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = server.post("/agent/approve?action=maybe", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.post("/agent/approve", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.post("/agent/approve?action=approve", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_run_is_a_conflict() {
    let channel = FakeChannel::new().script(NGINX_CHECK, &[Reply::Hang]);
    let server = GatewayTestServer::start(channel, ScriptedOracle::default()).await;

    let (status, body) = server.post("/agent/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "started");

    let (status, _) = server.post("/agent/run", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = server.post("/agent/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    let state = server.wait_for_status("idle").await;
    assert_eq!(state["last_outcome"]["outcome"], "cancelled");
}

#[tokio::test]
async fn critical_plan_waits_then_rejection_escalates() {
    let channel = FakeChannel::new().script(NGINX_CHECK, &[Reply::Out(3, NGINX_DOWN)]);
    let server = GatewayTestServer::start(channel, critical_oracle()).await;

    let (status, _) = server.post("/agent/run", None).await;
    assert_eq!(status, StatusCode::OK);

    let state = server.wait_for_status("waiting").await;
    assert_eq!(state["state"]["approval_status"], "WAITING_APPROVAL");
    assert_eq!(
        state["state"]["security_flags"][0],
        "CRITICAL: sudo service nginx restart"
    );

    let (status, body) = server.post("/agent/approve?action=reject", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "reject");

    let state = server.wait_for_status("idle").await;
    assert_eq!(state["last_outcome"]["outcome"], "escalated");
    assert_eq!(state["last_outcome"]["reason"], "plan rejected by operator");
}

#[tokio::test]
async fn approval_executes_the_held_plan() {
    let channel = FakeChannel::new().script(
        NGINX_CHECK,
        &[Reply::Out(3, NGINX_DOWN), Reply::Out(0, NGINX_UP)],
    );
    let server = GatewayTestServer::start(channel, critical_oracle()).await;

    server.post("/agent/run", None).await;
    server.wait_for_status("waiting").await;

    let (status, _) = server.post("/agent/approve?action=approve", None).await;
    assert_eq!(status, StatusCode::OK);

    let state = server.wait_for_status("idle").await;
    assert_eq!(state["last_outcome"]["outcome"], "recovered");

    let (_, memory) = server.get("/memory").await;
    assert_eq!(memory["episodes"][0]["command"], "sudo service nginx restart");
    assert_eq!(memory["summary"]["successes"], 1);
    assert_eq!(server.controller.episodes().len(), 1);
}

#[tokio::test]
async fn services_can_be_added_and_removed() {
    let server = GatewayTestServer::start(FakeChannel::new(), ScriptedOracle::default()).await;

    let redis = json!({
        "name": "redis",
        "check_command": "redis-cli ping",
        "running_indicator": "PONG",
        "type": "cache",
    });
    let (status, _) = server.post("/services", Some(redis)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, services) = server.get("/services").await;
    let names: Vec<&str> = services
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(names, vec!["nginx", "redis"]);

    let blank = json!({"name": "", "check_command": "x", "running_indicator": "y"});
    let (status, _) = server.post("/services", Some(blank)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(server.delete("/services/memcached").await, StatusCode::NOT_FOUND);
    assert_eq!(server.delete("/services/redis").await, StatusCode::OK);
    let (_, services) = server.get("/services").await;
    assert_eq!(services.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn config_hides_credentials() {
    let server = GatewayTestServer::start(FakeChannel::new(), ScriptedOracle::default()).await;
    let (status, body) = server.get("/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["oracle"]["api_key"], "***");
    assert_eq!(body["remote"]["password"], "***");
    assert_eq!(body["gateway"]["port"], 8000);
}

#[tokio::test]
async fn chat_answers_from_the_manuals() {
    let server = GatewayTestServer::start_with_manuals(vec![ManualChunk {
        source: "nginx.md".into(),
        text: "If nginx fails to bind port 80, stop the process holding the port.".into(),
    }])
    .await;

    let (status, body) = server
        .post("/chat", Some(json!({"message": "nginx cannot bind port 80"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let answer = body["answer"].as_str().unwrap();
    assert!(answer.contains("stop the process holding the port"));
    assert!(answer.contains("nginx.md"));

    let (status, body) = server
        .post("/chat", Some(json!({"query": "postgresql replication lag"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], NO_MATCH_ANSWER);
}

#[tokio::test]
async fn chat_rejects_empty_or_malformed_requests() {
    let server = GatewayTestServer::start_with_manuals(Vec::new()).await;

    let (status, _) = server.post("/chat", Some(json!({"message": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server.post("/chat", Some(json!({"text": "hi"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_without_knowledge_base_is_unavailable() {
    let server = GatewayTestServer::start(FakeChannel::new(), ScriptedOracle::default()).await;

    let (status, body) = server
        .post("/chat", Some(json!({"message": "how do I restart nginx?"})))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], UNAVAILABLE_MESSAGE);
}
