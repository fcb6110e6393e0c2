use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, error};

pub const DEFAULT_API_URL: &str = "https://api.siputzx.my.id/api/ai/gpt3";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Shadow a dark ai";

/// Reply used when the endpoint answers without a usable `result`
pub const SILENT_REPLY: &str = "The shadows remain silent... Perhaps try again?";
/// Reply used when the endpoint can't be reached or answers with garbage
pub const UNREACHABLE_REPLY: &str =
    "The veil between worlds is too thick... I cannot reach the other side.";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("request to Shadow endpoint failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Shadow endpoint answered with status {0}")]
    Status(StatusCode),
    #[error("Shadow endpoint returned an unreadable body: {0}")]
    Body(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct ShadowClient {
    client: Client,
    base_url: String,
    system_prompt: String,
}

impl ShadowClient {
    pub fn new(base_url: &str, system_prompt: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            system_prompt: system_prompt.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URL for one user message. Both parameters are
    /// percent-encoded; only RFC 3986 unreserved characters pass through.
    pub fn request_url(&self, content: &str) -> String {
        format!(
            "{}?prompt={}&content={}",
            self.base_url,
            urlencoding::encode(&self.system_prompt),
            urlencoding::encode(content)
        )
    }

    /// Ask the endpoint once. `Ok(None)` means the call worked but carried no
    /// usable `result`.
    pub async fn query(&self, content: &str) -> Result<Option<String>, QueryError> {
        let url = self.request_url(content);
        debug!(%url, "querying Shadow endpoint");

        let response = self
            .client
            .get(&url)
            .header("accept", "*/*")
            .send()
            .await
            .map_err(QueryError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::Status(status));
        }

        let body = response.bytes().await.map_err(QueryError::Transport)?;
        let parsed: serde_json::Value = serde_json::from_slice(&body)?;

        // Any well-formed body without a `result` key (arrays and scalars
        // included) is an empty answer, not a failure
        Ok(parsed.get("result").cloned().and_then(result_text))
    }

    /// Always produces something to show: the endpoint's answer or one of the
    /// two canned replies.
    pub async fn reply(&self, content: &str) -> String {
        match self.query(content).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("Shadow endpoint returned no result");
                SILENT_REPLY.to_string()
            }
            Err(e) => {
                error!(error = %e, "error calling Shadow API");
                UNREACHABLE_REPLY.to_string()
            }
        }
    }
}

/// Keep only truthy values: null, false, 0 and "" count as no answer.
fn result_text(value: serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Local stand-in for the Shadow endpoint

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Router,
    };

    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub params: HashMap<String, String>,
        pub accept: Option<String>,
    }

    #[derive(Clone)]
    struct ServerState {
        status: StatusCode,
        body: String,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    pub struct TestServer {
        pub url: String,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    impl TestServer {
        pub fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn handle(
        State(state): State<ServerState>,
        Query(params): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        let accept = headers
            .get("accept")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        state.requests.lock().unwrap().push(Recorded { params, accept });
        (state.status, state.body.clone())
    }

    /// Serve `body` with `status` for every request to `/api/ai/gpt3`
    pub async fn spawn(status: u16, body: &str) -> TestServer {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
            requests: requests.clone(),
        };

        let app = Router::new()
            .route("/api/ai/gpt3", get(handle))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            url: format!("http://{addr}/api/ai/gpt3"),
            requests,
        }
    }

    /// A URL nothing is listening on
    pub async fn dead_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/api/ai/gpt3")
    }
}
