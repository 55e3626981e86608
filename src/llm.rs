use crate::config::{Config, ConfigError};
use crate::events::Message;
use crate::fragment::Fragment;
use crate::streaming::fragment_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Duration;

/// Pull-based stream of provider fragments, one `Result` per pull.
pub type FragmentStream = BoxStream<'static, Result<Fragment, StreamError>>;

/// Faults while opening or reading a completion stream.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider error: {0}")]
    Provider(String),
}

/// Request to send to LLM
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: crate::config::DEFAULT_TEMPERATURE,
            stream: true,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Anything that can turn a transcript into a stream of completion fragments.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, StreamError>;
}

/// Groq client for streaming responses
#[derive(Clone)]
pub struct LlmClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl LlmClient {
    /// Build a client with the key from the config file or the environment.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Self::with_api_key(config, config.api_key()?)
    }

    pub fn with_api_key(config: &Config, api_key: String) -> Result<Self, ConfigError> {
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        // Only the handshake is bounded; a reply may legitimately stream for
        // minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<FragmentStream, StreamError> {
        let url = self.completions_url();
        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            temperature = request.temperature,
            "opening completion stream"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %body, "completion request rejected");
            return Err(StreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(fragment_stream(Box::pin(response.bytes_stream())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::Accumulator;
    use futures::StreamExt;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve exactly one HTTP exchange with a canned response and hand back
    /// the raw request that was received.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (base_url, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    fn client_for(base_url: String) -> LlmClient {
        let config = Config {
            base_url,
            ..Config::default()
        };
        LlmClient::with_api_key(&config, "gsk_test".to_string()).unwrap()
    }

    #[test]
    fn request_serializes_as_chat_completions_body() {
        let request = CompletionRequest::new(
            "gemma-7b",
            vec![Message::system("sys"), Message::user("hi")],
        )
        .with_temperature(0.5);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "gemma-7b",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hi"}
                ],
                "temperature": 0.5,
                "stream": true
            })
        );
    }

    #[test]
    fn client_takes_key_from_config() {
        let config = Config {
            api_key: Some("gsk_from_file".to_string()),
            ..Config::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.api_key, "gsk_from_file");
        assert_eq!(
            client.completions_url(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn blank_key_is_a_configuration_fault() {
        let result = LlmClient::with_api_key(&Config::default(), "  ".to_string());
        assert!(matches!(result, Err(ConfigError::MissingApiKey)));
    }

    #[tokio::test]
    async fn streams_fragments_from_sse_body() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
        );
        let (base_url, server) = serve_once(response).await;
        let client = client_for(base_url);

        let fragments = client
            .stream_completion(CompletionRequest::new("gemma-7b", vec![Message::user("hi")]))
            .await
            .unwrap();
        let snapshots: Vec<_> = Accumulator::new(fragments).collect().await;
        assert_eq!(snapshots, vec![Ok("Hel".to_string()), Ok("Hello".to_string())]);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer gsk_test"));
        assert!(request.contains("\"stream\":true"));
    }

    #[tokio::test]
    async fn error_status_is_a_stream_fault() {
        let body = r#"{"error":{"message":"Invalid API Key"}}"#;
        let response = format!(
            concat!(
                "HTTP/1.1 401 Unauthorized\r\n",
                "Content-Type: application/json\r\n",
                "Content-Length: {}\r\n",
                "Connection: close\r\n\r\n{}",
            ),
            body.len(),
            body
        );
        let (base_url, server) = serve_once(response).await;
        let client = client_for(base_url);

        let result = client
            .stream_completion(CompletionRequest::new("gemma-7b", vec![Message::user("hi")]))
            .await;
        match result {
            Err(StreamError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid API Key"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error status"),
        }
        server.await.unwrap();
    }
}
