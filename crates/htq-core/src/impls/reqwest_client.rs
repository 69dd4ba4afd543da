//! ReqwestHttpClient - outbound calls over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;

use crate::domain::{Headers, TaskResponse};
use crate::ports::{CallError, HttpClient, OutboundRequest};

#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

fn classify(e: reqwest::Error) -> CallError {
    if e.is_timeout() {
        CallError::Timeout
    } else {
        CallError::Transport(e.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: &OutboundRequest, timeout: Duration) -> Result<TaskResponse, CallError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| CallError::Transport(format!("method {:?}: {e}", request.method)))?;

        let mut builder = self.client.request(method, &request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(classify)?;

        let status_code = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        // The body read shares the request deadline. Bytes that are not UTF-8
        // become U+FFFD, whatever the declared charset.
        let bytes = response.bytes().await.map_err(classify)?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(TaskResponse {
            status_code,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn binary_body_is_decoded_lossily() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/blob")
            .with_header("content-type", "application/octet-stream")
            .with_body([b'o', b'k', 0xff, 0xfe])
            .create_async()
            .await;

        let request = OutboundRequest {
            method: "GET".to_string(),
            url: format!("{}/blob", server.url()),
            headers: Headers::new(),
            body: String::new(),
        };
        let response = ReqwestHttpClient::new()
            .send(&request, Duration::from_secs(5))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.body, "ok\u{fffd}\u{fffd}");
    }

    #[tokio::test]
    async fn returns_status_headers_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/y")
            .match_header("x-token", "abc")
            .match_body("payload")
            .with_status(201)
            .with_header("x-answer", "42")
            .with_body("created")
            .create_async()
            .await;

        let mut headers = Headers::new();
        headers.insert("x-token".to_string(), "abc".to_string());
        let request = OutboundRequest {
            method: "POST".to_string(),
            url: format!("{}/y", server.url()),
            headers,
            body: "payload".to_string(),
        };

        let response = ReqwestHttpClient::new()
            .send(&request, Duration::from_secs(5))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status_code, 201);
        assert_eq!(response.body, "created");
        assert_eq!(response.headers.get("x-answer").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn non_2xx_is_still_a_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/y")
            .with_status(404)
            .create_async()
            .await;

        let response = ReqwestHttpClient::new()
            .send(
                &OutboundRequest::delete(format!("{}/y", server.url())),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(response.status_code, 404);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn silent_endpoint_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the connection without ever answering.
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let request = OutboundRequest::delete(format!("http://{addr}/never"));
        let err = ReqwestHttpClient::new()
            .send(&request, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, CallError::Timeout);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ReqwestHttpClient::new()
            .send(
                &OutboundRequest::delete(format!("http://{addr}/")),
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Transport(_)));
    }
}
