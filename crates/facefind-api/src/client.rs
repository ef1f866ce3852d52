use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use facefind_core::MatchData;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Errors from one match request.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("could not reach matching service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("matching service rejected the photo ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("matching service sent an unreadable response: {0}")]
    Malformed(String),

    #[error("invalid matching endpoint: {0}")]
    InvalidEndpoint(String),
}

/// The external face-matching service.
#[allow(async_fn_in_trait)]
pub trait MatchApi {
    /// Submit one JPEG-encoded selfie and return the service's matches.
    async fn find_matches(&self, jpeg: &[u8]) -> Result<MatchData, MatchError>;
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    image: &'a str,
}

/// HTTP client for the matching endpoint.
///
/// Each call issues exactly one `POST`; there is no retry.
#[derive(Debug, Clone)]
pub struct MatchClient {
    endpoint: String,
    client: Client,
}

impl MatchClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, MatchError> {
        let parsed = reqwest::Url::parse(endpoint)
            .map_err(|e| MatchError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MatchError::InvalidEndpoint(format!(
                "{endpoint}: scheme must be http or https"
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl MatchApi for MatchClient {
    async fn find_matches(&self, jpeg: &[u8]) -> Result<MatchData, MatchError> {
        let image = jpeg_data_uri(jpeg);
        tracing::info!(endpoint = %self.endpoint, bytes = jpeg.len(), "sending match request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&MatchRequest { image: &image })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let reason = failure_reason(status, &body);
            tracing::warn!(status = status.as_u16(), %reason, "match request rejected");
            return Err(MatchError::Rejected {
                status: status.as_u16(),
                reason,
            });
        }

        let data: MatchData = serde_json::from_str(&body)
            .map_err(|e| MatchError::Malformed(e.to_string()))?;
        data.validate()
            .map_err(|e| MatchError::Malformed(e.to_string()))?;

        tracing::info!(
            matches = data.matches.len(),
            faces_considered = data.summary.total_faces_considered,
            "match response received"
        );
        Ok(data)
    }
}

/// Wrap JPEG bytes as a `data:image/jpeg;base64,` URI.
pub fn jpeg_data_uri(jpeg: &[u8]) -> String {
    let mut uri = String::with_capacity(JPEG_DATA_URI_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    uri.push_str(JPEG_DATA_URI_PREFIX);
    STANDARD.encode_string(jpeg, &mut uri);
    uri
}

/// Human-readable reason for a non-success response.
///
/// Prefers an `error` or `message` field of a JSON body, then the raw body,
/// then the status's canonical reason phrase.
fn failure_reason(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message", "detail"] {
            if let Some(Value::String(text)) = fields.get(key) {
                return text.clone();
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 200 && !trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const SAMPLE: &str = r#"{"matches":[{"photoUrl":"https://cdn.example/a.jpg","faceId":"f1","boundingBox":[0,0,10,10],"confidence":0.9},{"photoUrl":"https://cdn.example/b.jpg","faceId":"f2","boundingBox":[0,0,10,10],"confidence":0.05}],"summary":{"totalMatchedPhotos":2,"totalFacesConsidered":2,"matchingThreshold":0.2}}"#;

    fn client_for(server: &mockito::Server) -> MatchClient {
        MatchClient::new(&format!("{}/api/match", server.url()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_data_uri() {
        assert_eq!(jpeg_data_uri(&[0xFF, 0xD8, 0xFF]), "data:image/jpeg;base64,/9j/");
        assert_eq!(jpeg_data_uri(&[]), "data:image/jpeg;base64,");
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        assert!(matches!(
            MatchClient::new("not a url", Duration::from_secs(1)),
            Err(MatchError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            MatchClient::new("ftp://example.com/match", Duration::from_secs(1)),
            Err(MatchError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_failure_reason() {
        assert_eq!(
            failure_reason(StatusCode::BAD_REQUEST, r#"{"error":"no face in image"}"#),
            "no face in image"
        );
        assert_eq!(
            failure_reason(StatusCode::UNPROCESSABLE_ENTITY, r#"{"message":"image too small"}"#),
            "image too small"
        );
        assert_eq!(failure_reason(StatusCode::BAD_GATEWAY, "upstream down\n"), "upstream down");
        assert_eq!(failure_reason(StatusCode::INTERNAL_SERVER_ERROR, ""), "Internal Server Error");
        assert_eq!(failure_reason(StatusCode::BAD_REQUEST, r#"{"code":7}"#), "Bad Request");
    }

    #[tokio::test]
    async fn test_posts_data_uri_and_parses_matches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/match")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "image": "data:image/jpeg;base64,/9j/"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SAMPLE)
            .create_async()
            .await;

        let data = client_for(&server)
            .find_matches(&[0xFF, 0xD8, 0xFF])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(data.matches.len(), 2);
        assert_eq!(data.matches[0].photo_url, "https://cdn.example/a.jpg");
        assert_eq!(data.matches[1].bounding_box, [0.0, 0.0, 10.0, 10.0]);
        assert_eq!(data.summary.total_faces_considered, 2);
    }

    #[tokio::test]
    async fn test_empty_matches_are_a_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/match")
            .with_status(200)
            .with_body(r#"{"matches":[],"summary":{"totalMatchedPhotos":0,"totalFacesConsidered":120,"matchingThreshold":0.2}}"#)
            .create_async()
            .await;

        let data = client_for(&server).find_matches(b"jpeg").await.unwrap();
        assert!(data.is_empty());
        assert_eq!(data.summary.total_faces_considered, 120);
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected_with_reason() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/match")
            .with_status(422)
            .with_body(r#"{"error":"no face detected in selfie"}"#)
            .create_async()
            .await;

        match client_for(&server).find_matches(b"jpeg").await {
            Err(MatchError::Rejected { status, reason }) => {
                assert_eq!(status, 422);
                assert_eq!(reason, "no face detected in selfie");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/match")
            .with_status(200)
            .with_body(r#"{"matches":"nope"}"#)
            .create_async()
            .await;

        let err = client_for(&server).find_matches(b"jpeg").await.unwrap_err();
        assert!(matches!(err, MatchError::Malformed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/match")
            .with_status(200)
            .with_body(r#"{"matches":[{"photoUrl":"a.jpg","faceId":"f1","boundingBox":[0,0,1,1],"confidence":4.2}],"summary":{"totalMatchedPhotos":1,"totalFacesConsidered":1,"matchingThreshold":0.2}}"#)
            .create_async()
            .await;

        let err = client_for(&server).find_matches(b"jpeg").await.unwrap_err();
        assert!(matches!(err, MatchError::Malformed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_transport_failure() {
        // Bind then drop a listener so the port is closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client =
            MatchClient::new(&format!("http://127.0.0.1:{port}/api/match"), Duration::from_secs(2))
                .unwrap();

        let err = client.find_matches(b"jpeg").await.unwrap_err();
        assert!(matches!(err, MatchError::Transport(_)), "{err:?}");
    }
}
