use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::StreamExt;
use rand::distr::Alphanumeric;
use rand::Rng;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::credentials::TwitterCredentials;
use super::oauth::authorization_header;
use super::{Message, PublishError, Publisher};
use crate::util::{truncate_chars, validate_feed_url};

const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB, the API limit for images
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Base URLs of the Twitter API hosts.
#[derive(Debug, Clone)]
pub struct TwitterEndpoints {
    pub api_base: String,
    pub upload_base: String,
}

impl Default for TwitterEndpoints {
    fn default() -> Self {
        Self {
            api_base: "https://api.twitter.com".to_string(),
            upload_base: "https://upload.twitter.com".to_string(),
        }
    }
}

impl TwitterEndpoints {
    fn tweets_url(&self) -> String {
        format!("{}/2/tweets", self.api_base.trim_end_matches('/'))
    }

    fn media_upload_url(&self) -> String {
        format!("{}/1.1/media/upload.json", self.upload_base.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct TweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<TweetMedia>,
}

#[derive(Serialize)]
struct TweetMedia {
    media_ids: Vec<String>,
}

#[derive(Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

/// Posts statuses through the Twitter API with OAuth 1.0a user context.
pub struct TwitterPublisher {
    client: reqwest::Client,
    credentials: TwitterCredentials,
    endpoints: TwitterEndpoints,
}

impl TwitterPublisher {
    pub fn new(
        client: reqwest::Client,
        credentials: TwitterCredentials,
        endpoints: TwitterEndpoints,
    ) -> Self {
        Self {
            client,
            credentials,
            endpoints,
        }
    }

    fn sign(&self, method: &str, url: &str, params: &[(&str, &str)]) -> Result<String, PublishError> {
        let nonce: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp();
        Ok(authorization_header(
            method,
            url,
            params,
            &self.credentials.oauth_keys(),
            &nonce,
            timestamp,
        )?)
    }

    async fn download_image(&self, image_url: &str) -> Result<Vec<u8>, PublishError> {
        let url = validate_feed_url(image_url)
            .map_err(|e| PublishError::Response(format!("invalid image URL: {}", e)))?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::HttpStatus {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_IMAGE_SIZE {
                return Err(PublishError::Response("image too large".to_string()));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if bytes.len().saturating_add(chunk.len()) > MAX_IMAGE_SIZE {
                return Err(PublishError::Response("image too large".to_string()));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    /// Downloads an image and uploads it, returning the media id.
    async fn upload_image(&self, image_url: &str) -> Result<String, PublishError> {
        let image = self.download_image(image_url).await?;
        let media_data = STANDARD.encode(&image);

        let url = self.endpoints.media_upload_url();
        let auth = self.sign("POST", &url, &[("media_data", media_data.as_str())])?;
        let body = format!("media_data={}", urlencoding::encode(&media_data));

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, auth)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let bytes = checked_body(response).await?;
        let uploaded: MediaUploadResponse = serde_json::from_slice(&bytes)
            .map_err(|e| PublishError::Response(format!("media upload: {}", e)))?;
        Ok(uploaded.media_id_string)
    }

    async fn post_status(&self, text: &str, media_id: Option<String>) -> Result<String, PublishError> {
        let url = self.endpoints.tweets_url();
        let request = TweetRequest {
            text,
            media: media_id.map(|id| TweetMedia { media_ids: vec![id] }),
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| PublishError::Response(format!("encoding status: {}", e)))?;
        let auth = self.sign("POST", &url, &[])?;

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, auth)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let bytes = checked_body(response).await?;
        let created: TweetResponse = serde_json::from_slice(&bytes)
            .map_err(|e| PublishError::Response(format!("status post: {}", e)))?;
        Ok(created.data.id)
    }
}

#[async_trait]
impl Publisher for TwitterPublisher {
    async fn publish(&self, message: &Message) -> Result<(), PublishError> {
        let media_id = match message.image.as_deref() {
            Some(image) => match self.upload_image(image).await {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(image = %image, error = %e, "Image upload failed, posting without media");
                    None
                }
            },
            None => None,
        };

        let id = self.post_status(&message.text, media_id).await?;
        tracing::debug!(tweet_id = %id, "Status posted");
        Ok(())
    }
}

/// Reads the body of a 2xx response, or maps the status to an error.
async fn checked_body(response: reqwest::Response) -> Result<Vec<u8>, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.bytes().await?.to_vec());
    }

    let body = response.text().await.unwrap_or_default();
    Err(PublishError::HttpStatus {
        status: status.as_u16(),
        body: truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher_for(server: &MockServer) -> TwitterPublisher {
        TwitterPublisher::new(
            reqwest::Client::new(),
            TwitterCredentials::new("ck", "cs", "tk", "ts"),
            TwitterEndpoints {
                api_base: server.uri(),
                upload_base: server.uri(),
            },
        )
    }

    fn created() -> ResponseTemplate {
        ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "1445880548472328192", "text": "x"}}))
    }

    #[tokio::test]
    async fn test_post_text_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(header_exists("authorization"))
            .and(body_json(json!({"text": "Hello https://example.com/a"})))
            .respond_with(created())
            .expect(1)
            .mount(&server)
            .await;

        let message = Message {
            text: "Hello https://example.com/a".into(),
            image: None,
        };
        publisher_for(&server).publish(&message).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let auth = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
        assert!(auth.starts_with("OAuth "));
        assert!(auth.contains("oauth_consumer_key=\"ck\""));
        assert!(auth.contains("oauth_token=\"tk\""));
    }

    #[tokio::test]
    async fn test_post_with_uploaded_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/1.1/media/upload.json"))
            .and(body_string_contains("media_data="))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"media_id_string": "710511363345354753"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(body_json(json!({
                "text": "Pic",
                "media": {"media_ids": ["710511363345354753"]}
            })))
            .respond_with(created())
            .expect(1)
            .mount(&server)
            .await;

        let message = Message {
            text: "Pic".into(),
            image: Some(format!("{}/img.png", server.uri())),
        };
        publisher_for(&server).publish(&message).await.unwrap();
    }

    #[tokio::test]
    async fn test_image_failure_posts_without_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(body_json(json!({"text": "Pic"})))
            .respond_with(created())
            .expect(1)
            .mount(&server)
            .await;

        let message = Message {
            text: "Pic".into(),
            image: Some(format!("{}/missing.png", server.uri())),
        };
        publisher_for(&server).publish(&message).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(403).set_body_string("duplicate content"))
            .mount(&server)
            .await;

        let message = Message {
            text: "Again".into(),
            image: None,
        };
        match publisher_for(&server).publish(&message).await.unwrap_err() {
            PublishError::HttpStatus { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "duplicate content");
            }
            e => panic!("Expected HttpStatus, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_unexpected_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let message = Message {
            text: "Hi".into(),
            image: None,
        };
        let result = publisher_for(&server).publish(&message).await;
        assert!(matches!(result, Err(PublishError::Response(_))));
    }

    #[test]
    fn test_endpoint_urls() {
        let endpoints = TwitterEndpoints {
            api_base: "https://api.example.com/".into(),
            upload_base: "https://upload.example.com".into(),
        };
        assert_eq!(endpoints.tweets_url(), "https://api.example.com/2/tweets");
        assert_eq!(
            endpoints.media_upload_url(),
            "https://upload.example.com/1.1/media/upload.json"
        );
    }
}
