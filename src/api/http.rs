//! `reqwest` implementation of [`GameApi`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    ActionOutcome, ApiError, CharacterData, GameApi, MapTile, MonsterData, ResourceData,
};

/// Envelope every endpoint wraps its payload in.
#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for the game server.
///
/// One instance per character; the server rejects concurrent requests for
/// the same character, so callers keep requests sequential (the execution
/// loop guarantees this, the client does not enforce it).
pub struct HttpGameClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpGameClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ApiError> {
        debug!(path, "POST");
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            let envelope: DataEnvelope<T> = response.json().await?;
            return Ok(envelope.data);
        }
        let code = status.as_u16();
        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        Err(ApiError::Status { code, message })
    }
}

#[async_trait]
impl GameApi for HttpGameClient {
    async fn get_character(&self, name: &str) -> Result<CharacterData, ApiError> {
        self.get(&format!("/characters/{name}")).await
    }

    async fn move_character(&self, name: &str, x: i64, y: i64) -> Result<ActionOutcome, ApiError> {
        self.post(&format!("/my/{name}/action/move"), json!({ "x": x, "y": y }))
            .await
    }

    async fn fight(&self, name: &str) -> Result<ActionOutcome, ApiError> {
        self.post(&format!("/my/{name}/action/fight"), json!({})).await
    }

    async fn rest(&self, name: &str) -> Result<ActionOutcome, ApiError> {
        self.post(&format!("/my/{name}/action/rest"), json!({})).await
    }

    async fn gather(&self, name: &str) -> Result<ActionOutcome, ApiError> {
        self.post(&format!("/my/{name}/action/gathering"), json!({}))
            .await
    }

    async fn craft(
        &self,
        name: &str,
        code: &str,
        quantity: i64,
    ) -> Result<ActionOutcome, ApiError> {
        self.post(
            &format!("/my/{name}/action/crafting"),
            json!({ "code": code, "quantity": quantity }),
        )
        .await
    }

    async fn equip(&self, name: &str, code: &str, slot: &str) -> Result<ActionOutcome, ApiError> {
        self.post(
            &format!("/my/{name}/action/equip"),
            json!({ "code": code, "slot": slot }),
        )
        .await
    }

    async fn get_map(&self, x: i64, y: i64) -> Result<MapTile, ApiError> {
        self.get(&format!("/maps/{x}/{y}")).await
    }

    async fn list_monsters(&self) -> Result<Vec<MonsterData>, ApiError> {
        self.get("/monsters?size=100").await
    }

    async fn list_resources(&self) -> Result<Vec<ResourceData>, ApiError> {
        self.get("/resources?size=100").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_character_decodes_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/characters/ember"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "name": "ember",
                    "level": 3,
                    "hp": 80,
                    "max_hp": 100,
                    "x": 2,
                    "y": -1,
                    "cooldown": 0,
                    "cooldown_expiration": null
                }
            })))
            .mount(&server)
            .await;

        let client = HttpGameClient::new(server.uri(), "token");
        let character = client.get_character("ember").await.unwrap();
        assert_eq!(character.name, "ember");
        assert_eq!(character.level, 3);
        assert_eq!((character.x, character.y), (2, -1));
    }

    #[tokio::test]
    async fn test_move_posts_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/my/ember/action/move"))
            .and(body_json(serde_json::json!({ "x": 4, "y": 7 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "character": { "name": "ember", "x": 4, "y": 7 }
                }
            })))
            .mount(&server)
            .await;

        let client = HttpGameClient::new(server.uri(), "token");
        let outcome = client.move_character("ember", 4, 7).await.unwrap();
        assert_eq!((outcome.character.x, outcome.character.y), (4, 7));
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/my/ember/action/fight"))
            .respond_with(ResponseTemplate::new(499).set_body_json(serde_json::json!({
                "error": { "message": "Character is in cooldown for 8 seconds" }
            })))
            .mount(&server)
            .await;

        let client = HttpGameClient::new(server.uri(), "token");
        let err = client.fight("ember").await.unwrap_err();
        assert!(err.is_cooldown());
    }

    #[tokio::test]
    async fn test_error_without_body_still_classifies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/9/9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpGameClient::new(server.uri(), "token");
        let err = client.get_map(9, 9).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
