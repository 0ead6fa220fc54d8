use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    api::{
        VoteBackend,
        error::{ApiError, ApiResult},
    },
    dto::api::{
        ClaimResponse, LeaderboardEntry, PairingRequest, PairingResponse, ServerStats, VoteEvent,
    },
    state::{ConnectionCredentials, SharedState},
};

/// Time allowed to establish a TCP/TLS connection to the backend.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Total time allowed for a request, reading the response included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the vote backend.
///
/// Attaches `Authorization: Bearer` and `X-Server-Id` headers whenever
/// credentials are present; without credentials requests go out
/// unauthenticated, which the backend only accepts for pairing.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    state: SharedState,
}

impl ApiClient {
    /// Build a client with the bridge's connect/read timeouts.
    pub fn new(state: SharedState) -> ApiResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| ApiError::ClientBuilder { source })?;
        Ok(Self { client, state })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/v1{}",
            self.state.config().api_base_url.trim_end_matches('/'),
            path
        )
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, self.endpoint(path));
        if let Some(credentials) = self.state.credentials().await {
            builder = builder
                .bearer_auth(credentials.server_token())
                .header("X-Server-Id", credentials.server_id());
        }
        builder
    }

    async fn require_credentials(&self) -> ApiResult<ConnectionCredentials> {
        self.state.credentials().await.ok_or(ApiError::NotLinked)
    }

    /// Send the request and fold transport and status failures into the
    /// uniform [`ApiError`] classification.
    async fn dispatch(&self, builder: RequestBuilder, path: &str) -> ApiResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| ApiError::Connection {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match response.json::<ErrorBody>().await {
            Ok(body) => match body.into_message() {
                Some(message) => Err(ApiError::Backend { message }),
                None => Err(ApiError::Status {
                    path: path.to_string(),
                    status,
                }),
            },
            Err(_) => Err(ApiError::Status {
                path: path.to_string(),
                status,
            }),
        }
    }

    async fn decode<T>(response: Response, path: &str) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        response.json::<T>().await.map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

impl VoteBackend for ApiClient {
    fn pair(&self, request: PairingRequest) -> BoxFuture<'static, ApiResult<PairingResponse>> {
        let api = self.clone();
        Box::pin(async move {
            let path = "/servers/pair";
            let builder = api.request(Method::POST, path).await.json(&request);
            let response = api.dispatch(builder, path).await?;
            Self::decode(response, path).await
        })
    }

    fn send_stats(&self, stats: ServerStats) -> BoxFuture<'static, ApiResult<()>> {
        let api = self.clone();
        Box::pin(async move {
            let credentials = api.require_credentials().await?;
            let path = format!("/servers/{}/stats", credentials.server_id());
            let builder = api.request(Method::POST, &path).await.json(&stats);
            // A 2xx with an empty body is a successful void call.
            api.dispatch(builder, &path).await?;
            Ok(())
        })
    }

    fn server_status(&self) -> BoxFuture<'static, ApiResult<ServerStats>> {
        let api = self.clone();
        Box::pin(async move {
            let credentials = api.require_credentials().await?;
            let path = format!("/servers/{}/status", credentials.server_id());
            let builder = api.request(Method::GET, &path).await;
            let response = api.dispatch(builder, &path).await?;
            Self::decode(response, &path).await
        })
    }

    fn pending_votes(
        &self,
        player: Option<Uuid>,
    ) -> BoxFuture<'static, ApiResult<Vec<VoteEvent>>> {
        let api = self.clone();
        Box::pin(async move {
            let credentials = api.require_credentials().await?;
            let path = format!("/servers/{}/votes/pending", credentials.server_id());
            let mut builder = api.request(Method::GET, &path).await;
            if let Some(player) = player {
                builder = builder.query(&[("player", player.to_string())]);
            }
            let response = api.dispatch(builder, &path).await?;
            Self::decode(response, &path).await
        })
    }

    fn claim_vote(&self, vote_id: &str) -> BoxFuture<'static, ApiResult<ClaimResponse>> {
        let api = self.clone();
        let path = format!("/votes/{vote_id}/claim");
        Box::pin(async move {
            let builder = api.request(Method::POST, &path).await;
            let response = api.dispatch(builder, &path).await?;
            Self::decode(response, &path).await
        })
    }

    fn leaderboard(
        &self,
        page: u32,
        per_page: u32,
    ) -> BoxFuture<'static, ApiResult<Vec<LeaderboardEntry>>> {
        let api = self.clone();
        Box::pin(async move {
            let credentials = api.require_credentials().await?;
            let path = format!("/servers/{}/leaderboard", credentials.server_id());
            let builder = api
                .request(Method::GET, &path)
                .await
                .query(&[("page", page.to_string()), ("per_page", per_page.to_string())]);
            let response = api.dispatch(builder, &path).await?;
            Self::decode(response, &path).await
        })
    }

    fn vote_link(&self) -> BoxFuture<'static, ApiResult<String>> {
        let api = self.clone();
        Box::pin(async move {
            let credentials = api.require_credentials().await?;
            let path = format!("/servers/{}/vote-link", credentials.server_id());
            let builder = api.request(Method::GET, &path).await;
            let response = api.dispatch(builder, &path).await?;
            Self::decode(response, &path).await
        })
    }
}

/// Structured error body the backend returns on rejected requests.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    /// Prefer `message`, fall back to `error`.
    fn into_message(self) -> Option<String> {
        self.message.or(self.error)
    }
}
