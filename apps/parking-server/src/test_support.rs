//! In-process harness for router tests.

use std::collections::HashMap;
use std::sync::Arc;

use auth::{
    MemoryAuthStateStore, MemorySessionStore, OidcAuth, OidcConfig, OidcProviderMetadata,
    SESSION_COOKIE_NAME,
};
use axum::{
    Form, Json, Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
    routing::post,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_store::{ParkingStore, SqliteParkingStore};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use crate::authenticator::{Authenticator, DelegatedAuth};
use crate::config::{AuthMode, Config};
use crate::create_app;
use crate::state::{AppState, SharedState};

const ISSUER: &str = "https://id.parking.test";

/// Subject of every ID token issued by [`TestProvider`].
pub const PROVIDER_SUBJECT: &str = "provider-user-1";

pub struct TestApp {
    pub router: Router,
    pub state: SharedState<SqliteParkingStore>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `name=value` pair of a session cookie set by this response.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .find(|pair| {
                pair.strip_prefix(SESSION_COOKIE_NAME)
                    .and_then(|rest| rest.strip_prefix('='))
                    .is_some_and(|value| !value.is_empty())
            })
            .map(str::to_string)
    }
}

async fn seeded_store() -> SqliteParkingStore {
    let store = SqliteParkingStore::in_memory()
        .await
        .unwrap()
        .with_bcrypt_cost(4);
    store.initialize_parking_spaces().await.unwrap();
    store
}

fn provider_config() -> OidcConfig {
    OidcConfig::new(ISSUER, "parking", "secret", "http://localhost/api/callback")
}

/// Client for the `parking` registration at the test issuer.
pub fn provider_client(token_endpoint: String) -> OidcAuth {
    let metadata = OidcProviderMetadata {
        issuer: ISSUER.to_string(),
        authorization_endpoint: format!("{ISSUER}/authorize"),
        token_endpoint,
        jwks_uri: None,
        end_session_endpoint: Some(format!("{ISSUER}/logout")),
    };
    OidcAuth::new(provider_config(), metadata)
}

/// Stand-in token endpoint of the identity provider, bound to a random
/// local port.
///
/// Any authorization code is accepted and echoed back as the ID token
/// nonce, so tests pass the nonce from the authorization URL as the code.
/// Refresh grants get a new ID token for the same subject.
pub struct TestProvider {
    pub token_endpoint: String,
    server: JoinHandle<()>,
}

impl TestProvider {
    pub async fn start() -> Self {
        let router = Router::new().route("/token", post(issue_tokens));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            token_endpoint: format!("http://{addr}/token"),
            server,
        }
    }
}

impl Drop for TestProvider {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn issue_tokens(
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if form.get("client_secret").map(String::as_str) != Some("secret") {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let nonce = match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => form.get("code").cloned(),
        Some("refresh_token") => None,
        _ => return Err(StatusCode::BAD_REQUEST),
    };

    let claims = json!({
        "sub": PROVIDER_SUBJECT,
        "iss": ISSUER,
        "aud": "parking",
        "exp": Utc::now().timestamp() + 300,
        "nonce": nonce,
        "email": "ada@parking.test",
        "given_name": "Ada",
        "family_name": "Lovelace",
    });
    let id_token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"secret"),
    )
    .unwrap();

    Ok(Json(json!({
        "access_token": "access",
        "token_type": "Bearer",
        "expires_in": 300,
        "refresh_token": "refresh-next",
        "id_token": id_token,
    })))
}

impl TestApp {
    /// Local accounts over a seeded in-memory lot.
    pub async fn local() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let state = AppState::new(
            config,
            seeded_store().await,
            Arc::new(MemorySessionStore::new()),
            Authenticator::Local,
        );
        Self::from_state(Arc::new(state)).await
    }

    /// OIDC mode against a provider that is never contacted.
    pub async fn delegated() -> Self {
        Self::delegated_with_token_endpoint(format!("{ISSUER}/token")).await
    }

    /// OIDC mode exchanging codes with a running [`TestProvider`].
    pub async fn delegated_against(provider: &TestProvider) -> Self {
        Self::delegated_with_token_endpoint(provider.token_endpoint.clone()).await
    }

    async fn delegated_with_token_endpoint(token_endpoint: String) -> Self {
        let delegated = DelegatedAuth::new(
            provider_client(token_endpoint),
            Arc::new(MemoryAuthStateStore::new()),
        );

        let config = Config {
            auth_mode: AuthMode::Oidc,
            oidc: Some(provider_config()),
            ..Config::default()
        };
        let state = AppState::new(
            config,
            seeded_store().await,
            Arc::new(MemorySessionStore::new()),
            Authenticator::Delegated(delegated),
        );
        Self::from_state(Arc::new(state)).await
    }

    pub async fn from_state(state: SharedState<SqliteParkingStore>) -> Self {
        Self {
            router: create_app(state.clone()),
            state,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<String>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = builder
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .unwrap();

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, cookie, Some(body.to_string()))
            .await
    }

    pub async fn patch(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, Some(cookie), Some(body.to_string()))
            .await
    }

    /// Registers `username` with password `secret123` and returns the
    /// session cookie.
    pub async fn login_as(&self, username: &str) -> String {
        let response = self
            .post(
                "/api/auth/register",
                None,
                json!({ "username": username, "password": "secret123" }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.session_cookie().unwrap()
    }
}
