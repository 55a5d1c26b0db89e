//! OpenID Connect (OIDC) integration
//!
//! Authorization code flow with PKCE against a standard provider
//! (Keycloak, Google, Auth0, ...). ID tokens are verified against the
//! provider's JWKS, or against the client secret for HMAC-signed tokens.

use chrono::Utc;
use entities::ExternalProfile;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::{random_token, AuthError, AuthResult, PkceChallenge, PKCE_METHOD_S256};

/// OpenID Connect configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The OIDC provider's issuer URL (e.g., "https://accounts.google.com")
    pub issuer_url: String,

    /// OAuth2 client ID
    pub client_id: String,

    /// OAuth2 client secret
    pub client_secret: String,

    /// Redirect URL after authentication (our `/api/callback`)
    pub redirect_url: String,

    /// Scopes to request (defaults to ["openid", "email", "profile", "offline_access"])
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_scopes() -> Vec<String> {
    ["openid", "email", "profile", "offline_access"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl OidcConfig {
    /// Create a new OIDC configuration
    pub fn new(
        issuer_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: redirect_url.into(),
            scopes: default_scopes(),
        }
    }

    /// Set custom scopes
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Get the discovery URL for the OIDC provider
    pub fn discovery_url(&self) -> String {
        format!(
            "{}/.well-known/openid-configuration",
            self.issuer_url.trim_end_matches('/')
        )
    }
}

/// OIDC provider metadata (subset of fields we need)
#[derive(Debug, Clone, Deserialize)]
pub struct OidcProviderMetadata {
    /// The issuer identifier
    pub issuer: String,

    /// URL of the authorization endpoint
    pub authorization_endpoint: String,

    /// URL of the token endpoint
    pub token_endpoint: String,

    /// URL of the JWKS endpoint
    #[serde(default)]
    pub jwks_uri: Option<String>,

    /// RP-initiated logout endpoint
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

/// Token response from the OIDC provider
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token
    pub access_token: String,

    /// Token type (usually "Bearer")
    #[serde(default)]
    pub token_type: Option<String>,

    /// When the token expires (in seconds)
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// The refresh token (if granted)
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// The ID token (JWT containing user claims)
    #[serde(default)]
    pub id_token: Option<String>,
}

impl TokenResponse {
    fn expires_at(&self) -> Option<i64> {
        self.expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| Utc::now().timestamp() + secs)
    }
}

/// Verified ID token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject identifier (unique user ID at the provider)
    pub sub: String,

    /// Issuer
    pub iss: String,

    /// Expiry (seconds since the epoch)
    pub exp: i64,

    #[serde(default)]
    pub nonce: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub given_name: Option<String>,

    #[serde(default)]
    pub family_name: Option<String>,

    #[serde(default)]
    pub picture: Option<String>,
}

impl IdentityClaims {
    /// Profile used to create or refresh the local account.
    ///
    /// The subject doubles as the username so provider accounts never
    /// collide with local ones.
    pub fn to_profile(&self) -> ExternalProfile {
        ExternalProfile {
            external_id: self.sub.clone(),
            username: self.sub.clone(),
            email: self.email.clone(),
            first_name: self.given_name.clone(),
            last_name: self.family_name.clone(),
            profile_image_url: self.picture.clone(),
        }
    }
}

/// Provider identity kept inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcIdentity {
    /// Subject identifier
    pub subject: String,

    /// When the identity must be refreshed (seconds since the epoch)
    pub expires_at: i64,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Last ID token, sent as `id_token_hint` on logout
    #[serde(default)]
    pub id_token: Option<String>,
}

impl OidcIdentity {
    /// Builds an identity from a verified login.
    pub fn new(claims: &IdentityClaims, tokens: &TokenResponse) -> Self {
        Self {
            subject: claims.sub.clone(),
            expires_at: tokens.expires_at().unwrap_or(claims.exp),
            refresh_token: tokens.refresh_token.clone(),
            id_token: tokens.id_token.clone(),
        }
    }

    /// Whether the identity has passed its expiry.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at
    }
}

/// Authorization state for CSRF protection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationState {
    /// CSRF token
    pub state: String,

    /// Nonce for ID token validation
    pub nonce: String,

    /// PKCE code verifier
    pub code_verifier: String,

    /// Timestamp when this state was created
    pub created_at: i64,
}

impl AuthorizationState {
    /// Create new authorization state
    pub fn new() -> Self {
        Self {
            state: random_token(32),
            nonce: random_token(32),
            code_verifier: PkceChallenge::new().verifier,
            created_at: Utc::now().timestamp(),
        }
    }

    /// Check if this state is older than `max_age_secs`
    pub fn is_expired(&self, max_age_secs: i64) -> bool {
        Utc::now().timestamp() - self.created_at > max_age_secs
    }

    /// PKCE code challenge (S256)
    pub fn code_challenge(&self) -> String {
        PkceChallenge::from_verifier(self.code_verifier.as_str()).challenge
    }
}

impl Default for AuthorizationState {
    fn default() -> Self {
        Self::new()
    }
}

/// OIDC relying-party client
#[derive(Debug, Clone)]
pub struct OidcAuth {
    config: OidcConfig,
    metadata: OidcProviderMetadata,
    jwks: JwkSet,
    http: reqwest::Client,
}

impl OidcAuth {
    /// Creates a client from already known provider metadata.
    pub fn new(config: OidcConfig, metadata: OidcProviderMetadata) -> Self {
        Self {
            config,
            metadata,
            jwks: JwkSet { keys: Vec::new() },
            http: reqwest::Client::new(),
        }
    }

    /// Set the provider signing keys
    pub fn with_jwks(mut self, jwks: JwkSet) -> Self {
        self.jwks = jwks;
        self
    }

    /// Fetches provider metadata and signing keys.
    pub async fn discover(config: OidcConfig) -> AuthResult<Self> {
        let http = reqwest::Client::new();

        let metadata: OidcProviderMetadata = http
            .get(config.discovery_url())
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let jwks = match &metadata.jwks_uri {
            Some(uri) => http.get(uri).send().await?.error_for_status()?.json().await?,
            None => JwkSet { keys: Vec::new() },
        };

        tracing::info!(
            issuer = %metadata.issuer,
            signing_keys = jwks.keys.len(),
            "Loaded OIDC provider metadata"
        );

        Ok(Self {
            http,
            ..Self::new(config, metadata).with_jwks(jwks)
        })
    }

    /// Get the provider metadata
    pub fn metadata(&self) -> &OidcProviderMetadata {
        &self.metadata
    }

    /// Build the authorization URL for a stored state.
    pub fn authorization_url(&self, state: &AuthorizationState) -> AuthResult<String> {
        let mut url = url::Url::parse(&self.metadata.authorization_endpoint)
            .map_err(|e| AuthError::Oidc(format!("Invalid authorization endpoint: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", &state.state)
            .append_pair("nonce", &state.nonce)
            .append_pair("code_challenge", &state.code_challenge())
            .append_pair("code_challenge_method", PKCE_METHOD_S256)
            .append_pair("prompt", "login consent");

        Ok(url.to_string())
    }

    /// RP-initiated logout URL, when the provider advertises one.
    pub fn end_session_url(&self, id_token_hint: Option<&str>) -> Option<String> {
        let endpoint = self.metadata.end_session_endpoint.as_deref()?;
        let mut url = url::Url::parse(endpoint).ok()?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
        }

        Some(url.to_string())
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &AuthorizationState,
    ) -> AuthResult<TokenResponse> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_url),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
            ("code_verifier", &state.code_verifier),
        ])
        .await
    }

    /// Redeems a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> AuthResult<TokenResponse> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();

        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AuthError::Oidc(format!(
                "Token endpoint returned {status}: {detail}"
            )));
        }

        Ok(response.json().await?)
    }

    /// Verifies an ID token's signature, issuer, audience and expiry, and
    /// its nonce when one is expected.
    pub fn validate_id_token(
        &self,
        id_token: &str,
        expected_nonce: Option<&str>,
    ) -> AuthResult<IdentityClaims> {
        let header = decode_header(id_token)?;

        let key = match header.alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                DecodingKey::from_secret(self.config.client_secret.as_bytes())
            }
            _ => {
                let jwk = match header.kid.as_deref() {
                    Some(kid) => self.jwks.find(kid),
                    None => self.jwks.keys.first(),
                }
                .ok_or_else(|| AuthError::Jwt("No matching signing key".to_string()))?;
                DecodingKey::from_jwk(jwk)?
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.metadata.issuer.as_str()]);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<IdentityClaims>(id_token, &key, &validation)?.claims;

        if let Some(expected) = expected_nonce {
            if claims.nonce.as_deref() != Some(expected) {
                return Err(AuthError::InvalidToken);
            }
        }

        Ok(claims)
    }

    /// Finishes the callback: exchanges the code and verifies the ID token.
    pub async fn complete_login(
        &self,
        code: &str,
        state: &AuthorizationState,
    ) -> AuthResult<(IdentityClaims, OidcIdentity)> {
        let tokens = self.exchange_code(code, state).await?;
        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::Oidc("Token response has no id_token".to_string()))?;

        let claims = self.validate_id_token(id_token, Some(&state.nonce))?;
        let identity = OidcIdentity::new(&claims, &tokens);

        Ok((claims, identity))
    }

    /// Renews an expired identity with its refresh token.
    pub async fn refresh_identity(&self, identity: &OidcIdentity) -> AuthResult<OidcIdentity> {
        let refresh_token = identity
            .refresh_token
            .as_deref()
            .ok_or(AuthError::TokenExpired)?;

        let tokens = self.refresh(refresh_token).await?;

        let expires_at = match tokens.id_token.as_deref() {
            Some(id_token) => {
                let claims = self.validate_id_token(id_token, None)?;
                if claims.sub != identity.subject {
                    return Err(AuthError::InvalidToken);
                }
                tokens.expires_at().unwrap_or(claims.exp)
            }
            None => tokens
                .expires_at()
                .ok_or_else(|| AuthError::Oidc("Refresh response has no expiry".to_string()))?,
        };

        Ok(OidcIdentity {
            subject: identity.subject.clone(),
            expires_at,
            refresh_token: tokens
                .refresh_token
                .or_else(|| identity.refresh_token.clone()),
            id_token: tokens.id_token.or_else(|| identity.id_token.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    use super::*;

    const ISSUER: &str = "https://id.parking.test/realms/lot";
    const CLIENT_ID: &str = "parking-web";
    const SECRET: &str = "client-secret-for-tests";

    fn client() -> OidcAuth {
        let config = OidcConfig::new(
            ISSUER,
            CLIENT_ID,
            SECRET,
            "https://parking.test/api/callback",
        );
        let metadata = OidcProviderMetadata {
            issuer: ISSUER.to_string(),
            authorization_endpoint: format!("{ISSUER}/protocol/openid-connect/auth"),
            token_endpoint: format!("{ISSUER}/protocol/openid-connect/token"),
            jwks_uri: None,
            end_session_endpoint: Some(format!("{ISSUER}/protocol/openid-connect/logout")),
        };
        OidcAuth::new(config, metadata)
    }

    fn id_token(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(nonce: &str) -> serde_json::Value {
        json!({
            "sub": "user-123",
            "iss": ISSUER,
            "aud": CLIENT_ID,
            "exp": Utc::now().timestamp() + 300,
            "nonce": nonce,
            "email": "driver@parking.test",
            "given_name": "Dana",
            "family_name": "Driver",
        })
    }

    #[test]
    fn test_valid_id_token() {
        let token = id_token(claims("n-1"), SECRET);

        let claims = client().validate_id_token(&token, Some("n-1")).unwrap();
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.email.as_deref(), Some("driver@parking.test"));

        let profile = claims.to_profile();
        assert_eq!(profile.external_id, "user-123");
        assert_eq!(profile.first_name.as_deref(), Some("Dana"));
        assert_eq!(profile.last_name.as_deref(), Some("Driver"));
    }

    #[test]
    fn test_nonce_mismatch_rejected() {
        let token = id_token(claims("n-1"), SECRET);

        let err = client().validate_id_token(&token, Some("n-2")).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let mut claims = claims("n-1");
        claims["aud"] = json!("someone-else");
        let token = id_token(claims, SECRET);

        assert!(client().validate_id_token(&token, Some("n-1")).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let mut claims = claims("n-1");
        claims["iss"] = json!("https://evil.test");
        let token = id_token(claims, SECRET);

        assert!(client().validate_id_token(&token, Some("n-1")).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims = claims("n-1");
        claims["exp"] = json!(Utc::now().timestamp() - 3600);
        let token = id_token(claims, SECRET);

        let err = client().validate_id_token(&token, Some("n-1")).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn test_bad_signature_rejected() {
        let token = id_token(claims("n-1"), "not-the-client-secret");

        assert!(client().validate_id_token(&token, Some("n-1")).is_err());
    }

    #[test]
    fn test_authorization_url() {
        let state = AuthorizationState::new();
        let url = url::Url::parse(&client().authorization_url(&state).unwrap()).unwrap();
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        assert_eq!(param("response_type").as_deref(), Some("code"));
        assert_eq!(param("client_id").as_deref(), Some(CLIENT_ID));
        assert_eq!(param("state"), Some(state.state.clone()));
        assert_eq!(param("nonce"), Some(state.nonce.clone()));
        assert_eq!(param("code_challenge"), Some(state.code_challenge()));
        assert_eq!(param("code_challenge_method").as_deref(), Some("S256"));
        assert_eq!(
            param("scope").as_deref(),
            Some("openid email profile offline_access")
        );
    }

    #[test]
    fn test_end_session_url() {
        let url = client().end_session_url(Some("tok")).unwrap();
        assert!(url.starts_with(&format!("{ISSUER}/protocol/openid-connect/logout?")));
        assert!(url.contains("id_token_hint=tok"));

        let mut without = client();
        without.metadata.end_session_endpoint = None;
        assert!(without.end_session_url(None).is_none());
    }

    #[test]
    fn test_authorization_state_expiry() {
        let mut state = AuthorizationState::new();
        assert!(!state.is_expired(600));

        state.created_at = Utc::now().timestamp() - 1000;
        assert!(state.is_expired(600));
    }

    #[test]
    fn test_identity_expiry_prefers_token_lifetime() {
        let claims = IdentityClaims {
            sub: "user-123".to_string(),
            iss: ISSUER.to_string(),
            exp: Utc::now().timestamp() - 10,
            nonce: None,
            email: None,
            given_name: None,
            family_name: None,
            picture: None,
        };
        let tokens = TokenResponse {
            access_token: "at".to_string(),
            token_type: Some("Bearer".to_string()),
            expires_in: Some(300),
            refresh_token: Some("rt".to_string()),
            id_token: None,
        };

        let identity = OidcIdentity::new(&claims, &tokens);
        assert!(!identity.is_expired());
        assert_eq!(identity.refresh_token.as_deref(), Some("rt"));

        let without_lifetime = TokenResponse {
            expires_in: None,
            ..tokens
        };
        assert!(OidcIdentity::new(&claims, &without_lifetime).is_expired());
    }
}
