// OAuth2 credential cache and token issuer

use crate::config::InstanceConfig;
use crate::errors::AuthError;
use crate::models::TokenResponse;
use crate::output::OutputSink;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

/// Grant type sent for the Business Manager user grant
pub const USER_GRANT_TYPE: &str =
    "urn:demandware:params:oauth:grant-type:client-id:dwsid:dwsecuretoken";

/// Time source for credential expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        match self.now.lock() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn advance(&self, by: Duration) {
        let now = self.now();
        self.set(now + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Bearer token with its absolute expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Credential valid for `expires_in` seconds from `issued_at`.
    ///
    /// The lifetime comes from the server; one that overflows the calendar
    /// is rejected as an invalid response.
    pub fn from_response(
        response: TokenResponse,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let expires_at = Duration::try_seconds(response.expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::InvalidTokenResponse(format!(
                    "expires_in out of range: {}",
                    response.expires_in
                ))
            })?;

        Ok(Self {
            value: response.access_token,
            expires_at,
        })
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Shared holder of the current credential.
///
/// Clones share the same slot. A refresh replaces the whole credential, and
/// only after the exchange has succeeded.
#[derive(Debug, Clone, Default)]
pub struct CredentialCache {
    slot: Arc<RwLock<Option<Credential>>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token value if a credential is present and usable at `now`
    pub async fn valid_token(&self, now: DateTime<Utc>) -> Option<String> {
        self.slot
            .read()
            .await
            .as_ref()
            .filter(|credential| credential.is_usable_at(now))
            .map(|credential| credential.value.clone())
    }

    pub async fn install(&self, credential: Credential) {
        *self.slot.write().await = Some(credential);
    }

    pub async fn current(&self) -> Option<Credential> {
        self.slot.read().await.clone()
    }
}

/// Token exchange strategy selected from the configured credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantStrategy {
    /// Client id/secret against the account manager
    ClientCredentials,
    /// Business Manager username/password plus client id/secret against the instance
    BusinessManagerUser,
}

impl GrantStrategy {
    /// The user grant wins whenever username and password are both configured
    pub fn for_instance(instance: &InstanceConfig) -> Self {
        if instance.user_credentials().is_some() {
            GrantStrategy::BusinessManagerUser
        } else {
            GrantStrategy::ClientCredentials
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GrantStrategy::ClientCredentials => "client_credentials",
            GrantStrategy::BusinessManagerUser => "business_manager_user",
        }
    }
}

/// TokenIssuer hands out bearer tokens, exchanging credentials on a cache miss
pub struct TokenIssuer {
    http: Client,
    instance: InstanceConfig,
    auth_url: String,
    cache: CredentialCache,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn OutputSink>,
}

impl TokenIssuer {
    pub fn new(
        http: Client,
        instance: InstanceConfig,
        auth_url: impl Into<String>,
        cache: CredentialCache,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            http,
            instance,
            auth_url: auth_url.into(),
            cache,
            clock,
            sink,
        }
    }

    pub fn grant(&self) -> GrantStrategy {
        GrantStrategy::for_instance(&self.instance)
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Return a usable bearer token.
    ///
    /// A cached credential that has not expired is returned without any
    /// network call. Otherwise exactly one exchange is attempted; its failure
    /// is written to the output console and returned, never retried here.
    #[instrument(skip(self), fields(grant = self.grant().label()))]
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let requested_at = self.clock.now();

        if let Some(token) = self.cache.valid_token(requested_at).await {
            debug!("Using cached access token");
            return Ok(token);
        }

        let grant = self.grant();
        counter!("ocapi_token_exchanges_total", "grant" => grant.label()).increment(1);

        match self
            .exchange(grant)
            .await
            .and_then(|response| Credential::from_response(response, requested_at))
        {
            Ok(credential) => {
                info!(expires_at = %credential.expires_at, "Access token refreshed");
                let token = credential.value.clone();
                self.cache.install(credential).await;
                Ok(token)
            }
            Err(e) => {
                error!(error = %e, "Access token exchange failed");
                self.sink.append_line(&e.console_message());
                Err(e)
            }
        }
    }

    async fn exchange(&self, grant: GrantStrategy) -> Result<TokenResponse, AuthError> {
        let request = match grant {
            GrantStrategy::ClientCredentials => self
                .http
                .post(&self.auth_url)
                .basic_auth(&self.instance.client_id, Some(&self.instance.client_secret))
                .form(&[("grant_type", "client_credentials")]),
            GrantStrategy::BusinessManagerUser => {
                let (username, password) = self.instance.user_credentials().ok_or_else(|| {
                    AuthError::TokenRequestFailed("username/password not configured".to_string())
                })?;
                let url = format!("{}/dw/oauth2/access_token", self.instance.base_url());

                self.http
                    .post(url)
                    .query(&[("client_id", self.instance.client_id.as_str())])
                    .basic_auth(
                        username,
                        Some(format!("{}:{}", password, self.instance.client_secret)),
                    )
                    .form(&[("grant_type", USER_GRANT_TYPE)])
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::TokenRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenRejected { status, body });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::InvalidTokenResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use chrono::TimeZone;

    fn instance(username: Option<&str>, password: Option<&str>) -> InstanceConfig {
        InstanceConfig {
            hostname: "dev01.example.com".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            username: username.map(str::to_string),
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn test_credential_usable_strictly_before_expiry() {
        let expires_at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let credential = Credential {
            value: "t".to_string(),
            expires_at,
        };
        assert!(credential.is_usable_at(expires_at - Duration::milliseconds(1)));
        assert!(!credential.is_usable_at(expires_at));
    }

    #[test]
    fn test_grant_selection() {
        assert_eq!(
            GrantStrategy::for_instance(&instance(None, None)),
            GrantStrategy::ClientCredentials
        );
        assert_eq!(
            GrantStrategy::for_instance(&instance(Some("admin"), None)),
            GrantStrategy::ClientCredentials
        );
        assert_eq!(
            GrantStrategy::for_instance(&instance(Some("admin"), Some("pw"))),
            GrantStrategy::BusinessManagerUser
        );
    }

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), start + Duration::seconds(30));
    }

    #[tokio::test]
    async fn test_cache_hit_makes_no_network_call() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cache = CredentialCache::new();
        cache
            .install(Credential {
                value: "cached".to_string(),
                expires_at: now + Duration::minutes(10),
            })
            .await;

        // Unroutable endpoint: any exchange attempt would fail
        let issuer = TokenIssuer::new(
            Client::new(),
            instance(None, None),
            "http://127.0.0.1:9/unused",
            cache,
            Arc::new(ManualClock::new(now)),
            Arc::new(MemorySink::new()),
        );

        assert_eq!(issuer.access_token().await.unwrap(), "cached");
    }

    #[tokio::test]
    async fn test_expired_cache_reports_failure_to_console() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cache = CredentialCache::new();
        cache
            .install(Credential {
                value: "stale".to_string(),
                expires_at: now,
            })
            .await;
        let sink = MemorySink::new();

        let issuer = TokenIssuer::new(
            Client::new(),
            instance(None, None),
            "http://127.0.0.1:9/unused",
            cache.clone(),
            Arc::new(ManualClock::new(now)),
            Arc::new(sink.clone()),
        );

        let result = issuer.access_token().await;
        assert!(matches!(result, Err(AuthError::TokenRequestFailed(_))));
        assert_eq!(sink.lines().len(), 1);
        // The stale credential is left untouched
        assert_eq!(cache.current().await.unwrap().value, "stale");
    }

    #[test]
    fn test_credential_lifetime_out_of_range_is_rejected() {
        let issued_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let credential = Credential::from_response(
            TokenResponse {
                access_token: "t".to_string(),
                expires_in: 1800,
            },
            issued_at,
        )
        .unwrap();
        assert_eq!(credential.expires_at, issued_at + Duration::seconds(1800));

        for expires_in in [i64::MAX, i64::MIN] {
            let result = Credential::from_response(
                TokenResponse {
                    access_token: "t".to_string(),
                    expires_in,
                },
                issued_at,
            );
            assert!(matches!(result, Err(AuthError::InvalidTokenResponse(_))));
        }
    }
}
