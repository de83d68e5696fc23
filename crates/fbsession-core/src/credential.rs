//! Credential extraction from raw cookie headers
//!
//! Two cookie formats coexist and must both be accepted:
//!
//! - `fbs_<app_id>="access_token=...&expires=...&uid=..."`, a URL-encoded map
//! - `fbsr_<app_id>=<signature>.<payload>`, a signed request
//!
//! Each format has its own [`CredentialMatcher`]; [`CredentialExtractor`] runs
//! them in priority order and the first match wins.

use std::collections::HashMap;

use cookie::Cookie;

use crate::token_cache::NEVER_EXPIRES;
use crate::AuthError;

/// Credential material found on a request or supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Legacy session key, used for signed REST calls instead of a token.
    SessionKey(String),
    /// Ready-to-use access token.
    AccessToken {
        token: String,
        /// Epoch seconds; [`NEVER_EXPIRES`] for offline tokens
        expires_at: i64,
        user_id: Option<String>,
    },
    /// Unverified `signature.payload` pair.
    SignedRequest { signature: String, payload: String },
    /// Authorization code awaiting exchange.
    OAuthCode(String),
    /// Nothing usable.
    None,
}

impl Credential {
    /// True for [`Credential::None`].
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Short variant name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionKey(_) => "session_key",
            Self::AccessToken { .. } => "access_token",
            Self::SignedRequest { .. } => "signed_request",
            Self::OAuthCode(_) => "oauth_code",
            Self::None => "none",
        }
    }
}

/// Cookies of one request, by name. The first occurrence of a name wins.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
}

impl CookieJar {
    /// Parse a raw `Cookie` header, skipping pairs that do not parse.
    pub fn parse(header: &str) -> Self {
        let mut cookies = HashMap::new();
        for cookie in Cookie::split_parse(header).flatten() {
            cookies
                .entry(cookie.name().to_string())
                .or_insert_with(|| cookie.value().trim_matches('"').to_string());
        }
        Self { cookies }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Recognizes one credential cookie format.
pub trait CredentialMatcher: Send + Sync {
    /// Format name for logs
    fn name(&self) -> &'static str;

    /// `None` if this format's cookie is absent, otherwise the parsed
    /// credential or the reason it could not be parsed.
    fn probe(&self, jar: &CookieJar, app_id: &str) -> Option<Result<Credential, AuthError>>;
}

/// `fbs_<app_id>` URL-encoded blob.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessTokenCookie;

impl CredentialMatcher for AccessTokenCookie {
    fn name(&self) -> &'static str {
        "fbs"
    }

    fn probe(&self, jar: &CookieJar, app_id: &str) -> Option<Result<Credential, AuthError>> {
        let raw = jar.get(&format!("fbs_{app_id}"))?;
        Some(parse_access_token_blob(raw))
    }
}

fn parse_access_token_blob(raw: &str) -> Result<Credential, AuthError> {
    let fields: HashMap<String, String> = url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let non_empty = |key: &str| fields.get(key).filter(|v| !v.is_empty()).cloned();

    if let Some(token) = non_empty("access_token") {
        let expires_at = match non_empty("expires").as_deref() {
            None | Some("0") => NEVER_EXPIRES,
            Some(value) => value.parse::<i64>().map_err(|_| {
                AuthError::MalformedCookie(format!("fbs expires is not a timestamp: {value}"))
            })?,
        };
        return Ok(Credential::AccessToken {
            token,
            expires_at,
            user_id: non_empty("uid"),
        });
    }

    if let Some(session_key) = non_empty("session_key") {
        return Ok(Credential::SessionKey(session_key));
    }

    Err(AuthError::MalformedCookie(
        "fbs cookie carries neither access_token nor session_key".to_string(),
    ))
}

/// `fbsr_<app_id>` signed request.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignedRequestCookie;

impl CredentialMatcher for SignedRequestCookie {
    fn name(&self) -> &'static str {
        "fbsr"
    }

    fn probe(&self, jar: &CookieJar, app_id: &str) -> Option<Result<Credential, AuthError>> {
        let raw = jar.get(&format!("fbsr_{app_id}"))?;
        let parsed = match raw.split_once('.') {
            Some((signature, payload)) if !signature.is_empty() && !payload.is_empty() => {
                Ok(Credential::SignedRequest {
                    signature: signature.to_string(),
                    payload: payload.to_string(),
                })
            }
            _ => Err(AuthError::MalformedCookie(
                "fbsr cookie is not a signature.payload pair".to_string(),
            )),
        };
        Some(parsed)
    }
}

/// Priority-ordered list of cookie matchers.
pub struct CredentialExtractor {
    matchers: Vec<Box<dyn CredentialMatcher>>,
}

impl Default for CredentialExtractor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(AccessTokenCookie),
            Box::new(SignedRequestCookie),
        ])
    }
}

impl std::fmt::Debug for CredentialExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.matchers.iter().map(|m| m.name()).collect();
        f.debug_struct("CredentialExtractor")
            .field("matchers", &names)
            .finish()
    }
}

impl CredentialExtractor {
    /// Build an extractor probing `matchers` in order.
    pub fn new(matchers: Vec<Box<dyn CredentialMatcher>>) -> Self {
        Self { matchers }
    }

    /// Classify a cookie header, collapsing parse failures to [`Credential::None`].
    pub fn extract(&self, cookie_header: Option<&str>, app_id: &str) -> Credential {
        self.try_extract(cookie_header, app_id).unwrap_or_else(|err| {
            tracing::debug!(error = %err, "discarding malformed credential cookie");
            Credential::None
        })
    }

    /// Classify a cookie header.
    ///
    /// A cookie that is present but unparseable does not stop later matchers;
    /// its error is returned only if no matcher produces a credential.
    pub fn try_extract(
        &self,
        cookie_header: Option<&str>,
        app_id: &str,
    ) -> Result<Credential, AuthError> {
        let Some(header) = cookie_header else {
            return Ok(Credential::None);
        };
        let jar = CookieJar::parse(header);
        if jar.is_empty() {
            return Ok(Credential::None);
        }

        let mut first_error = None;
        for matcher in &self.matchers {
            match matcher.probe(&jar, app_id) {
                None => continue,
                Some(Ok(credential)) => {
                    tracing::debug!(
                        matcher = matcher.name(),
                        kind = credential.kind(),
                        "credential cookie matched"
                    );
                    return Ok(credential);
                }
                Some(Err(err)) => {
                    tracing::debug!(
                        matcher = matcher.name(),
                        error = %err,
                        "credential cookie malformed"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(Credential::None),
        }
    }
}

/// Classify `cookie_header` with the default matcher order.
pub fn extract(cookie_header: Option<&str>, app_id: &str) -> Credential {
    CredentialExtractor::default().extract(cookie_header, app_id)
}
