//! Portal login and authenticated requests.

use std::time::Duration;

use reqwest::header::{CONNECTION, COOKIE, ORIGIN, REFERER, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::cookie::{parse_session_cookie, SESSION_COOKIE_NAME};
use super::user_agent::resolve_user_agent;
use crate::errors::ErrorClass;

/// Request timeout used when the configuration does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Login failures. All of them are fatal for the run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login rejected with HTTP {0}")]
    BadStatus(StatusCode),
    #[error("login response carried no Set-Cookie header")]
    NoCookie,
    #[error("Set-Cookie header does not carry the {0} cookie")]
    CookiePatternMismatch(String),
    #[error("login request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl AuthError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AuthError::NoCookie | AuthError::CookiePatternMismatch(_) => {
                ErrorClass::ProtocolViolation
            }
            AuthError::BadStatus(_) | AuthError::Request(_) => ErrorClass::FatalSetup,
        }
    }
}

/// Failures of authenticated reads.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("not logged in")]
    NotAuthenticated,
    #[error("GET {url} returned HTTP {status}")]
    BadStatus { url: String, status: StatusCode },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// How strictly an authenticated read judges the response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCheck {
    /// Anything below 400 is accepted (listing page).
    BelowClientError,
    /// Only 200 is accepted (document downloads).
    ExactlyOk,
}

impl StatusCheck {
    pub fn accepts(self, status: StatusCode) -> bool {
        match self {
            StatusCheck::BelowClientError => status.as_u16() < 400,
            StatusCheck::ExactlyOk => status == StatusCode::OK,
        }
    }
}

/// An authenticated portal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub cookie_name: String,
    pub cookie_value: String,
    pub base_url: String,
    pub listing_url: String,
}

impl Session {
    /// Value for the `Cookie` request header.
    pub fn cookie_header(&self) -> String {
        format!("{}={}", self.cookie_name, self.cookie_value)
    }
}

/// Whether a client has logged in yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

#[derive(Serialize)]
struct LoginPayload<'a> {
    #[serde(rename = "Username")]
    username: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
}

/// HTTP client bound to one portal.
///
/// Login goes through a client that never follows redirects, so the
/// `Set-Cookie` of a redirecting login response is what gets inspected.
/// Authenticated reads use a regular client and attach the session cookie.
#[derive(Debug, Clone)]
pub struct SessionClient {
    client: Client,
    login_client: Client,
    base_url: String,
    main_url: String,
    cookie_name: String,
    session: Option<Session>,
}

impl SessionClient {
    /// Create a client for `base_url + endpoint` with default settings.
    pub fn new(base_url: &str, endpoint: &str) -> Result<Self, HttpError> {
        Self::with_user_agent(base_url, endpoint, DEFAULT_TIMEOUT, None)
    }

    /// Create a client with a custom timeout and, optionally, a custom user
    /// agent in place of the default browser string.
    pub fn with_user_agent(
        base_url: &str,
        endpoint: &str,
        timeout: Duration,
        user_agent: Option<&str>,
    ) -> Result<Self, HttpError> {
        let user_agent = resolve_user_agent(user_agent);

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        let login_client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            login_client,
            base_url: base_url.to_string(),
            main_url: format!("{}{}", base_url, endpoint),
            cookie_name: SESSION_COOKIE_NAME.to_string(),
            session: None,
        })
    }

    /// Look for a different authentication cookie name.
    pub fn with_cookie_name(mut self, cookie_name: &str) -> Self {
        self.cookie_name = cookie_name.to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn main_url(&self) -> &str {
        &self.main_url
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn state(&self) -> SessionState {
        if self.session.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Log in and keep the resulting session.
    ///
    /// A failed login leaves the client unauthenticated; nothing is retried.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<Session, AuthError> {
        debug!("Logging in to {}", self.main_url);

        let response = self
            .login_client
            .post(&self.main_url)
            .header(ORIGIN, &self.base_url)
            .header(REFERER, &self.main_url)
            .header(CONNECTION, "keep-alive")
            .json(&LoginPayload { username, password })
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(AuthError::BadStatus(status));
        }

        // Only the first Set-Cookie header is considered.
        let header = response
            .headers()
            .get(SET_COOKIE)
            .ok_or(AuthError::NoCookie)?;
        let header = header
            .to_str()
            .map_err(|_| AuthError::CookiePatternMismatch(self.cookie_name.clone()))?;

        let (cookie_name, cookie_value) = parse_session_cookie(header, &self.cookie_name)
            .ok_or_else(|| AuthError::CookiePatternMismatch(self.cookie_name.clone()))?;

        let session = Session {
            cookie_name,
            cookie_value,
            base_url: self.base_url.clone(),
            listing_url: self.main_url.clone(),
        };
        info!("Logged in to {}", self.base_url);
        self.session = Some(session.clone());
        Ok(session)
    }

    /// GET `url` with the session cookie attached.
    pub async fn authenticated_get(
        &self,
        url: &str,
        check: StatusCheck,
    ) -> Result<Response, HttpError> {
        let session = self.session.as_ref().ok_or(HttpError::NotAuthenticated)?;

        let response = self
            .client
            .get(url)
            .header(COOKIE, session.cookie_header())
            .send()
            .await?;

        let status = response.status();
        if !check.accepts(status) {
            return Err(HttpError::BadStatus {
                url: url.to_string(),
                status,
            });
        }

        Ok(response)
    }

    /// Fetch the document listing page as text.
    pub async fn fetch_listing(&self) -> Result<String, HttpError> {
        let session = self.session.as_ref().ok_or(HttpError::NotAuthenticated)?;
        let response = self
            .authenticated_get(&session.listing_url, StatusCheck::BelowClientError)
            .await?;
        Ok(response.text().await?)
    }
}
