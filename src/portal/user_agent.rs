//! User agent handling for portal requests.
//!
//! The portal rejects clients that do not look like a browser, so the
//! default is a desktop Firefox string rather than a tool identifier.

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; rv:91.0) Gecko/20100101 Firefox/91.0";

/// The configured user agent, or [`USER_AGENT`] when unset or blank.
pub fn resolve_user_agent(custom: Option<&str>) -> &str {
    match custom.map(str::trim) {
        Some(ua) if !ua.is_empty() => ua,
        _ => USER_AGENT,
    }
}
