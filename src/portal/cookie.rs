//! Session cookie extraction from `Set-Cookie` headers.

use regex::Regex;

/// Name of the authentication cookie issued by the portal.
pub const SESSION_COOKIE_NAME: &str = ".AspNet.ApplicationCookie";

/// Extract `(name, value)` for `cookie_name` from a `Set-Cookie` header value.
///
/// The header must start with `<cookie_name>=<value>;`. Matching is
/// case-sensitive and only the first occurrence counts. A value that is not
/// terminated by `;` does not match.
pub fn parse_session_cookie(header: &str, cookie_name: &str) -> Option<(String, String)> {
    let pattern = format!("^{}=(.*?);", regex::escape(cookie_name));
    let re = Regex::new(&pattern).ok()?;
    re.captures(header)
        .map(|c| (cookie_name.to_string(), c[1].to_string()))
}
