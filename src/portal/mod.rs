//! Session-authenticated access to the payslip portal.

mod catalog;
mod cookie;
mod session;
mod user_agent;

pub use catalog::{
    collect_documents, extract_links, parse_listing, CatalogError, DocumentCatalog, ListingLink,
    DOCUMENT_LINK_SELECTOR,
};
pub use cookie::{parse_session_cookie, SESSION_COOKIE_NAME};
pub use session::{
    AuthError, HttpError, Session, SessionClient, SessionState, StatusCheck, DEFAULT_TIMEOUT,
};
pub use user_agent::{resolve_user_agent, USER_AGENT};
