//! Document discovery from the portal listing page.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use scraper::{Html, Selector};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, warn};

use super::session::{HttpError, SessionClient};
use crate::errors::ErrorClass;
use crate::models::Document;

/// Elements holding the document links on the listing page.
pub const DOCUMENT_LINK_SELECTOR: &str = "[data-name='Name'] a";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to fetch listing: {0}")]
    Http(#[from] HttpError),
    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
    #[error("listing parser stopped unexpectedly: {0}")]
    Parser(#[from] JoinError),
}

impl CatalogError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::FatalSetup
    }
}

/// Lists the documents published to the logged-in account.
pub struct DocumentCatalog {
    client: Arc<SessionClient>,
    selector: String,
}

impl DocumentCatalog {
    pub fn new(client: Arc<SessionClient>) -> Self {
        Self {
            client,
            selector: DOCUMENT_LINK_SELECTOR.to_string(),
        }
    }

    /// Use a different selector for the document links.
    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selector = selector.to_string();
        self
    }

    /// Fetch the listing page and extract its documents.
    ///
    /// An empty page yields an empty set. Iteration order of the returned
    /// set carries no meaning.
    pub async fn list(&self) -> Result<HashSet<Document>, CatalogError> {
        let html = self.client.fetch_listing().await?;
        debug!("Fetched listing page ({} bytes)", html.len());

        // The DOM is not Send; walk it on the blocking pool and hand back
        // plain links.
        let selector = self.selector.clone();
        let links =
            tokio::task::spawn_blocking(move || extract_links(&html, &selector)).await??;
        debug!("Listing matched {} links", links.len());

        Ok(collect_documents(links).await)
    }
}

/// One element matched on the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLink {
    pub name: String,
    pub href: Option<String>,
}

impl ListingLink {
    /// The document this link names, or `None` (with a warning) when it has
    /// no `href` or its name is not a plain file name.
    fn into_document(self) -> Option<Document> {
        let Some(href) = self.href else {
            warn!("Skipping document link without href: {:?}", self.name);
            return None;
        };

        let document = Document::new(self.name, href.trim());
        if !document.has_valid_name() {
            warn!("Skipping document with unusable name {:?}", document.name);
            return None;
        }
        Some(document)
    }
}

/// Pull the trimmed text and `href` of every element matching `selector`.
pub fn extract_links(html: &str, selector: &str) -> Result<Vec<ListingLink>, CatalogError> {
    let parsed = Selector::parse(selector).map_err(|e| CatalogError::Selector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })?;

    let page = Html::parse_document(html);
    Ok(page
        .select(&parsed)
        .map(|element| ListingLink {
            name: element.text().collect::<String>().trim().to_string(),
            href: element.value().attr("href").map(str::to_string),
        })
        .collect())
}

/// Turn each link into a document on its own task and gather the results
/// through one collector.
///
/// Links that do not make a usable document are dropped. When two links
/// carry the same name, the one earlier on the page is kept.
pub async fn collect_documents(links: Vec<ListingLink>) -> HashSet<Document> {
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Document)>();

    for (position, link) in links.into_iter().enumerate() {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(document) = link.into_document() {
                let _ = tx.send((position, document));
            }
        });
    }
    drop(tx);

    // recv() yields None once every task has finished and dropped its sender.
    let mut by_name: HashMap<String, (usize, Document)> = HashMap::new();
    while let Some((position, document)) = rx.recv().await {
        match by_name.entry(document.name.clone()) {
            Entry::Occupied(mut existing) => {
                let (kept, dropped) = if position < existing.get().0 {
                    let previous = existing.insert((position, document));
                    (existing.get().1.remote_path.clone(), previous.1.remote_path)
                } else {
                    (existing.get().1.remote_path.clone(), document.remote_path)
                };
                warn!(
                    "Duplicate document name {:?}, keeping {} over {}",
                    existing.key(),
                    kept,
                    dropped
                );
            }
            Entry::Vacant(slot) => {
                slot.insert((position, document));
            }
        }
    }

    by_name.into_values().map(|(_, document)| document).collect()
}

/// Extract the documents of a listing page.
pub async fn parse_listing(html: &str, selector: &str) -> Result<HashSet<Document>, CatalogError> {
    let links = extract_links(html, selector)?;
    Ok(collect_documents(links).await)
}
