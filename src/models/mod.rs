//! Data models for paycheck.

mod document;

pub use document::{Document, CIPHERTEXT_EXTENSION};
