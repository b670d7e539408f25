//! Credit Report API Library
//!
//! This library ingests XML credit-bureau reports, extracts identity, score,
//! account summary and per-account details from them, and serves the stored
//! results over HTTP.
//!
//! # Modules
//!
//! - `api`: API-layer components.
//! - `core`: Extraction pipeline and shared models/errors.
//! - `data`: Data access layer.
//! - `coerce`: Text to typed value conversions with fallbacks.
//! - `config`: Configuration management.
//! - `db`: Database connection and schema bootstrap.
//! - `db_storage`: Report storage operations.
//! - `errors`: Error handling types.
//! - `extraction`: Section extractors and report assembly.
//! - `handlers`: HTTP request handlers and router.
//! - `locator`: Path lookups and fallback chains over decoded XML.
//! - `models`: Core data models.
//! - `xml_tree`: XML decoding into an untyped tree.

pub mod api;
pub mod core;
pub mod data;

// Re-export primary modules for shared use in tests and other binaries
pub mod coerce;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod extraction;
pub mod handlers;
pub mod locator;
pub mod models;
pub mod xml_tree;
