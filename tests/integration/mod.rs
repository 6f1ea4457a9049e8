//! Integration tests for ytrelay
//!
//! These tests drive the router and the download pipeline with an in-process
//! extractor and object store.

#[path = "../common/mod.rs"]
pub mod common;

pub mod api_flow;
pub mod cookie_flow;
pub mod download_flow;
