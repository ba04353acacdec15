//! Integration tests for critpath
//!
//! These tests use wiremock to stand in for both the site being rendered and
//! the extraction service, and drive the pipeline from a parsed config file.

mod common;
mod pipeline_tests;
mod trigger_tests;
