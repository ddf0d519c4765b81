//! Unit tests - Tests for public building blocks that don't need a full translation
//!
//! These tests run quickly and exercise dialect profiles, configuration
//! loading and the query-tree wire format in isolation.

mod dialect_profile_tests;
mod query_tree_format_tests;
