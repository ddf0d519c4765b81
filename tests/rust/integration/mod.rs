//! Integration tests - Whole translations through the public API
//!
//! These tests build query trees the way a host would and check the Jet SQL,
//! parameter bindings and warnings that come back.

mod failure_reporting_tests;
mod translation_scenarios;
