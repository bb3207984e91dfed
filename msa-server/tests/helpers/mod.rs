//! Test Helper Utilities
//!
//! Shared utilities for msa-server integration tests

#![allow(dead_code)]

pub mod app;
pub mod fakes;

pub use app::{
    body_bytes, body_json, build_zip, epoch, fast_retry, get, metadata, post, seed_album,
    spawn_server, test_config, zip_entries, TestApp, CLEANUP_SECRET,
};
pub use fakes::{audio_payload, FakeFetcher, FakeResponse, InMemoryStorage, PUBLIC_BASE};
