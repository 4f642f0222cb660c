//! Diretta: a server-rendered live blog that mirrors a headless CMS feed in
//! real time.
//!
//! One page, three stages: an initial GraphQL fetch against the CMS, a live
//! query subscription that keeps an in-memory snapshot synchronized, and a
//! pure presentation layer whose regions are patched over SSE as the
//! snapshot changes.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub mod util;
