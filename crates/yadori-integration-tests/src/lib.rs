//! Integration test crate for Yadori.
//!
//! This crate has no library code. Its tests drive whole flows across the
//! workspace crates: posting and reacting to reviews through the store,
//! JSON-RPC sessions over an in-memory stream, and push delivery to a
//! local stub endpoint.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p yadori-integration-tests
//! ```
