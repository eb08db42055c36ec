//! casa Network Layer
//!
//! One REST/JSON client shared by every integration that talks to a
//! remote HTTP API.
//!
//! Architecture:
//! 1. Caller builds a URL (query helpers included) and optional headers
//! 2. Per-request connection: TCP → rustls TLS for https → hyper http1
//! 3. Bounded by connect and total timeouts, response bodies capped
//! 4. Non-2xx statuses surface as typed errors with extracted detail

mod rest;

pub use rest::{RestClient, RestConfig, RestError, RestResponse, build_url};
