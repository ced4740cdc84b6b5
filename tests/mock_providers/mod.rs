//! Mock servers for integration tests.
//!
//! The HTTP side (backend REST endpoints, rendering service) is mocked with
//! wiremock directly in each test. The backend event stream is a WebSocket
//! and is served by [`EventStreamMock`].

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod websocket_mock;

pub use websocket_mock::{EventStreamMock, ScriptedFrame};
