//! Common test utilities for fbsession-core integration tests

pub mod mock_transport;

#[allow(unused_imports)]
pub use mock_transport::{grant, signed_cookie, MockTransport, Reply, APP_ID, APP_SECRET};
