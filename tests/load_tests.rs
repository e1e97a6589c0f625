//! Load Test Runner
//!
//! This file makes the saturation scenarios discoverable by cargo test.
//!
//! To run load tests:
//! ```bash
//! cargo test --test load_tests -- --ignored --test-threads=1
//! ```
//!
//! Note: Load tests are marked as #[ignore] by default. They open thousands of
//! sockets and each takes at least ten seconds; raise `ulimit -n` first.

mod load;
