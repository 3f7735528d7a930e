/*!
# Turbo LEDz DevKit - stubs and fixtures for development without hardware

Helpers for exercising the telemetry pipeline and the daemon in tests:
- In-memory device transport recording every report
- Fake sysfs/procfs trees standing in for the host
- Test harness wiring both together
*/

pub mod fixtures;
pub mod test_utils;
pub mod transport_stub;

pub use fixtures::FakeHost;
pub use test_utils::{init_test_logging, LogCapture, TestHarness};
pub use transport_stub::MockTransport;
