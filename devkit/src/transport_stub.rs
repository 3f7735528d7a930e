/*!
Mock device transport for development without an attached indicator

Records every report written and can simulate an unplugged device.
Clones share the same state, so a test keeps one clone for assertions
while the code under test owns the other.
*/

use parking_lot::Mutex;
use std::sync::Arc;
use turboledz_core::encoder::{DATA_FLAG, PAUSE_REPORT};
use turboledz_core::ReportWriter;

#[derive(Debug, Default)]
struct MockState {
    reports: Vec<Vec<u8>>,
    attempts: usize,
    fail_after: Option<usize>,
}

/// Mock transport standing in for a hidraw node
#[derive(Debug, Clone)]
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Accept `writes` more reports, then fail every following write.
    pub fn fail_after(&self, writes: usize) {
        let mut state = self.state.lock();
        state.fail_after = Some(state.reports.len() + writes);
    }

    /// Fail every write from now on.
    pub fn unplug(&self) {
        self.fail_after(0);
    }

    /// All successfully written reports, oldest first.
    pub fn reports(&self) -> Vec<Vec<u8>> {
        self.state.lock().reports.clone()
    }

    pub fn last_report(&self) -> Option<Vec<u8>> {
        self.state.lock().reports.last().cloned()
    }

    /// Reports carrying telemetry (data flag set).
    pub fn data_reports(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .reports
            .iter()
            .filter(|r| r.get(1).is_some_and(|b| b & DATA_FLAG != 0))
            .cloned()
            .collect()
    }

    pub fn pause_count(&self) -> usize {
        self.state
            .lock()
            .reports
            .iter()
            .filter(|r| r.as_slice() == PAUSE_REPORT)
            .count()
    }

    /// Write attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// True once every clone except this one has been dropped.
    pub fn is_released(&self) -> bool {
        Arc::strong_count(&self.state) == 1
    }
}

impl ReportWriter for MockTransport {
    fn write_report(&mut self, report: &[u8]) -> std::io::Result<usize> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if state.fail_after.is_some_and(|limit| state.reports.len() >= limit) {
            tracing::debug!("[MOCK] {} rejected {} bytes", self.name, report.len());
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock device unplugged",
            ));
        }
        state.reports.push(report.to_vec());
        tracing::debug!("[MOCK] {} wrote {:02x?}", self.name, report);
        Ok(report.len())
    }

    fn location(&self) -> String {
        format!("mock:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_and_classifies_reports() {
        let observer = MockTransport::new("dev0");
        let mut writer = observer.clone();

        writer.write_report(&[0x00, 0x85]).unwrap();
        writer.write_report(&PAUSE_REPORT).unwrap();

        assert_eq!(observer.reports().len(), 2);
        assert_eq!(observer.data_reports(), vec![vec![0x00, 0x85]]);
        assert_eq!(observer.pause_count(), 1);
        assert_eq!(observer.last_report(), Some(PAUSE_REPORT.to_vec()));
    }

    #[test]
    fn test_failure_injection() {
        let observer = MockTransport::new("dev0");
        let mut writer = observer.clone();
        observer.fail_after(1);

        assert!(writer.write_report(&[0x00, 0x81]).is_ok());
        assert!(writer.write_report(&[0x00, 0x82]).is_err());
        assert_eq!(observer.reports().len(), 1);
        assert_eq!(observer.attempts(), 2);
    }

    #[test]
    fn test_release_tracking() {
        let observer = MockTransport::new("dev0");
        let writer = observer.clone();
        assert!(!observer.is_released());
        drop(writer);
        assert!(observer.is_released());
    }
}
