/*!
Test harness combining a fake host with mock indicators
*/

use crate::fixtures::FakeHost;
use crate::transport_stub::MockTransport;
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use turboledz_core::{DeviceModel, DeviceRecord};

/// Route tracing output through the test writer. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Log lines captured from the current thread
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Capture events at `level` and above until the guard is dropped.
    pub fn start(level: tracing::Level) -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(capture.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Captured lines containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

/// Writer half of a [`LogCapture`]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl std::io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: self.buffer.clone(),
        }
    }
}

/// A fake host plus any number of attached mock indicators
pub struct TestHarness {
    pub host: FakeHost,
    attached: Vec<(DeviceModel, MockTransport)>,
}

impl TestHarness {
    /// Harness over a host with the given physical-core labels.
    pub fn new(labels: &[usize]) -> Result<Self> {
        init_test_logging();
        Ok(Self {
            host: FakeHost::with_topology(labels)?,
            attached: Vec::new(),
        })
    }

    /// Attach a mock indicator and return an observer handle to it.
    pub fn attach(&mut self, model: DeviceModel) -> MockTransport {
        let transport = MockTransport::new(format!("hidraw{}", self.attached.len()));
        self.attached.push((model, transport.clone()));
        transport
    }

    /// Device records for every attached indicator, in attach order.
    pub fn device_records(&self) -> Vec<DeviceRecord<MockTransport>> {
        self.attached
            .iter()
            .map(|(model, transport)| DeviceRecord::new(transport.clone(), *model))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turboledz_core::DataKind;

    #[test]
    fn test_harness_records_share_state() {
        let mut harness = TestHarness::new(&[0, 1]).unwrap();
        let observer = harness.attach(DeviceModel::Model810c);
        harness.attach(DeviceModel::Model108);

        let mut records = harness.device_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].data_kind(), DataKind::FrequencyStages);
        assert_eq!(records[1].segments, 8);

        records[0].write(&[0x00, 0x80, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(observer.reports().len(), 1);
    }

    #[test]
    fn test_log_capture_counts_lines() {
        let (capture, _guard) = LogCapture::start(tracing::Level::WARN);
        tracing::warn!("disk on fire");
        tracing::warn!("disk on fire");
        tracing::info!("not captured");

        assert_eq!(capture.count("disk on fire"), 2);
        assert_eq!(capture.count("not captured"), 0);
    }
}
