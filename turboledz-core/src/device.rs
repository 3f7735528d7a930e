//! Attached indicator devices
//!
//! The transport is abstracted behind [`ReportWriter`]; the dispatch loop
//! only needs a write that succeeds or fails. The model decides the
//! segment count and whether a device shows utilization or frequency stages.

use crate::error::DeviceWriteError;
use std::fmt;

/// Product string prefix every indicator reports.
pub const PRODUCT_PREFIX: &str = "Turbo LEDz";

/// Write side of a device transport
pub trait ReportWriter {
    /// Write one complete report, report-id byte included.
    fn write_report(&mut self, report: &[u8]) -> std::io::Result<usize>;

    /// Human-readable transport location for logs.
    fn location(&self) -> String;
}

/// Telemetry a device consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Utilization,
    FrequencyStages,
}

/// Known indicator models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    Unknown,
    /// 10 bars of 8 segments, 3.5" drive bay size.
    Model108m,
    /// 10 bars of 8 segments.
    Model108,
    Model810,
    /// 8 bars of 10 segments, single driver.
    Model810s,
    /// 8 bars of 8 segments, single driver.
    Model88s,
    /// Colour LEDs driven by frequency stages.
    Model810c,
}

impl DeviceModel {
    /// Model from the token following the product prefix.
    pub fn from_name(name: &str) -> Self {
        match name {
            "108m" => DeviceModel::Model108m,
            "108" => DeviceModel::Model108,
            "810" => DeviceModel::Model810,
            "810s" => DeviceModel::Model810s,
            "88s" => DeviceModel::Model88s,
            "810c" => DeviceModel::Model810c,
            _ => DeviceModel::Unknown,
        }
    }

    /// Model named by a product string, or `None` if it is not an indicator.
    ///
    /// Accepts both a bare product string (`"Turbo LEDz 810c"`) and one
    /// prefixed by the manufacturer, as kernel HID names are.
    pub fn from_product(product: &str) -> Option<Self> {
        let (_, rest) = product.split_once(PRODUCT_PREFIX)?;
        let name = rest.split_whitespace().next().unwrap_or("");
        Some(Self::from_name(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceModel::Unknown => "unknown",
            DeviceModel::Model108m => "108m",
            DeviceModel::Model108 => "108",
            DeviceModel::Model810 => "810",
            DeviceModel::Model810s => "810s",
            DeviceModel::Model88s => "88s",
            DeviceModel::Model810c => "810c",
        }
    }

    pub fn segment_count(&self) -> u8 {
        match self {
            DeviceModel::Model108m | DeviceModel::Model108 | DeviceModel::Model88s => 8,
            _ => 10,
        }
    }

    pub fn data_kind(&self) -> DataKind {
        match self {
            DeviceModel::Model810c => DataKind::FrequencyStages,
            _ => DataKind::Utilization,
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One opened device
#[derive(Debug)]
pub struct DeviceRecord<W> {
    pub writer: W,
    pub model: DeviceModel,
    pub segments: u8,
}

impl<W: ReportWriter> DeviceRecord<W> {
    pub fn new(writer: W, model: DeviceModel) -> Self {
        Self {
            writer,
            model,
            segments: model.segment_count(),
        }
    }

    pub fn data_kind(&self) -> DataKind {
        self.model.data_kind()
    }

    /// Write a report; short writes count as failures.
    pub fn write(&mut self, report: &[u8]) -> Result<(), DeviceWriteError> {
        let result = match self.writer.write_report(report) {
            Ok(written) if written == report.len() => return Ok(()),
            Ok(written) => Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short write: {written} of {} bytes", report.len()),
            )),
            Err(e) => Err(e),
        };
        result.map_err(|source| DeviceWriteError {
            device: format!("{} at {}", self.model, self.writer.location()),
            len: report.len(),
            source,
        })
    }
}
