//! Device report encodings
//!
//! Every report starts with the HID report id `0x00`. Data bytes carry the
//! `0x80` flag in their first payload byte; control reports (pause) do not.
//!
//! - Bar graph (utilization): `[0x00, bars | 0x80]`.
//! - Dual-colour mask (frequency stages): `[0x00, g_lo | 0x80, g_hi, r_lo, r_hi]`
//!   where each half holds 5 bits of a 10-bit core mask, core 0 in bit 0.
//!
//! The dual-colour protocol represents at most [`MASK_CORES`] cores. Cores
//! past that are dropped and reported through [`StageMask::dropped`]; this
//! is a hardware ceiling.

use crate::frequency::FrequencyStage;

pub const REPORT_ID: u8 = 0x00;
pub const DATA_FLAG: u8 = 0x80;

/// Control report asking a device to go dark until data resumes.
pub const PAUSE_REPORT: [u8; 2] = [REPORT_ID, 0x40];

/// Cores a dual-colour device can display.
pub const MASK_CORES: usize = 10;

/// Subtracted from the segment count so full load maps to the top segment
/// index (`segments - 1`) instead of past it.
pub const BAR_EPSILON: f32 = 0.99;

/// Lit segment count for a utilization fraction.
pub fn bar_count(utilization: f32, segments: u8) -> u8 {
    let u = if utilization.is_nan() {
        0.0
    } else {
        utilization.clamp(0.0, 1.0)
    };
    (u * (f32::from(segments) - BAR_EPSILON)).round() as u8
}

/// Two-byte bar-graph report.
pub fn encode_bar_graph(utilization: f32, segments: u8) -> [u8; 2] {
    [REPORT_ID, bar_count(utilization, segments) | DATA_FLAG]
}

/// Green/red core masks of a dual-colour device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageMask {
    pub green: u16,
    pub red: u16,
    /// Cores that did not fit in the mask.
    pub dropped: usize,
}

impl StageMask {
    /// Build masks from per-core stages, core 0 in the least significant bit.
    pub fn from_stages(stages: &[FrequencyStage]) -> Self {
        let mut mask = Self {
            dropped: stages.len().saturating_sub(MASK_CORES),
            ..Self::default()
        };
        for (core, stage) in stages.iter().take(MASK_CORES).enumerate() {
            let bit = 1u16 << core;
            if stage.lights_green() {
                mask.green |= bit;
            }
            if stage.lights_red() {
                mask.red |= bit;
            }
        }
        mask
    }

    /// Five-byte dual-colour report.
    pub fn to_report(&self) -> [u8; 5] {
        [
            REPORT_ID,
            (self.green & 0x1f) as u8 | DATA_FLAG,
            ((self.green >> 5) & 0x1f) as u8,
            (self.red & 0x1f) as u8,
            ((self.red >> 5) & 0x1f) as u8,
        ]
    }

    /// Inverse of [`StageMask::to_report`]; `None` for a non-data report.
    pub fn from_report(report: &[u8]) -> Option<Self> {
        match report {
            [REPORT_ID, g_lo, g_hi, r_lo, r_hi] if g_lo & DATA_FLAG != 0 => Some(Self {
                green: u16::from(g_lo & 0x1f) | (u16::from(g_hi & 0x1f) << 5),
                red: u16::from(r_lo & 0x1f) | (u16::from(r_hi & 0x1f) << 5),
                dropped: 0,
            }),
            _ => None,
        }
    }
}

/// Dual-colour report for the first [`MASK_CORES`] of `stages`.
pub fn encode_stage_mask(stages: &[FrequencyStage]) -> [u8; 5] {
    StageMask::from_stages(stages).to_report()
}

#[cfg(test)]
mod tests {
    use super::*;
    use FrequencyStage::*;

    #[test]
    fn test_bar_graph_endpoints() {
        assert_eq!(bar_count(0.0, 10), 0);
        assert_eq!(bar_count(1.0, 10), 9);
        assert_eq!(bar_count(1.0, 8), 7);
        assert_eq!(encode_bar_graph(0.0, 10), [0x00, 0x80]);
        assert_eq!(encode_bar_graph(1.0, 10), [0x00, 0x89]);
    }

    #[test]
    fn test_bar_graph_rounds_to_nearest() {
        assert_eq!(bar_count(0.5, 8), 4);
        assert_eq!(bar_count(0.5, 10), 5);
        assert_eq!(bar_count(0.04, 10), 0);
        assert_eq!(bar_count(0.06, 10), 1);
    }

    #[test]
    fn test_bar_graph_clamps_input() {
        assert_eq!(bar_count(-0.5, 10), 0);
        assert_eq!(bar_count(3.0, 10), 9);
        assert_eq!(bar_count(f32::NAN, 10), 0);
        for step in 0..=100 {
            let bars = bar_count(step as f32 / 100.0, 10);
            assert!(bars < 10);
        }
    }

    #[test]
    fn test_stage_mask_bits() {
        let stages = [Min, Low, Mid, Max, Low, Min, Max, Mid, Min, Low];
        let mask = StageMask::from_stages(&stages);
        assert_eq!(mask.green, 0b10_1001_0110);
        assert_eq!(mask.red, 0b00_1100_1100);
        assert_eq!(mask.dropped, 0);

        let report = mask.to_report();
        assert_eq!(report, [0x00, 0x16 | 0x80, 0x14, 0x0c, 0x06]);

        let decoded = StageMask::from_report(&report).unwrap();
        for (core, stage) in stages.iter().enumerate() {
            assert_eq!(decoded.green & (1 << core) != 0, stage.lights_green(), "core {core}");
            assert_eq!(decoded.red & (1 << core) != 0, stage.lights_red(), "core {core}");
        }
    }

    #[test]
    fn test_stage_mask_truncates_past_ten_cores() {
        let stages = vec![Max; 14];
        let mask = StageMask::from_stages(&stages);
        assert_eq!(mask.dropped, 4);
        assert_eq!(mask.red, 0x3ff);
        assert_eq!(mask.green, 0);

        let decoded = StageMask::from_report(&mask.to_report()).unwrap();
        assert_eq!(decoded.red >> MASK_CORES, 0);
    }

    #[test]
    fn test_few_cores_and_empty() {
        assert_eq!(encode_stage_mask(&[]), [0x00, 0x80, 0x00, 0x00, 0x00]);
        assert_eq!(encode_stage_mask(&[Mid, Mid]), [0x00, 0x83, 0x00, 0x03, 0x00]);
    }

    #[test]
    fn test_pause_report_is_not_data() {
        assert_eq!(PAUSE_REPORT[1] & DATA_FLAG, 0);
        assert_eq!(StageMask::from_report(&PAUSE_REPORT), None);
    }
}
