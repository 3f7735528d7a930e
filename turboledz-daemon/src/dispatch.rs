//! Dispatch loop
//!
//! Owns the opened devices and the acquisition state. Each tick samples
//! only what the attached devices need, encodes one report per device and
//! writes it. Control events arrive over a channel and are acted on between
//! ticks, so every device write happens on this loop.

use crate::signals::ControlEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use turboledz_core::encoder::MASK_CORES;
use turboledz_core::{
    encode_bar_graph, CoreInventory, DataKind, DeviceRecord, DeviceWriteError, FrequencyClassifier,
    HostSource, ReportWriter, StageMask, TelemetryError, UsageScope, UtilizationSampler,
    PAUSE_REPORT,
};

/// Settle time around a pause burst.
pub const PAUSE_SETTLE: Duration = Duration::from_millis(40);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Running,
    Paused,
    ShuttingDown,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Write(#[from] DeviceWriteError),
}

impl DispatchError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            DispatchError::Telemetry(_) => 1,
            DispatchError::Write(_) => 74,
        }
    }
}

pub struct Dispatcher<W: ReportWriter> {
    devices: Vec<DeviceRecord<W>>,
    source: HostSource,
    sampler: Option<UtilizationSampler>,
    classifier: Option<FrequencyClassifier>,
    state: DispatchState,
    period: Duration,
    overflow_warned: bool,
}

impl<W: ReportWriter> Dispatcher<W> {
    /// Set up acquisition for whatever kinds of data `devices` display.
    pub fn new(
        devices: Vec<DeviceRecord<W>>,
        source: HostSource,
        inventory: &CoreInventory,
        period: Duration,
    ) -> Self {
        let wants = |kind: DataKind| devices.iter().any(|d| d.data_kind() == kind);

        let sampler = wants(DataKind::Utilization).then(|| UtilizationSampler::new(UsageScope::Aggregate));
        let classifier = wants(DataKind::FrequencyStages).then(|| FrequencyClassifier::new(inventory, &source));
        debug!(
            "Acquisition: utilization={} frequency stages={}",
            sampler.is_some(),
            classifier.is_some()
        );

        Self {
            devices,
            source,
            sampler,
            classifier,
            state: DispatchState::Running,
            period,
            overflow_warned: false,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Sample, encode and write to every device. Does nothing unless running.
    ///
    /// Any failure pauses every device before the error is returned.
    pub async fn tick(&mut self) -> Result<(), DispatchError> {
        if self.state != DispatchState::Running {
            return Ok(());
        }
        if let Err(e) = self.dispatch_once() {
            error!("{}", e);
            self.pause_all().await;
            return Err(e);
        }
        Ok(())
    }

    fn dispatch_once(&mut self) -> Result<(), DispatchError> {
        let utilization = match self.sampler.as_mut() {
            Some(sampler) => {
                let fractions = sampler
                    .sample(&self.source)
                    .map_err(TelemetryError::from)?;
                fractions.first().copied().unwrap_or(0.0)
            }
            None => 0.0,
        };
        let stages = self
            .classifier
            .as_ref()
            .map(|c| c.stages(&self.source))
            .unwrap_or_default();

        let mut window = 0;
        for device in &mut self.devices {
            match device.data_kind() {
                DataKind::Utilization => {
                    device.write(&encode_bar_graph(utilization, device.segments))?;
                }
                DataKind::FrequencyStages => {
                    let start = window.min(stages.len());
                    let end = (window + MASK_CORES).min(stages.len());
                    window += MASK_CORES;
                    device.write(&StageMask::from_stages(&stages[start..end]).to_report())?;
                }
            }
        }

        if !self.overflow_warned && window > 0 && stages.len() > window {
            warn!(
                "{} physical cores but stage devices show only {}; the rest are not displayed",
                stages.len(),
                window
            );
            self.overflow_warned = true;
        }
        Ok(())
    }

    /// Best-effort pause report to every device, with settle time either side.
    pub async fn pause_all(&mut self) {
        sleep(PAUSE_SETTLE).await;
        for device in &mut self.devices {
            if let Err(e) = device.write(&PAUSE_REPORT) {
                warn!("Pause failed: {}", e);
            }
        }
        sleep(PAUSE_SETTLE).await;
    }

    /// Apply a pause, resume or terminate request.
    pub async fn handle(&mut self, event: ControlEvent) {
        match (self.state, event) {
            (DispatchState::Running, ControlEvent::Pause) => {
                info!("Pausing");
                self.state = DispatchState::Paused;
                self.pause_all().await;
            }
            (DispatchState::Paused, ControlEvent::Resume) => {
                info!("Resuming");
                self.state = DispatchState::Running;
            }
            (DispatchState::ShuttingDown, _) => {}
            (_, ControlEvent::Terminate) => {
                info!("Shutting down");
                if self.state == DispatchState::Running {
                    self.pause_all().await;
                }
                self.state = DispatchState::ShuttingDown;
            }
            (state, event) => debug!("Ignoring {:?} while {:?}", event, state),
        }
    }

    /// Drive ticks until terminated, the channel closes, or a fatal error.
    ///
    /// `reload` is called on every reload request and returns the new tick
    /// period, or `None` to keep the current one. Devices are released when
    /// this returns.
    pub async fn run<R>(
        mut self,
        mut control: mpsc::Receiver<ControlEvent>,
        mut reload: R,
    ) -> Result<(), DispatchError>
    where
        R: FnMut() -> Option<Duration>,
    {
        info!(
            "Dispatching to {} devices every {:?}",
            self.devices.len(),
            self.period
        );
        let mut ticker = new_ticker(self.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await?;
                }
                event = control.recv() => {
                    match event.unwrap_or(ControlEvent::Terminate) {
                        ControlEvent::Reload => {
                            info!("Reloading configuration");
                            if let Some(period) = reload().filter(|p| *p != self.period) {
                                info!("Tick period {:?} -> {:?}", self.period, period);
                                self.period = period;
                                ticker = new_ticker(period);
                            }
                        }
                        event => self.handle(event).await,
                    }
                }
            }

            if self.state() == DispatchState::ShuttingDown {
                return Ok(());
            }
        }
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
