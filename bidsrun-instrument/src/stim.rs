use crate::device::{Arguments, Binding, Device};
use crate::instrument::{Instrument, InstrumentBase, Writable};
use bidsrun_core::{Modality, Result, SessionLayout, StreamName};
use std::sync::Arc;

#[derive(Debug)]
pub struct StimConfig<D> {
    pub label: String,
    pub primary_modality: Modality,
    pub start: Binding<D>,
    pub stop: Binding<D>,
    /// Receives the command string as its first positional argument.
    pub write: Binding<D>,
}

impl<D> Default for StimConfig<D> {
    fn default() -> Self {
        Self {
            label: "stim".to_owned(),
            primary_modality: Modality::Eeg,
            start: Binding::Method {
                name: "start".to_owned(),
                arguments: Arguments::new(),
            },
            stop: Binding::Method {
                name: "stop".to_owned(),
                arguments: Arguments::new(),
            },
            write: Binding::Method {
                name: "write".to_owned(),
                arguments: Arguments::new(),
            },
        }
    }
}

/// Write-only instrument delivering stimuli.
pub struct StimInstrument<D> {
    base: InstrumentBase,
    device: D,
    config: StimConfig<D>,
}

impl<D: Device> StimInstrument<D> {
    pub fn new(layout: Arc<SessionLayout>, device: D, config: StimConfig<D>) -> Result<Self> {
        let stream = StreamName::companion(Modality::Stim, &config.label, config.primary_modality, "tsv")?;
        for binding in [&config.start, &config.stop, &config.write] {
            binding.validate(&device)?;
        }
        Ok(Self {
            base: InstrumentBase::new(layout, stream),
            device,
            config,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: Device> Instrument for StimInstrument<D> {
    fn stream(&self) -> &StreamName {
        self.base.stream()
    }

    fn start(&mut self, task_id: &str, run_id: &str) -> Result<()> {
        self.base.begin(task_id, run_id)?;
        if let Err(e) = self.config.start.invoke(&mut self.device) {
            self.base.end();
            return Err(e);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.base.is_started() {
            return Ok(());
        }
        let stopped = self.config.stop.invoke(&mut self.device).map(drop);
        self.base.end();
        stopped
    }

    fn is_started(&self) -> bool {
        self.base.is_started()
    }

    fn as_writable(&mut self) -> Option<&mut dyn Writable> {
        Some(self)
    }
}

impl<D: Device> Writable for StimInstrument<D> {
    fn write(&mut self, command: &str) -> Result<()> {
        self.base.require_started()?;
        tracing::debug!(command, "stimulus");
        self.config
            .write
            .invoke_with(&mut self.device, &Arguments::new().arg(command))
            .map(drop)
    }
}
