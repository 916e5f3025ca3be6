use crate::buffer::SamplingRate;
use crate::device::{Arguments, Binding, Device};
use crate::instrument::{Instrument, Readable, Writable};
use crate::recorder::{BufferedRecorder, RecorderConfig};
use crate::samples::Samples;
use crate::sink::SinkFactory;
use bidsrun_core::{Error, Modality, Result, SessionLayout, StreamName};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug)]
pub struct PhysioConfig<D> {
    pub recorder: RecorderConfig<D>,
    /// Value of the `recording-` filename entity.
    pub label: String,
    pub primary_modality: Modality,
    /// Invoked with the pulse payload on every [`Writable::write`].
    pub write: Binding<D>,
}

impl<D> Default for PhysioConfig<D> {
    fn default() -> Self {
        Self {
            recorder: RecorderConfig {
                physical_dimension: "mV".to_owned(),
                physical_lim: (-500.0, 500.0),
                ..RecorderConfig::default()
            },
            label: "emg".to_owned(),
            primary_modality: Modality::Eeg,
            write: Binding::Noop,
        }
    }
}

/// Physiological companion channels (EMG, ECG, TTL lines) recorded next to
/// a primary modality.
///
/// The device's init binding receives the task and run ids as its leading
/// positional arguments. Its stop binding receives `metadata`,
/// `edf_filepath` and `electrodes` keyword arguments so drivers that keep
/// their own files can finish them.
pub struct PhysioInstrument<D> {
    recorder: BufferedRecorder<D>,
    write: Binding<D>,
}

impl<D: Device> PhysioInstrument<D> {
    pub fn new(
        layout: Arc<SessionLayout>,
        device: D,
        config: PhysioConfig<D>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Result<Self> {
        if !matches!(config.recorder.sfreq, SamplingRate::Shared(_)) {
            return Err(Error::configuration(
                "physio instruments record all channels at one sampling frequency",
            ));
        }
        let stream = StreamName::companion(
            Modality::Physio,
            &config.label,
            config.primary_modality,
            &config.recorder.file_ext,
        )?;
        config.write.validate(&device)?;
        Ok(Self {
            recorder: BufferedRecorder::new(layout, stream, device, config.recorder, sinks)?,
            write: config.write,
        })
    }

    pub fn recorder(&self) -> &BufferedRecorder<D> {
        &self.recorder
    }

    fn stop_arguments(&self) -> Result<Arguments> {
        let config = self.recorder.config();
        let path = self.recorder.base().filepath()?;
        Ok(Arguments::new()
            .kwarg("metadata", serde_json::to_value(&config.metadata)?)
            .kwarg("edf_filepath", path.to_string_lossy().into_owned())
            .kwarg(
                "electrodes",
                Value::from(config.electrodes.clone()),
            ))
    }
}

impl<D: Device> Instrument for PhysioInstrument<D> {
    fn stream(&self) -> &StreamName {
        self.recorder.base().stream()
    }

    fn start(&mut self, task_id: &str, run_id: &str) -> Result<()> {
        let init = Arguments::new().arg(task_id).arg(run_id);
        self.recorder.start(task_id, run_id, &init)
    }

    fn stop(&mut self) -> Result<()> {
        if !self.is_started() {
            return Ok(());
        }
        let args = self.stop_arguments()?;
        self.recorder.stop(&args)
    }

    fn is_started(&self) -> bool {
        self.recorder.base().is_started()
    }

    fn readable(&self) -> Option<&dyn Readable> {
        Some(self)
    }

    fn as_readable(&mut self) -> Option<&mut dyn Readable> {
        Some(self)
    }

    fn as_writable(&mut self) -> Option<&mut dyn Writable> {
        Some(self)
    }
}

impl<D: Device> Readable for PhysioInstrument<D> {
    fn sfreq(&self) -> u32 {
        self.recorder.sfreq()
    }

    fn read(&mut self, remainder: bool) -> Result<Samples> {
        self.recorder.read(remainder)
    }

    fn flush(&mut self) -> Result<()> {
        self.recorder.flush()
    }
}

impl<D: Device> Writable for PhysioInstrument<D> {
    fn write(&mut self, command: &str) -> Result<()> {
        if matches!(self.write, Binding::Noop) {
            return Err(Error::configuration("physio instrument has no write binding"));
        }
        self.write
            .invoke_with(self.recorder.device_mut(), &Arguments::new().arg(command))
            .map(drop)
    }
}
