use crate::device::{Arguments, Device};
use crate::instrument::{Instrument, Readable};
use crate::recorder::{BufferedRecorder, RecorderConfig};
use crate::samples::Samples;
use crate::sink::SinkFactory;
use bidsrun_core::{Modality, Result, SessionLayout, StreamName};
use std::sync::Arc;

/// `Instrument` and `Readable` for a type whose only state is a
/// `recorder: BufferedRecorder<D>`.
macro_rules! recording_instrument {
    ($name:ident) => {
        impl<D: Device> Instrument for $name<D> {
            fn stream(&self) -> &StreamName {
                self.recorder.base().stream()
            }

            fn start(&mut self, task_id: &str, run_id: &str) -> Result<()> {
                self.recorder.start(task_id, run_id, &Arguments::new())
            }

            fn stop(&mut self) -> Result<()> {
                self.recorder.stop(&Arguments::new())
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
        }

        impl<D: Device> Readable for $name<D> {
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
    };
}

/// Scalp electroencephalography recorder.
pub struct EegInstrument<D> {
    recorder: BufferedRecorder<D>,
}

impl<D: Device> EegInstrument<D> {
    pub fn new(
        layout: Arc<SessionLayout>,
        device: D,
        config: RecorderConfig<D>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Result<Self> {
        let stream = StreamName::primary(Modality::Eeg, &config.file_ext)?;
        Ok(Self {
            recorder: BufferedRecorder::new(layout, stream, device, config, sinks)?,
        })
    }

    pub fn recorder(&self) -> &BufferedRecorder<D> {
        &self.recorder
    }

    /// Adds a free-text annotation to the open recording.
    pub fn annotate(&mut self, onset: f64, duration: Option<f64>, text: &str) -> Result<()> {
        self.recorder.annotate(onset, duration, text)
    }
}

/// Intracranial recorder (ECoG, sEEG). Same recording path as
/// [`EegInstrument`] under its own modality directory; the config's stop
/// binding is typically used to disarm the amplifier.
pub struct IeegInstrument<D> {
    recorder: BufferedRecorder<D>,
}

impl<D: Device> IeegInstrument<D> {
    pub fn new(
        layout: Arc<SessionLayout>,
        device: D,
        config: RecorderConfig<D>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Result<Self> {
        let stream = StreamName::primary(Modality::Ieeg, &config.file_ext)?;
        Ok(Self {
            recorder: BufferedRecorder::new(layout, stream, device, config, sinks)?,
        })
    }

    pub fn recorder(&self) -> &BufferedRecorder<D> {
        &self.recorder
    }

    pub fn annotate(&mut self, onset: f64, duration: Option<f64>, text: &str) -> Result<()> {
        self.recorder.annotate(onset, duration, text)
    }
}

recording_instrument!(EegInstrument);
recording_instrument!(IeegInstrument);
