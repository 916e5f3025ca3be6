use crate::buffer::{RecordBuffer, SamplingRate, record_len};
use crate::device::{Arguments, Binding, Device};
use crate::instrument::InstrumentBase;
use crate::samples::Samples;
use crate::sink::{Annotation, RecordingHeader, RecordingMetadata, SignalHeader, SinkFactory, TimeSeriesSink};
use bidsrun_core::{Error, Result, SessionLayout, StreamName};
use std::sync::Arc;

/// Settings for an instrument that records into a time-series file.
#[derive(Debug)]
pub struct RecorderConfig<D> {
    pub electrodes: Vec<String>,
    pub sfreq: SamplingRate,
    pub physical_dimension: String,
    /// `(min, max)`
    pub physical_lim: (f64, f64),
    pub preamp_filter: String,
    /// Seconds per record.
    pub record_duration: f64,
    pub is_digital: bool,
    /// Extension of the file the sink writes.
    pub file_ext: String,
    pub metadata: RecordingMetadata,
    /// Invoked once when the run starts.
    pub init_read: Binding<D>,
    /// Invoked on every sampling step; must return samples.
    pub read: Binding<D>,
    /// Invoked when the run stops.
    pub stop: Binding<D>,
}

impl<D> Default for RecorderConfig<D> {
    fn default() -> Self {
        Self {
            electrodes: Vec::new(),
            sfreq: SamplingRate::Shared(256),
            physical_dimension: "uV".to_owned(),
            physical_lim: (-1000.0, 1000.0),
            preamp_filter: String::new(),
            record_duration: 1.0,
            is_digital: false,
            file_ext: "edf".to_owned(),
            metadata: RecordingMetadata::default(),
            init_read: Binding::Noop,
            read: Binding::Noop,
            stop: Binding::Noop,
        }
    }
}

/// The buffering, record-chunking core shared by every readable
/// instrument. Owns the device and the sink for the current run.
pub struct BufferedRecorder<D> {
    base: InstrumentBase,
    device: D,
    config: RecorderConfig<D>,
    buffer: RecordBuffer,
    sinks: Arc<dyn SinkFactory>,
    sink: Option<Box<dyn TimeSeriesSink>>,
}

impl<D: Device> BufferedRecorder<D> {
    pub fn new(
        layout: Arc<SessionLayout>,
        stream: StreamName,
        device: D,
        config: RecorderConfig<D>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Result<Self> {
        if config.electrodes.is_empty() {
            return Err(Error::configuration("must supply electrodes"));
        }
        let (lo, hi) = config.physical_lim;
        if !(lo < hi) {
            return Err(Error::configuration(format!(
                "physical minimum {lo} must be below maximum {hi}"
            )));
        }
        let buffer = RecordBuffer::new(&config.sfreq, config.electrodes.len(), config.record_duration)?;
        for binding in [&config.init_read, &config.read, &config.stop] {
            binding.validate(&device)?;
        }
        if matches!(config.read, Binding::Noop) {
            return Err(Error::configuration("a read binding is required"));
        }
        Ok(Self {
            base: InstrumentBase::new(layout, stream),
            device,
            config,
            buffer,
            sinks,
            sink: None,
        })
    }

    pub fn base(&self) -> &InstrumentBase {
        &self.base
    }

    pub fn config(&self) -> &RecorderConfig<D> {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn sfreq(&self) -> u32 {
        self.config.sfreq.primary()
    }

    pub fn header(&self) -> Result<RecordingHeader> {
        let signals = self
            .config
            .electrodes
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let sfreq = self.config.sfreq.for_channel(i);
                Ok(SignalHeader {
                    label: label.clone(),
                    physical_dimension: self.config.physical_dimension.clone(),
                    physical_min: self.config.physical_lim.0,
                    physical_max: self.config.physical_lim.1,
                    sfreq,
                    samples_per_record: record_len(sfreq, self.config.record_duration)?,
                    prefilter: if label.contains("AUX") {
                        String::new()
                    } else {
                        self.config.preamp_filter.clone()
                    },
                })
            })
            .collect::<Result<_>>()?;
        Ok(RecordingHeader {
            signals,
            record_duration: self.config.record_duration,
            start_date: self.config.metadata.resolved_start_date(),
            metadata: self.config.metadata.clone(),
        })
    }

    /// Opens the sink for this run and primes the device.
    pub fn start(&mut self, task_id: &str, run_id: &str, init_args: &Arguments) -> Result<()> {
        self.base.begin(task_id, run_id)?;
        let opened = self.open(init_args);
        if opened.is_err() {
            if let Some(mut sink) = self.sink.take() {
                if let Err(e) = sink.close() {
                    tracing::warn!(error = %e, "closing sink after failed start");
                }
            }
            self.base.end();
        }
        opened
    }

    fn open(&mut self, init_args: &Arguments) -> Result<()> {
        self.base.layout().ensure_stream_dir(self.base.stream())?;
        let path = self.base.filepath()?;
        let header = self.header()?;
        self.sink = Some(self.sinks.create(&path, &header)?);
        self.buffer.clear();
        tracing::info!(path = %path.display(), channels = header.signals.len(), "recording started");
        self.config.init_read.invoke_with(&mut self.device, init_args)?;
        Ok(())
    }

    pub fn read(&mut self, remainder: bool) -> Result<Samples> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::configuration("read called before start"))?;
        let samples = self.config.read.invoke(&mut self.device)?.into_samples()?;
        self.buffer.push(&samples)?;
        for record in self.buffer.drain_records(remainder) {
            tracing::debug!(samples = record.n_samples(), "flushing record");
            sink.write_record(&record, self.config.is_digital)?;
        }
        Ok(samples)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.config.read.invoke(&mut self.device)?;
        Ok(())
    }

    pub fn annotate(&mut self, onset: f64, duration: Option<f64>, text: &str) -> Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::configuration("annotate called before start"))?;
        sink.write_annotation(Annotation {
            onset,
            duration,
            text: text.to_owned(),
        })
    }

    /// Releases the device and closes the sink. Both are attempted even if
    /// the first fails; the first error is returned.
    pub fn stop(&mut self, stop_args: &Arguments) -> Result<()> {
        if !self.base.is_started() {
            return Ok(());
        }
        if !self.buffer.is_empty() {
            tracing::warn!(
                samples = self.buffer.len(),
                "stopping with unflushed samples; they are discarded"
            );
            self.buffer.clear();
        }
        let released = self.config.stop.invoke_with(&mut self.device, stop_args).map(drop);
        let closed = match self.sink.take() {
            Some(mut sink) => sink.close(),
            None => Ok(()),
        };
        tracing::info!(modality = %self.base.stream().modality(), "recording stopped");
        self.base.end();
        released.and(closed)
    }
}
