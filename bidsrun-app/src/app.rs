use crate::Args;
use crate::devices::{MarkerDevice, SineDevice};
use crate::sink::JsonLinesSinkFactory;
use anyhow::{Context, Result, ensure};
use bidsrun_core::{Event, SessionLayout, Trigger};
use bidsrun_experiment::{RunSummary, Task, TaskConfig, TaskDefinition};
use bidsrun_instrument::{
    Arguments, Binding, EegInstrument, Instrument, RecorderConfig, RecordingMetadata, SamplingRate,
    StimConfig, StimInstrument,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::File;
use std::io::{BufRead, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::info;

/// Block-design task: every event start is forwarded to the stimulus
/// channel as a marker.
struct BlockTask {
    definition: TaskDefinition,
    stim: usize,
}

impl Task for BlockTask {
    fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    fn definition_mut(&mut self) -> &mut TaskDefinition {
        &mut self.definition
    }

    fn on_event_start(&mut self, event: &Event) -> bidsrun_core::Result<()> {
        info!(%event, "event started");
        let stim = self.definition.writable(self.stim);
        if let (Some(label), Some(stim)) = (event.trial_type.as_deref(), stim) {
            stim.write(label)?;
        }
        Ok(())
    }

    fn on_event_end(&mut self, event: &Event) -> bidsrun_core::Result<()> {
        info!(%event, "event finished");
        Ok(())
    }
}

pub struct App {
    args: Args,
    config: TaskConfig,
    layout: Arc<SessionLayout>,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        ensure!(args.block > 0, "--block must be at least one sample");
        let config = match &args.config {
            Some(path) => TaskConfig::load(path)
                .with_context(|| format!("loading task config {}", path.display()))?,
            None => TaskConfig::default(),
        };
        let layout = Arc::new(SessionLayout::new(&args.root, &args.subject, &args.session));
        Ok(Self {
            args,
            config,
            layout,
        })
    }

    pub fn run(self) -> Result<()> {
        info!(
            root = %self.args.root.display(),
            subject = self.layout.subject_id(),
            session = self.layout.session_id(),
            task = %self.config.name,
            "preparing run"
        );

        let mut rng = match self.args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let events = self.config.build_events(&mut rng).context("building events")?;
        let triggers: Vec<Trigger> = events
            .iter()
            .filter(|e| e.triggerable())
            .map(Event::trigger)
            .collect();

        let instruments = self.instruments()?;
        let definition = TaskDefinition::new(
            &self.config.name,
            Arc::clone(&self.layout),
            instruments,
            events,
            self.config.duration()?,
        )?;
        let mut task = BlockTask { definition, stim: 1 };

        if !triggers.is_empty() {
            info!(count = triggers.len(), "press Enter to raise each signal in turn");
            spawn_trigger_listener(triggers)?;
        }

        let summary = task.add_run()?.start().context("run aborted")?;
        let path = self.write_summary(&summary)?;
        info!(
            run = %summary.run_id,
            samples = summary.total_samples,
            elapsed_s = summary.elapsed_secs,
            events = %summary.events_path.display(),
            summary = %path.display(),
            "run complete"
        );
        Ok(())
    }

    fn instruments(&self) -> Result<Vec<Box<dyn Instrument>>> {
        let args = &self.args;
        let eeg_config = RecorderConfig {
            electrodes: (1..=args.channels).map(|i| format!("EEG{i:02}")).collect(),
            sfreq: SamplingRate::Shared(args.sfreq),
            file_ext: "jsonl".to_owned(),
            metadata: RecordingMetadata {
                equipment: "simulated amplifier".to_owned(),
                ..RecordingMetadata::default()
            },
            init_read: Binding::method("connect", Arguments::new()),
            read: Binding::method("read", Arguments::new()),
            stop: Binding::method("disconnect", Arguments::new()),
            ..RecorderConfig::default()
        };
        let device = SineDevice::new(args.sfreq, args.channels, args.block, args.realtime);
        let eeg = EegInstrument::new(
            Arc::clone(&self.layout),
            device,
            eeg_config,
            Arc::new(JsonLinesSinkFactory),
        )
        .context("configuring EEG instrument")?;
        let stim = StimInstrument::new(
            Arc::clone(&self.layout),
            MarkerDevice::default(),
            StimConfig::default(),
        )
        .context("configuring stimulus instrument")?;
        let instruments: Vec<Box<dyn Instrument>> = vec![Box::new(eeg), Box::new(stim)];
        Ok(instruments)
    }

    fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        let name = format!(
            "{}_summary.json",
            self.layout.run_prefix(&summary.task_id, &summary.run_id)
        );
        let path = summary.events_path.with_file_name(name);
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), summary)?;
        Ok(path)
    }
}

/// Each line read from stdin raises the next pending trigger.
fn spawn_trigger_listener(triggers: Vec<Trigger>) -> Result<()> {
    thread::Builder::new()
        .name("trigger-input".to_owned())
        .spawn(move || {
            let mut pending = triggers.into_iter();
            for line in std::io::stdin().lock().lines() {
                if line.is_err() {
                    break;
                }
                let Some(trigger) = pending.next() else {
                    break;
                };
                trigger.set();
                info!("signal raised");
            }
        })
        .context("spawning trigger listener")?;
    Ok(())
}
