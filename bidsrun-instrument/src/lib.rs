pub mod buffer;
pub mod device;
pub mod eeg;
pub mod instrument;
pub mod memory;
pub mod physio;
pub mod recorder;
pub mod samples;
pub mod sink;
pub mod stim;
pub mod testing;

pub use buffer::{RecordBuffer, SamplingRate};
pub use device::{Arguments, Binding, Device, DeviceOp, DeviceOutput};
pub use eeg::{EegInstrument, IeegInstrument};
pub use instrument::{Instrument, InstrumentBase, Readable, Writable};
pub use memory::{MemorySinkFactory, Recording};
pub use physio::{PhysioConfig, PhysioInstrument};
pub use recorder::{BufferedRecorder, RecorderConfig};
pub use samples::{SampleBlock, Samples};
pub use sink::{Annotation, RecordingHeader, RecordingMetadata, SignalHeader, SinkFactory, TimeSeriesSink};
pub use stim::{StimConfig, StimInstrument};
