//! Deterministic devices for tests and dry runs.

use crate::device::{Arguments, Binding, Device, DeviceOp, DeviceOutput};
use crate::samples::{SampleBlock, Samples};
use bidsrun_core::{Error, Result};
use std::collections::VecDeque;

/// Emits blocks of a per-channel ramp (`channel * 1000 + sample index`).
///
/// Block sizes come from `script`, falling back to `step` once it runs out.
/// Every operation invoked is appended to `calls`.
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    pub n_channels: usize,
    pub step: usize,
    pub script: VecDeque<usize>,
    pub produced: u64,
    pub calls: Vec<(String, Arguments)>,
    /// Makes the n-th `read` (0-based) fail.
    pub fail_on_read: Option<u64>,
    reads: u64,
}

impl ScriptedDevice {
    pub fn new(n_channels: usize, step: usize) -> Self {
        Self {
            n_channels,
            step,
            script: VecDeque::new(),
            produced: 0,
            calls: Vec::new(),
            fail_on_read: None,
            reads: 0,
        }
    }

    pub fn with_script(mut self, sizes: impl IntoIterator<Item = usize>) -> Self {
        self.script = sizes.into_iter().collect();
        self
    }

    pub fn called(&self, name: &str) -> usize {
        self.calls.iter().filter(|(n, _)| n == name).count()
    }

    pub fn next_block(&mut self) -> Result<SampleBlock> {
        let read = self.reads;
        self.reads += 1;
        if self.fail_on_read == Some(read) {
            return Err(Error::device(format!("scripted failure on read {read}")));
        }
        let n = self.script.pop_front().unwrap_or(self.step);
        let start = self.produced;
        self.produced += n as u64;
        let channels = (0..self.n_channels)
            .map(|c| (0..n).map(|i| (c * 1000) as f64 + (start + i as u64) as f64).collect())
            .collect();
        SampleBlock::new(channels)
    }

    /// `read` bound by name.
    pub fn read_binding() -> Binding<Self> {
        Binding::method("read", Arguments::new())
    }

    pub fn init_binding() -> Binding<Self> {
        Binding::method("init", Arguments::new())
    }
}

fn record_call(device: &mut ScriptedDevice, name: &str, args: &Arguments) {
    device.calls.push((name.to_owned(), args.clone()));
}

impl Device for ScriptedDevice {
    fn operation(&self, name: &str) -> Option<DeviceOp<Self>> {
        let op: DeviceOp<Self> = match name {
            "read" => |d, a| {
                record_call(d, "read", a);
                Ok(DeviceOutput::Samples(Samples::Block(d.next_block()?)))
            },
            "init" => |d, a| {
                record_call(d, "init", a);
                Ok(DeviceOutput::Unit)
            },
            "start" => |d, a| {
                record_call(d, "start", a);
                Ok(DeviceOutput::Unit)
            },
            "stop" => |d, a| {
                record_call(d, "stop", a);
                Ok(DeviceOutput::Unit)
            },
            "write" => |d, a| {
                record_call(d, "write", a);
                Ok(DeviceOutput::Unit)
            },
            _ => return None,
        };
        Some(op)
    }
}
