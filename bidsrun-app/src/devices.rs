//! Stand-ins for the hardware a real session would drive.

use bidsrun_core::{Error, Result};
use bidsrun_instrument::{Arguments, Device, DeviceOp, DeviceOutput, SampleBlock, Samples};
use bidsrun_timing::Pacer;
use serde_json::Value;
use std::f64::consts::TAU;

/// Amplifier producing one sine per channel, 6 Hz on the first channel and
/// 2 Hz higher on each following one.
#[derive(Debug)]
pub struct SineDevice {
    sfreq: u32,
    n_channels: usize,
    block: usize,
    amplitude: f64,
    produced: u64,
    pacer: Option<Pacer>,
    connected: bool,
}

impl SineDevice {
    pub fn new(sfreq: u32, n_channels: usize, block: usize, realtime: bool) -> Self {
        Self {
            sfreq,
            n_channels,
            block,
            amplitude: 50.0,
            produced: 0,
            pacer: realtime.then(|| Pacer::new(sfreq)),
            connected: false,
        }
    }

    fn connect(&mut self) {
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.restart();
        }
        self.produced = 0;
        self.connected = true;
        tracing::debug!(sfreq = self.sfreq, channels = self.n_channels, "amplifier connected");
    }

    fn disconnect(&mut self) {
        self.connected = false;
        tracing::debug!(samples = self.produced, "amplifier disconnected");
    }

    fn next_block(&mut self) -> Result<SampleBlock> {
        if !self.connected {
            return Err(Error::device("amplifier is not connected"));
        }
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.release(self.block);
        }
        let start = self.produced;
        self.produced += self.block as u64;
        let sfreq = f64::from(self.sfreq);
        let channels = (0..self.n_channels)
            .map(|c| {
                let freq = 6.0 + 2.0 * c as f64;
                (0..self.block)
                    .map(|i| {
                        let t = (start + i as u64) as f64 / sfreq;
                        self.amplitude * (TAU * freq * t).sin()
                    })
                    .collect()
            })
            .collect();
        SampleBlock::new(channels)
    }
}

impl Device for SineDevice {
    fn operation(&self, name: &str) -> Option<DeviceOp<Self>> {
        let op: DeviceOp<Self> = match name {
            "connect" => |d, _| {
                d.connect();
                Ok(DeviceOutput::Unit)
            },
            "read" => |d, _| Ok(DeviceOutput::Samples(Samples::Block(d.next_block()?))),
            "disconnect" => |d, _| {
                d.disconnect();
                Ok(DeviceOutput::Unit)
            },
            _ => return None,
        };
        Some(op)
    }
}

/// Stimulus channel that reports each marker instead of presenting it.
#[derive(Debug, Default)]
pub struct MarkerDevice {
    pub presented: Vec<String>,
}

fn present(device: &mut MarkerDevice, args: &Arguments) -> Result<DeviceOutput> {
    let marker = args
        .args
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| Error::device("marker must be a string"))?;
    tracing::info!(marker, "stimulus");
    device.presented.push(marker.to_owned());
    Ok(DeviceOutput::Unit)
}

impl Device for MarkerDevice {
    fn operation(&self, name: &str) -> Option<DeviceOp<Self>> {
        let op: DeviceOp<Self> = match name {
            "start" | "stop" => |_, _| Ok(DeviceOutput::Unit),
            "write" => present,
            _ => return None,
        };
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_blocks_continue_across_reads() {
        let mut device = SineDevice::new(100, 2, 4, false);
        assert!(device.next_block().is_err());

        let connect = device.operation("connect").unwrap();
        connect(&mut device, &Arguments::new()).unwrap();
        let first = device.next_block().unwrap();
        let second = device.next_block().unwrap();
        assert_eq!(first.n_channels(), 2);
        assert_eq!(second.n_samples(), 4);
        assert_eq!(first.channels()[0][0], 0.0);

        let expected = 50.0 * (TAU * 6.0 * 4.0 / 100.0).sin();
        assert!((second.channels()[0][0] - expected).abs() < 1e-12);
    }

    #[test]
    fn markers_are_recorded() {
        let mut device = MarkerDevice::default();
        let write = device.operation("write").unwrap();
        write(&mut device, &Arguments::new().arg("rest")).unwrap();
        assert!(write(&mut device, &Arguments::new().arg(3)).is_err());
        assert_eq!(device.presented, vec!["rest"]);
        assert!(device.operation("present").is_none());
    }
}
