//! Bindings between instruments and the device drivers behind them.
//!
//! An instrument never talks to hardware directly. It holds [`Binding`]s
//! chosen at configuration time, each either a closure or the name of an
//! operation the [`Device`] publishes, plus the arguments to call it with.

use crate::samples::Samples;
use bidsrun_core::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.to_owned(), value.into());
        self
    }

    /// Call-time arguments go first; configured keyword arguments win on
    /// key collisions.
    fn merged(&self, extra: &Arguments) -> Arguments {
        let mut args = extra.args.clone();
        args.extend(self.args.iter().cloned());
        let mut kwargs = extra.kwargs.clone();
        kwargs.extend(self.kwargs.iter().map(|(k, v)| (k.clone(), v.clone())));
        Arguments { args, kwargs }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOutput {
    Unit,
    Samples(Samples),
}

impl DeviceOutput {
    pub fn into_samples(self) -> Result<Samples> {
        match self {
            DeviceOutput::Samples(samples) => Ok(samples),
            DeviceOutput::Unit => Err(Error::device("read binding returned no samples")),
        }
    }
}

pub type DeviceOp<D> = fn(&mut D, &Arguments) -> Result<DeviceOutput>;

/// A device driver exposing a fixed set of named operations.
pub trait Device: Send {
    fn operation(&self, name: &str) -> Option<DeviceOp<Self>>
    where
        Self: Sized;
}

pub type DeviceFn<D> = Box<dyn FnMut(&mut D, &Arguments) -> Result<DeviceOutput> + Send>;

pub enum Binding<D> {
    Noop,
    Callable(DeviceFn<D>),
    Method { name: String, arguments: Arguments },
}

impl<D> Default for Binding<D> {
    fn default() -> Self {
        Binding::Noop
    }
}

impl<D> fmt::Debug for Binding<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Noop => f.write_str("Noop"),
            Binding::Callable(_) => f.write_str("Callable(..)"),
            Binding::Method { name, arguments } => f
                .debug_struct("Method")
                .field("name", name)
                .field("arguments", arguments)
                .finish(),
        }
    }
}

impl<D: Device> Binding<D> {
    pub fn callable<F>(f: F) -> Self
    where
        F: FnMut(&mut D, &Arguments) -> Result<DeviceOutput> + Send + 'static,
    {
        Binding::Callable(Box::new(f))
    }

    pub fn method(name: &str, arguments: Arguments) -> Self {
        Binding::Method {
            name: name.to_owned(),
            arguments,
        }
    }

    /// Fails if a method binding names an operation `device` does not have.
    pub fn validate(&self, device: &D) -> Result<()> {
        if let Binding::Method { name, .. } = self {
            if device.operation(name).is_none() {
                return Err(Error::configuration(format!(
                    "device has no operation '{name}'"
                )));
            }
        }
        Ok(())
    }

    pub fn invoke(&mut self, device: &mut D) -> Result<DeviceOutput> {
        self.invoke_with(device, &Arguments::default())
    }

    pub fn invoke_with(&mut self, device: &mut D, extra: &Arguments) -> Result<DeviceOutput> {
        match self {
            Binding::Noop => Ok(DeviceOutput::Unit),
            Binding::Callable(f) => f(device, extra),
            Binding::Method { name, arguments } => {
                let op = device
                    .operation(name)
                    .ok_or_else(|| Error::device(format!("device has no operation '{name}'")))?;
                op(device, &arguments.merged(extra))
            }
        }
    }
}
