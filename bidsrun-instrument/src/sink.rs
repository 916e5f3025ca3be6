//! Contract of the time-series file an instrument records into.
//!
//! The encoder itself lives elsewhere; instruments only see a
//! [`TimeSeriesSink`] created by a [`SinkFactory`] when a run starts.

use crate::samples::Samples;
use bidsrun_core::Result;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Free-text header fields. Unset fields are written as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingMetadata {
    pub technician: String,
    pub recording_additional: String,
    pub patient_name: String,
    pub patient_additional: String,
    pub patient_code: String,
    pub equipment: String,
    pub admin_code: String,
    pub gender: String,
    pub sex: String,
    pub birth_date: String,
    /// Filled with the current local time when the header is built.
    pub start_date: Option<NaiveDateTime>,
}

impl RecordingMetadata {
    pub fn resolved_start_date(&self) -> NaiveDateTime {
        self.start_date
            .unwrap_or_else(|| Local::now().naive_local())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalHeader {
    pub label: String,
    pub physical_dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub sfreq: u32,
    pub samples_per_record: usize,
    pub prefilter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingHeader {
    pub signals: Vec<SignalHeader>,
    pub record_duration: f64,
    pub start_date: NaiveDateTime,
    pub metadata: RecordingMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub onset: f64,
    pub duration: Option<f64>,
    pub text: String,
}

pub trait TimeSeriesSink: Send {
    /// Writes one record. Each channel carries either a whole record, no
    /// samples, or once and last, a short tail. Implementations reject
    /// anything else.
    fn write_record(&mut self, record: &Samples, digital: bool) -> Result<()>;

    fn write_annotation(&mut self, annotation: Annotation) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

pub trait SinkFactory: Send + Sync {
    fn create(&self, path: &Path, header: &RecordingHeader) -> Result<Box<dyn TimeSeriesSink>>;
}
