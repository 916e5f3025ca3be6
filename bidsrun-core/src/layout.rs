//! On-disk naming of recording streams.
//!
//! Every file produced during a run is named
//! `{subject}_{session}_{task}_{run}_[recording-{label}_]{modality}.{ext}` and
//! lives in the directory of its primary modality. Companion streams (physio,
//! stim) never get a directory of their own.

use crate::entity::{Entity, ensure_participant_id};
use crate::error::{Error, Result};
use crate::modality::Modality;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Identity of one instrument's stream, independent of any run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamName {
    modality: Modality,
    companion: Option<Companion>,
    ext: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Companion {
    label: String,
    primary: Modality,
}

impl StreamName {
    pub fn primary(modality: Modality, ext: &str) -> Result<Self> {
        if !modality.is_primary() {
            return Err(Error::configuration(format!(
                "{modality} is a companion modality and needs a recording label and primary modality"
            )));
        }
        Ok(Self {
            modality,
            companion: None,
            ext: ext.to_owned(),
        })
    }

    pub fn companion(modality: Modality, label: &str, primary: Modality, ext: &str) -> Result<Self> {
        if modality.is_primary() {
            return Err(Error::configuration(format!(
                "recording label '{label}' is only valid on companion modalities, not {modality}"
            )));
        }
        if !primary.is_primary() {
            return Err(Error::configuration(format!(
                "{modality} must accompany a primary modality, got {primary}"
            )));
        }
        if label.is_empty() || label.contains(['_', '-', '/']) {
            return Err(Error::configuration(format!("invalid recording label '{label}'")));
        }
        Ok(Self {
            modality,
            companion: Some(Companion {
                label: label.to_owned(),
                primary,
            }),
            ext: ext.to_owned(),
        })
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn label(&self) -> Option<&str> {
        self.companion.as_ref().map(|c| c.label.as_str())
    }

    /// Modality whose directory this stream is written into.
    pub fn directory_modality(&self) -> Modality {
        self.companion.as_ref().map_or(self.modality, |c| c.primary)
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// `[recording-{label}_]{modality}.{ext}`
    pub fn suffix(&self) -> String {
        match self.label() {
            Some(label) => format!("recording-{label}_{}.{}", self.modality, self.ext),
            None => format!("{}.{}", self.modality, self.ext),
        }
    }
}

/// Subject/session directory a recording session writes into.
#[derive(Debug, Clone)]
pub struct SessionLayout {
    root: PathBuf,
    subject: String,
    session: String,
}

impl SessionLayout {
    pub fn new(root: impl Into<PathBuf>, subject: &str, session: &str) -> Self {
        Self {
            root: root.into(),
            subject: ensure_participant_id(subject),
            session: Entity::labelled("Session", None, session, Entity::DEFAULT_PADDING).id(),
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject
    }

    pub fn session_id(&self) -> &str {
        &self.session
    }

    pub fn session_path(&self) -> PathBuf {
        self.root.join(&self.subject).join(&self.session)
    }

    pub fn modality_path(&self, modality: Modality) -> PathBuf {
        self.session_path().join(modality.as_str())
    }

    pub fn stream_dir(&self, stream: &StreamName) -> PathBuf {
        self.modality_path(stream.directory_modality())
    }

    pub fn ensure_stream_dir(&self, stream: &StreamName) -> Result<PathBuf> {
        let dir = self.stream_dir(stream);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// `{subject}_{session}_{task}_{run}`
    pub fn run_prefix(&self, task_id: &str, run_id: &str) -> String {
        [self.subject.as_str(), &self.session, task_id, run_id].join("_")
    }

    pub fn stream_filename(&self, stream: &StreamName, task_id: &str, run_id: &str) -> String {
        format!("{}_{}", self.run_prefix(task_id, run_id), stream.suffix())
    }

    pub fn stream_path(&self, stream: &StreamName, task_id: &str, run_id: &str) -> PathBuf {
        self.stream_dir(stream)
            .join(self.stream_filename(stream, task_id, run_id))
    }
}

/// Answers which runs of a task already exist for a stream.
pub trait RunIndex {
    /// Run ordinals found for `task_id` on `stream`, ascending.
    fn existing_runs(&self, task_id: &str, stream: &StreamName) -> Result<Vec<u32>>;

    fn highest_run(&self, task_id: &str, stream: &StreamName) -> Result<Option<u32>> {
        Ok(self.existing_runs(task_id, stream)?.last().copied())
    }

    fn next_run(&self, task_id: &str, stream: &StreamName) -> Result<u32> {
        Ok(self.highest_run(task_id, stream)?.map_or(1, |n| n + 1))
    }
}

impl RunIndex for SessionLayout {
    fn existing_runs(&self, task_id: &str, stream: &StreamName) -> Result<Vec<u32>> {
        let dir = self.stream_dir(stream);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = run_pattern(&self.run_prefix(task_id, "run-"), stream)?;
        let mut runs = BTreeSet::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(run) = parse_run(&pattern, &entry.path()) {
                runs.insert(run);
            }
        }
        tracing::debug!(dir = %dir.display(), task = task_id, found = runs.len(), "scanned runs");
        Ok(runs.into_iter().collect())
    }
}

/// `prefix` is the run prefix up to and including `run-`.
fn run_pattern(prefix: &str, stream: &StreamName) -> Result<Regex> {
    let pattern = format!(
        r"^{}([0-9]+)_{}$",
        regex::escape(prefix),
        regex::escape(&stream.suffix()),
    );
    Ok(Regex::new(&pattern)?)
}

fn parse_run(pattern: &Regex, path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    pattern.captures(name)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn layout(root: &Path) -> SessionLayout {
        SessionLayout::new(root, "01", "1")
    }

    #[test]
    fn companion_streams_share_the_primary_directory() {
        let layout = layout(Path::new("/data"));
        let eeg = StreamName::primary(Modality::Eeg, "edf").unwrap();
        let physio = StreamName::companion(Modality::Physio, "emg", Modality::Eeg, "edf").unwrap();

        assert_eq!(
            layout.stream_path(&eeg, "task-rest", "run-01"),
            PathBuf::from("/data/sub-01/ses-01/eeg/sub-01_ses-01_task-rest_run-01_eeg.edf")
        );
        assert_eq!(
            layout.stream_path(&physio, "task-rest", "run-01"),
            PathBuf::from(
                "/data/sub-01/ses-01/eeg/sub-01_ses-01_task-rest_run-01_recording-emg_physio.edf"
            )
        );
    }

    #[test]
    fn companion_rules_are_enforced() {
        assert!(StreamName::primary(Modality::Stim, "tsv").is_err());
        assert!(StreamName::companion(Modality::Eeg, "x", Modality::Meg, "edf").is_err());
        assert!(StreamName::companion(Modality::Stim, "x", Modality::Physio, "tsv").is_err());
        assert!(StreamName::companion(Modality::Stim, "a_b", Modality::Eeg, "tsv").is_err());
    }

    #[test]
    fn next_run_starts_at_one() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout(tmp.path());
        let eeg = StreamName::primary(Modality::Eeg, "edf").unwrap();
        assert_eq!(layout.next_run("task-rest", &eeg).unwrap(), 1);
    }

    #[test]
    fn highest_run_parses_matching_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout(tmp.path());
        let eeg = StreamName::primary(Modality::Eeg, "edf").unwrap();
        let physio = StreamName::companion(Modality::Physio, "emg", Modality::Eeg, "edf").unwrap();
        let dir = layout.ensure_stream_dir(&eeg).unwrap();

        for (stream, task, run) in [
            (&eeg, "task-rest", "run-01"),
            (&eeg, "task-rest", "run-03"),
            (&physio, "task-rest", "run-07"),
            (&eeg, "task-motor", "run-09"),
        ] {
            File::create(dir.join(layout.stream_filename(stream, task, run))).unwrap();
        }
        File::create(dir.join("sub-01_ses-01_task-rest_run-05_events.tsv")).unwrap();

        assert_eq!(layout.existing_runs("task-rest", &eeg).unwrap(), vec![1, 3]);
        assert_eq!(layout.highest_run("task-rest", &eeg).unwrap(), Some(3));
        assert_eq!(layout.next_run("task-rest", &eeg).unwrap(), 4);
        assert_eq!(layout.highest_run("task-rest", &physio).unwrap(), Some(7));
        assert_eq!(layout.next_run("task-motor", &eeg).unwrap(), 10);
    }
}
