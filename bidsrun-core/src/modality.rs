use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of data stream a recording session can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Mri,
    Meg,
    Eeg,
    Ieeg,
    Physio,
    Stim,
}

impl Modality {
    /// Primary modalities own a directory; companions ride along in one.
    pub fn is_primary(&self) -> bool {
        !matches!(self, Modality::Physio | Modality::Stim)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Mri => "mri",
            Modality::Meg => "meg",
            Modality::Eeg => "eeg",
            Modality::Ieeg => "ieeg",
            Modality::Physio => "physio",
            Modality::Stim => "stim",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mri" => Ok(Modality::Mri),
            "meg" => Ok(Modality::Meg),
            "eeg" => Ok(Modality::Eeg),
            "ieeg" => Ok(Modality::Ieeg),
            "physio" => Ok(Modality::Physio),
            "stim" => Ok(Modality::Stim),
            other => Err(Error::configuration(format!("unknown modality '{other}'"))),
        }
    }
}
