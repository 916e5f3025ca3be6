use std::fmt;

/// A `key-label` filename entity such as `run-01` or `task-rest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    name: String,
    key: String,
    index: Option<u32>,
    label: String,
    padding: usize,
}

impl Entity {
    pub const DEFAULT_PADDING: usize = 2;

    /// Integer-valued entity; the label is zero-padded to `padding` digits.
    pub fn indexed(name: &str, key: Option<&str>, index: u32, padding: usize) -> Self {
        Self {
            name: name.to_owned(),
            key: key.map_or_else(|| default_key(name), str::to_owned),
            index: Some(index),
            label: format!("{index:0padding$}"),
            padding,
        }
    }

    /// Entity from a free-form value; numeric values are treated as indices.
    pub fn labelled(name: &str, key: Option<&str>, value: &str, padding: usize) -> Self {
        if let Ok(index) = value.parse::<u32>() {
            return Self::indexed(name, key, index, padding);
        }
        Self {
            name: name.to_owned(),
            key: key.map_or_else(|| default_key(name), str::to_owned),
            index: None,
            label: value.to_owned(),
            padding,
        }
    }

    pub fn run(index: u32) -> Self {
        Self::indexed("Run", None, index, Self::DEFAULT_PADDING)
    }

    pub fn task(name: &str) -> Self {
        Self::labelled("Task", None, name, Self::DEFAULT_PADDING)
    }

    pub fn id(&self) -> String {
        format!("{}-{}", self.key, self.label)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn padding(&self) -> usize {
        self.padding
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.key, self.label)
    }
}

fn default_key(name: &str) -> String {
    name.chars().take(3).collect::<String>().to_lowercase()
}

/// Prefixes `sub-` unless already present.
pub fn ensure_participant_id(id: &str) -> String {
    if id.starts_with("sub-") {
        id.to_owned()
    } else {
        format!("sub-{id}")
    }
}

pub fn participant_id_from_index(index: u32) -> String {
    format!("sub-{index:02}")
}
