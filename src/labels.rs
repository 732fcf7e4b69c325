use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Ordered set of class names. The position of a name is its integer code;
/// the loader, the model head and the inference decoder all share one
/// registry value so the encoding cannot drift between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRegistry {
    names: Vec<String>,
}

impl LabelRegistry {
    /// Build a registry from an ordered list of names. Duplicates are
    /// rejected since the name-to-code mapping must be bijective.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            bail!("label registry requires at least one class name");
        }

        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                bail!("duplicate class name in label registry: {name:?}");
            }
        }

        Ok(Self { names })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
