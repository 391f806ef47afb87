use std::borrow::Cow;
use std::io;
use std::path::Path;

use crate::utils;

/// Ordered class names; the position of a name is its class id.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Reads one label per line.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(utils::file_to_vec(path)?))
    }

    /// Label of `id`, or the id itself when no label is known.
    pub fn label(&self, id: usize) -> Cow<'_, str> {
        match self.names.get(id) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(id.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
