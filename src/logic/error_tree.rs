use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Per-path failure messages collected while applying a mutation.
/// Paths keep their `$id`/`$new` segments so a caller can tell exactly
/// which instruction misfired. Insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorTree {
    entries: Vec<(String, Vec<String>)>,
}

impl ErrorTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        let path = path.into();
        if let Some((_, messages)) = self.entries.iter_mut().find(|(p, _)| *p == path) {
            messages.push(message.into());
        } else {
            self.entries.push((path, vec![message.into()]));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct failing paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, path: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, messages)| messages.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(p, m)| (p.as_str(), m.as_slice()))
    }
}

impl Serialize for ErrorTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (path, messages) in &self.entries {
            map.serialize_entry(path, messages)?;
        }
        map.end()
    }
}
