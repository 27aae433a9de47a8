use indexmap::IndexSet;

/// Properties an engine still works on. Seeded once from the specification;
/// the set only ever shrinks.
#[derive(Debug, Clone, Default)]
pub struct OutstandingProperties {
    names: IndexSet<String>,
}

impl OutstandingProperties {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Returns whether `name` was still outstanding.
    pub fn remove(&mut self, name: &str) -> bool {
        self.names.shift_remove(name)
    }

    pub fn remove_all<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        for name in names {
            self.names.shift_remove(name.as_str());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}
