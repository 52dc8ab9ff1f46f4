use crate::Id;
use std::collections::{HashMap, HashSet};

/// Generates fresh names per prefix, avoiding every name it has already
/// handed out or been told about.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    counts: HashMap<Id, u64>,
    taken: HashSet<Id>,
}

impl NameGenerator {
    /// Create a generator that will never produce any of `names`.
    pub fn with_prev_defined_names(names: HashSet<Id>) -> Self {
        NameGenerator {
            counts: HashMap::new(),
            taken: names,
        }
    }

    /// Reserve additional names the generator must avoid.
    pub fn add_names<I>(&mut self, names: I)
    where
        I: IntoIterator<Item = Id>,
    {
        self.taken.extend(names)
    }

    /// Return a new name starting with `prefix`.
    ///
    /// ```
    /// # use raceme_utils::NameGenerator;
    /// let mut namegen = NameGenerator::default();
    /// assert_eq!(namegen.gen_name("reg"), "reg0");
    /// assert_eq!(namegen.gen_name("reg"), "reg1");
    /// ```
    pub fn gen_name<S>(&mut self, prefix: S) -> Id
    where
        S: Into<Id>,
    {
        let prefix: Id = prefix.into();
        loop {
            let count = self.counts.entry(prefix).or_insert(0);
            let candidate = Id::from(format!("{}{}", prefix, count));
            *count += 1;
            if self.taken.insert(candidate) {
                return candidate;
            }
        }
    }
}
