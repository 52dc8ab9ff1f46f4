use crate::{Node, RRC};
use linked_hash_map::LinkedHashMap;
use raceme_utils::{GetName, Id, NameGenerator};
use std::rc::Rc;

/// An ordered collection of named entities behind RRCs with deterministic
/// iteration and constant-time name lookup. Assumes names never change
/// after insertion.
#[derive(Debug)]
pub struct IdList<T: GetName>(LinkedHashMap<Id, RRC<T>>);

impl<T: GetName> Default for IdList<T> {
    fn default() -> Self {
        IdList(LinkedHashMap::new())
    }
}

impl<'a, T: GetName> IntoIterator for &'a IdList<T> {
    type Item = &'a RRC<T>;
    type IntoIter = linked_hash_map::Values<'a, Id, RRC<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.values()
    }
}

impl<T: GetName> IdList<T> {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Add a new element, replacing and returning any previous element with
    /// the same name.
    pub fn add(&mut self, item: RRC<T>) -> Option<RRC<T>> {
        let name = item.borrow().name();
        self.0.insert(name, item)
    }

    pub fn find<S>(&self, name: S) -> Option<RRC<T>>
    where
        S: Into<Id>,
    {
        self.0.get(&name.into()).map(Rc::clone)
    }

    /// Iterator over the elements in insertion order.
    pub fn iter(&self) -> impl Clone + Iterator<Item = &RRC<T>> {
        self.0.values()
    }
}

/// One compilation unit's dataflow graph: an append-only, name-keyed node
/// list plus the boundary input/output views.
#[derive(Debug, Default)]
pub struct Graph {
    pub name: Id,
    /// All nodes, in creation order.
    pub nodes: IdList<Node>,
    /// Boundary inputs, ordered by their port index.
    pub inputs: Vec<RRC<Node>>,
    /// Boundary outputs, in declaration order.
    pub outputs: Vec<RRC<Node>>,
    namegen: NameGenerator,
}

impl Graph {
    pub fn new<S: Into<Id>>(name: S) -> Self {
        Graph {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Construct a non-conflicting node name from `prefix`.
    pub fn generate_name<S: Into<Id>>(&mut self, prefix: S) -> Id {
        self.namegen.gen_name(prefix)
    }

    /// Reserve `name` so [Graph::generate_name] never produces it.
    pub fn reserve_name(&mut self, name: Id) {
        self.namegen.add_names([name]);
    }

    /// Register `node`, returning its shared handle. Panics on a name
    /// collision: callers construct names through [Graph::generate_name] or
    /// [Graph::reserve_name].
    pub fn add(&mut self, node: Node) -> RRC<Node> {
        let handle = crate::rrc(node);
        let prev = self.nodes.add(Rc::clone(&handle));
        assert!(
            prev.is_none(),
            "duplicate node name `{}` in graph `{}`",
            handle.borrow().name(),
            self.name
        );
        handle
    }

    pub fn find<S: Into<Id>>(&self, name: S) -> Option<RRC<Node>> {
        self.nodes.find(name)
    }

    /// Get the node called `name`, panicking if it does not exist.
    pub fn get<S: Into<Id> + std::fmt::Display + Clone>(
        &self,
        name: S,
    ) -> RRC<Node> {
        self.find(name.clone()).unwrap_or_else(|| {
            panic!("node `{}' not found in graph `{}'", name, self.name)
        })
    }
}
