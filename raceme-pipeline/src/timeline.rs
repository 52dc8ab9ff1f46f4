//! Node timelines: per-value records of the exact cycle offset relative to
//! each relevant calculation source, with a lazily-derived done signal.

use crate::{SourceId, SourceTable};
use raceme_ir::{BinaryOp, Builder, Graph, Node, RRC};
use raceme_utils::{Error, RacemeResult};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Fan-in bound for one stage of a derived done-signal AND tree. Keeps the
/// combinational depth of wide joins balanced instead of chaining them.
const DONE_TREE_FANIN: usize = 4;

/// Identity of an interned timeline within a unit build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimelineId(u32);

/// Mapping from calculation source to the exact cycle offset at which the
/// value is available, plus the memoized derived done signal. Two
/// timelines describe the same cycle for a value only if their offset maps
/// are equal; interning (see [TimelineSet]) makes that an identity check.
#[derive(Debug)]
pub struct Timeline {
    id: TimelineId,
    offsets: BTreeMap<SourceId, u64>,
    done: RefCell<Option<RRC<Node>>>,
}

impl Timeline {
    fn new(id: TimelineId, offsets: BTreeMap<SourceId, u64>) -> Self {
        Timeline {
            id,
            offsets,
            done: RefCell::new(None),
        }
    }

    pub fn id(&self) -> TimelineId {
        self.id
    }

    pub fn offset(&self, source: SourceId) -> Option<u64> {
        self.offsets.get(&source).copied()
    }

    /// (source, offset) pairs in source order.
    pub fn offsets(&self) -> impl Iterator<Item = (SourceId, u64)> + '_ {
        self.offsets.iter().map(|(s, o)| (*s, *o))
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.offsets.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The pulse that fires when a value on this timeline becomes
    /// available. Computed once and cached: each contributing source's
    /// pulse is register-delayed by the offset, and multiple sources are
    /// joined by a balanced AND tree with bounded per-stage fan-in.
    pub fn done(
        &self,
        sources: &SourceTable,
        graph: &mut Graph,
    ) -> RacemeResult<RRC<Node>> {
        if let Some(done) = &*self.done.borrow() {
            return Ok(Rc::clone(done));
        }
        if self.offsets.is_empty() {
            return Err(Error::EmptySource(graph.name));
        }
        let mut builder = Builder::new(graph);
        let mut pulses = Vec::with_capacity(self.offsets.len());
        for (&sid, &offset) in &self.offsets {
            let pulse = Rc::clone(&sources.get(sid).pulse);
            pulses.push(if offset == 0 {
                pulse
            } else {
                builder.add_register(&pulse, offset)
            });
        }
        let done = and_tree(&mut builder, pulses);
        *self.done.borrow_mut() = Some(Rc::clone(&done));
        Ok(done)
    }
}

/// Balanced AND reduction with at most [DONE_TREE_FANIN] pulses joined per
/// stage.
fn and_tree(builder: &mut Builder, mut level: Vec<RRC<Node>>) -> RRC<Node> {
    debug_assert!(!level.is_empty());
    while level.len() > 1 {
        level = level
            .chunks(DONE_TREE_FANIN)
            .map(|chunk| {
                let mut pulses = chunk.iter();
                let first = Rc::clone(pulses.next().unwrap());
                pulses.fold(first, |acc, pulse| {
                    builder.add_binary(BinaryOp::And, &acc, pulse)
                })
            })
            .collect();
    }
    level.pop().unwrap()
}

/// Interner for timelines, scoped to one unit build. Guarantees that equal
/// offset maps share a single [Timeline], so caches can key on
/// [TimelineId].
#[derive(Debug, Default)]
pub(crate) struct TimelineSet {
    interned: HashMap<Vec<(SourceId, u64)>, Rc<Timeline>>,
    next: u32,
}

impl TimelineSet {
    pub fn intern(
        &mut self,
        offsets: BTreeMap<SourceId, u64>,
    ) -> Rc<Timeline> {
        let key: Vec<_> = offsets.iter().map(|(s, o)| (*s, *o)).collect();
        if let Some(timeline) = self.interned.get(&key) {
            return Rc::clone(timeline);
        }
        let timeline =
            Rc::new(Timeline::new(TimelineId(self.next), offsets));
        self.next += 1;
        self.interned.insert(key, Rc::clone(&timeline));
        timeline
    }

    /// Timeline with a single contributing source.
    pub fn single(&mut self, source: SourceId, offset: u64) -> Rc<Timeline> {
        self.intern(BTreeMap::from([(source, offset)]))
    }

    /// `timeline` delayed by `by` cycles: every offset shifts forward.
    pub fn shifted(&mut self, timeline: &Timeline, by: u64) -> Rc<Timeline> {
        self.intern(timeline.offsets().map(|(s, o)| (s, o + by)).collect())
    }
}

/// A translated node paired with its timeline. `None` marks a
/// timeline-free value (a constant), which can combine with any schedule.
#[derive(Debug, Clone)]
pub struct Timed {
    pub node: RRC<Node>,
    pub time: Option<Rc<Timeline>>,
}

impl Timed {
    pub fn new(node: RRC<Node>, time: Option<Rc<Timeline>>) -> Self {
        Timed { node, time }
    }

    /// A timeline-free value.
    pub fn free(node: RRC<Node>) -> Self {
        Timed { node, time: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Delay, SourceKind, SourceTable};
    use raceme_ir::NodeKind;

    fn setup() -> (Graph, SourceTable) {
        let mut graph = Graph::new("t");
        let start = Builder::new(&mut graph).add_input("start", 1);
        let sources = SourceTable::new(&start);
        (graph, sources)
    }

    #[test]
    fn interning_shares_equal_offset_maps() {
        let (_, sources) = setup();
        let start = sources.unit_start().id;
        let mut set = TimelineSet::default();
        let a = set.single(start, 3);
        let b = set.single(start, 3);
        assert_eq!(a.id(), b.id());
        assert!(Rc::ptr_eq(&a, &b));
        let c = set.shifted(&a, 1);
        assert_ne!(a.id(), c.id());
        assert_eq!(c.offset(start), Some(4));
    }

    #[test]
    fn done_of_zero_offset_is_the_pulse_itself() {
        let (mut graph, sources) = setup();
        let mut set = TimelineSet::default();
        let timeline = set.single(sources.unit_start().id, 0);
        let done = timeline.done(&sources, &mut graph).unwrap();
        assert!(Rc::ptr_eq(&done, &sources.unit_start().pulse));
    }

    #[test]
    fn done_of_single_source_is_a_delayed_pulse() {
        let (mut graph, sources) = setup();
        let mut set = TimelineSet::default();
        let timeline = set.single(sources.unit_start().id, 2);
        let done = timeline.done(&sources, &mut graph).unwrap();
        match &done.borrow().kind {
            NodeKind::Register { delay, .. } => assert_eq!(*delay, 2),
            other => panic!("expected a register, got {:?}", other),
        }
        // Computed once and cached.
        let again = timeline.done(&sources, &mut graph).unwrap();
        assert!(Rc::ptr_eq(&done, &again));
    }

    #[test]
    fn done_of_multiple_sources_is_an_and_join() {
        let (mut graph, mut sources) = setup();
        let mut set = TimelineSet::default();
        let base = set.single(sources.unit_start().id, 0);
        let pulse = Builder::new(&mut graph).add_input("finish", 1);
        let call = sources.add(
            SourceKind::CallDone("f".into()),
            &pulse,
            Delay::Unknown(1),
            base,
        );
        let timeline = set.intern(BTreeMap::from([
            (sources.unit_start().id, 0),
            (call.id, 0),
        ]));
        let done = timeline.done(&sources, &mut graph).unwrap();
        assert!(matches!(
            done.borrow().kind,
            NodeKind::Binary {
                op: raceme_ir::BinaryOp::And,
                ..
            }
        ));
    }

    #[test]
    fn empty_timeline_has_no_done_signal() {
        let (mut graph, sources) = setup();
        let mut set = TimelineSet::default();
        let timeline = set.intern(BTreeMap::new());
        assert!(timeline.done(&sources, &mut graph).is_err());
    }
}
