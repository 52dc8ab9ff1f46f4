//! Calculation sources: the distinct time-zero events a value's timing can
//! be measured from.

use crate::{Delay, Timeline};
use raceme_ir::{Node, RRC};
use raceme_utils::Id;
use std::rc::Rc;

/// Identity of one calculation source within a unit build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) u32);

/// The kind of event a source's cycle zero refers to. The set of kinds is
/// closed even though instances proliferate per loop and call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The unit's start pulse.
    UnitStart,
    /// The step pulse of the named loop.
    LoopStep(Id),
    /// The completion pulse of the named call.
    CallDone(Id),
}

/// One time-zero event. Non-global sources own the timeline their
/// activation is measured from, so sources can nest (a call inside a loop
/// body is based on the loop's step timeline).
#[derive(Debug)]
pub struct CalcSource {
    pub id: SourceId,
    pub kind: SourceKind,
    /// Node in the pipelined graph carrying this source's pulse.
    pub pulse: RRC<Node>,
    /// Delay of one activation relative to `base`.
    pub delay: Delay,
    /// Timeline the activation is measured from; `None` for the unit
    /// start.
    pub base: Option<Rc<Timeline>>,
}

/// Per-unit registry of calculation sources. Index 0 is always the unit
/// start.
#[derive(Debug)]
pub struct SourceTable {
    sources: Vec<Rc<CalcSource>>,
}

impl SourceTable {
    pub fn new(start_pulse: &RRC<Node>) -> Self {
        SourceTable {
            sources: vec![Rc::new(CalcSource {
                id: SourceId(0),
                kind: SourceKind::UnitStart,
                pulse: Rc::clone(start_pulse),
                delay: Delay::Known(0),
                base: None,
            })],
        }
    }

    pub fn unit_start(&self) -> &Rc<CalcSource> {
        &self.sources[0]
    }

    pub fn add(
        &mut self,
        kind: SourceKind,
        pulse: &RRC<Node>,
        delay: Delay,
        base: Rc<Timeline>,
    ) -> Rc<CalcSource> {
        let id = SourceId(self.sources.len() as u32);
        let source = Rc::new(CalcSource {
            id,
            kind,
            pulse: Rc::clone(pulse),
            delay,
            base: Some(base),
        });
        self.sources.push(Rc::clone(&source));
        source
    }

    pub fn get(&self, id: SourceId) -> &Rc<CalcSource> {
        &self.sources[id.0 as usize]
    }

    /// Total delay of a timeline measured from the unit start.
    pub fn total_delay(&self, timeline: &Timeline) -> Delay {
        self.delay_from(timeline, self.unit_start().id)
    }

    /// Delay of a timeline measured from activations of `origin`. Sources
    /// unrelated to `origin` contribute `Invalid` and drop out of the
    /// merge.
    pub fn delay_from(&self, timeline: &Timeline, origin: SourceId) -> Delay {
        timeline.offsets().fold(Delay::Invalid, |acc, (sid, off)| {
            acc.merge(
                self.source_delay_from(sid, origin)
                    .concat(Delay::Known(off)),
            )
        })
    }

    fn source_delay_from(&self, sid: SourceId, origin: SourceId) -> Delay {
        if sid == origin {
            return Delay::Known(0);
        }
        let source = self.get(sid);
        match &source.base {
            Some(base) => self.delay_from(base, origin).concat(source.delay),
            None => Delay::Invalid,
        }
    }
}
