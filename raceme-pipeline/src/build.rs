//! The pipeline driver: walks the input graph once, translating each node
//! at most once into the retimed output graph, expanding loops and calls
//! into explicit state machines on first encounter.

use crate::expand;
use crate::timeline::TimelineSet;
use crate::{Delay, SourceTable, Timed, TimelineId};
use itertools::Itertools;
use raceme_ir::{validate, Builder, Graph, Id, Node, NodeKind, RRC};
use raceme_utils::{Error, RacemeResult};
use std::collections::HashMap;
use std::rc::Rc;

/// Already-computed delays per callee name.
pub type DelayMap = HashMap<Id, Delay>;

/// Result of retiming one unit: the pipelined graph and the unit's summary
/// delay, folded into the [DelayMap] when compiling callers.
#[derive(Debug)]
pub struct PipelinedUnit {
    pub graph: Graph,
    pub delay: Delay,
}

/// Boundary names the engine reserves in every pipelined graph.
const RESERVED_PORTS: [&str; 3] = ["clk", "start", "done"];

/// State for one unit build. All caches live here and die with it, so
/// unrelated units can never alias each other's hardware.
pub(crate) struct UnitContext<'a> {
    /// The pipelined graph under construction.
    pub(crate) new: Graph,
    pub(crate) delays: &'a DelayMap,
    pub(crate) sources: SourceTable,
    pub(crate) timelines: TimelineSet,
    /// Per (input node, target timeline) resynchronization results.
    pub(crate) resync_cache: HashMap<(Id, TimelineId), RRC<Node>>,
}

/// Expansion record of one call node.
pub(crate) struct CallInfo {
    /// The call node or, for data-dependent callees, the buffer wrapping
    /// it.
    pub producer: RRC<Node>,
    /// Timeline of every result of the call.
    pub time: Rc<crate::Timeline>,
}

/// Expansion record of one loop node.
pub(crate) struct LoopInfo {
    /// Exported value per carried entry.
    pub results: Vec<Timed>,
}

/// Old-to-new translation state for one graph (the unit's top graph, or a
/// loop's body or condition subgraph). Nodes are keyed by name, which is
/// unique within a graph.
#[derive(Default)]
pub(crate) struct Scope {
    pub map: HashMap<Id, Timed>,
    pub calls: HashMap<Id, CallInfo>,
    pub loops: HashMap<Id, LoopInfo>,
}

impl<'a> UnitContext<'a> {
    /// Translate one old node, reusing the cached result on a second
    /// visit.
    pub(crate) fn translate(
        &mut self,
        scope: &mut Scope,
        node: &RRC<Node>,
    ) -> RacemeResult<Timed> {
        let name = node.borrow().name();
        if let Some(hit) = scope.map.get(&name) {
            return Ok(hit.clone());
        }
        let out = self.translate_uncached(scope, node)?;
        scope.map.insert(name, out.clone());
        Ok(out)
    }

    fn translate_uncached(
        &mut self,
        scope: &mut Scope,
        node: &RRC<Node>,
    ) -> RacemeResult<Timed> {
        let n = node.borrow();
        let name = n.name();
        match &n.kind {
            // Inputs are seeded by the caller (unit boundary or loop
            // carried values); an unseeded input is a dangling reference.
            NodeKind::Input { .. } => Err(Error::malformed_graph(format!(
                "input `{}` is not bound in this context",
                name
            ))),
            // Outputs are transparent views of their value.
            NodeKind::Output { value } => self.translate(scope, value),
            NodeKind::Constant { value } => {
                let constant = Builder::new(&mut self.new)
                    .add_constant(value.clone(), n.width);
                Ok(Timed::free(constant))
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.translate(scope, operand)?;
                let out = Builder::new(&mut self.new)
                    .add_unary(*op, &operand.node);
                Ok(Timed::new(out, operand.time))
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let lhs = self.translate(scope, lhs)?;
                let rhs = self.translate(scope, rhs)?;
                let (time, synced) = self.synchronize(&[lhs, rhs])?;
                let out = Builder::new(&mut self.new)
                    .add_binary(*op, &synced[0], &synced[1]);
                Ok(Timed::new(out, time))
            }
            NodeKind::Mux {
                cond,
                on_true,
                on_false,
            } => {
                let cond = self.translate(scope, cond)?;
                let on_true = self.translate(scope, on_true)?;
                let on_false = self.translate(scope, on_false)?;
                let (time, synced) =
                    self.synchronize(&[cond, on_true, on_false])?;
                let out = Builder::new(&mut self.new)
                    .add_mux(&synced[0], &synced[1], &synced[2]);
                Ok(Timed::new(out, time))
            }
            NodeKind::Register { input, delay } => {
                let delay = *delay;
                let input = self.translate(scope, input)?;
                let out = Builder::new(&mut self.new)
                    .add_register(&input.node, delay);
                // A register anchors even a timeline-free value: its
                // output exists `delay` cycles after the activation that
                // produced the input.
                let time = match &input.time {
                    Some(timeline) => self.timelines.shifted(timeline, delay),
                    None => {
                        let start = self.sources.unit_start().id;
                        self.timelines.single(start, delay)
                    }
                };
                Ok(Timed::new(out, Some(time)))
            }
            NodeKind::Call { .. } => expand::expand_call(self, scope, node),
            NodeKind::CallResult { producer, index } => {
                let index = *index;
                let call_name = producer.borrow().name();
                if !scope.calls.contains_key(&call_name) {
                    self.translate(scope, producer)?;
                }
                let info =
                    scope.calls.get(&call_name).ok_or_else(|| {
                        Error::malformed_graph(format!(
                            "result `{}` does not reference a call",
                            name
                        ))
                    })?;
                let (producer, time) =
                    (Rc::clone(&info.producer), Rc::clone(&info.time));
                let out = Builder::new(&mut self.new)
                    .add_call_result(&producer, index, n.width);
                Ok(Timed::new(out, Some(time)))
            }
            NodeKind::Loop { .. } => expand::expand_loop(self, scope, node),
            NodeKind::LoopResult { source, entry } => {
                let entry = *entry;
                let loop_name = source.borrow().name();
                if !scope.loops.contains_key(&loop_name) {
                    self.translate(scope, source)?;
                }
                let info = scope.loops.get(&loop_name).ok_or_else(|| {
                    Error::malformed_graph(format!(
                        "`{}` does not reference a loop",
                        name
                    ))
                })?;
                info.results.get(entry).cloned().ok_or_else(|| {
                    Error::malformed_graph(format!(
                        "loop `{}` has no carried entry {}",
                        loop_name, entry
                    ))
                })
            }
            // Pipeline-only constructs are produced by this engine, never
            // consumed by it.
            NodeKind::CallDone { .. }
            | NodeKind::FeedbackRegister { .. }
            | NodeKind::Buffer { .. } => {
                Err(Error::unsupported_node(name, n.kind_name()))
            }
        }
    }
}

/// Retime one unit. `delays` must hold the already-computed [Delay] of
/// every callee; recursive call graphs are rejected before this stage, so
/// forward compilation order always satisfies this.
pub fn build_unit(
    old: &Graph,
    delays: &DelayMap,
) -> RacemeResult<PipelinedUnit> {
    validate(old)?;
    for port in old.inputs.iter().chain(old.outputs.iter()) {
        let port_name = port.borrow().name();
        if RESERVED_PORTS.iter().any(|r| port_name == *r) {
            return Err(Error::malformed_graph(format!(
                "port name `{}` is reserved for boundary signals",
                port_name
            )));
        }
    }

    let mut new = Graph::new(old.name);
    let start = {
        let mut builder = Builder::new(&mut new);
        builder.add_input("clk", 1);
        builder.add_input("start", 1)
    };
    let sources = SourceTable::new(&start);
    let mut ctx = UnitContext {
        new,
        delays,
        sources,
        timelines: TimelineSet::default(),
        resync_cache: HashMap::new(),
    };

    // Every unit input is available at cycle zero of the start pulse.
    let mut scope = Scope::default();
    let start_time = ctx.timelines.single(ctx.sources.unit_start().id, 0);
    for old_input in &old.inputs {
        let (name, width) = {
            let n = old_input.borrow();
            (n.name(), n.width)
        };
        let new_input = Builder::new(&mut ctx.new).add_input(name, width);
        scope
            .map
            .insert(name, Timed::new(new_input, Some(Rc::clone(&start_time))));
    }

    let mut outputs = Vec::with_capacity(old.outputs.len());
    for old_output in &old.outputs {
        let (name, value) = {
            let n = old_output.borrow();
            match &n.kind {
                NodeKind::Output { value } => (n.name(), Rc::clone(value)),
                _ => {
                    return Err(Error::malformed_graph(format!(
                        "`{}` is listed as an output but is not one",
                        n.name()
                    )))
                }
            }
        };
        let value = ctx.translate(&mut scope, &value)?;
        outputs.push((name, value));
    }

    // All outputs are retimed onto one schedule; its done pulse is the
    // unit's done signal and its total delay is the unit's summary delay.
    let timed: Vec<Timed> = outputs.iter().map(|(_, t)| t.clone()).collect();
    let (unit_time, synced) = ctx.synchronize(&timed)?;
    let (done, delay) = match &unit_time {
        Some(timeline) => (
            timeline.done(&ctx.sources, &mut ctx.new)?,
            ctx.sources.total_delay(timeline),
        ),
        // A unit of pure constants completes the cycle it starts.
        None => (Rc::clone(&start), Delay::Known(0)),
    };

    let mut builder = Builder::new(&mut ctx.new);
    for ((name, _), value) in outputs.iter().zip(&synced) {
        builder.add_output(*name, value);
    }
    builder.add_output("done", &done);

    log::info!("pipelined unit `{}`: delay {}", old.name, delay);
    Ok(PipelinedUnit {
        graph: ctx.new,
        delay,
    })
}

/// Retime a forward-ordered list of units, folding each unit's summary
/// delay into the delay map for its callers. A failing unit is reported
/// and skipped; sibling units continue to compile.
pub fn build_units(
    units: &[Graph],
    externals: &DelayMap,
) -> Vec<(Id, RacemeResult<PipelinedUnit>)> {
    let mut delays = externals.clone();
    let mut results = Vec::with_capacity(units.len());
    for unit in units {
        let result = build_unit(unit, &delays);
        match &result {
            Ok(pipelined) => {
                delays.insert(unit.name, pipelined.delay);
            }
            Err(error) => {
                log::error!("skipping unit `{}`: {}", unit.name, error);
            }
        }
        results.push((unit.name, result));
    }
    log::debug!(
        "compiled delays: {}",
        results
            .iter()
            .map(|(name, result)| match result {
                Ok(unit) => format!("{}={}", name, unit.delay),
                Err(_) => format!("{}=<failed>", name),
            })
            .join(", ")
    );
    results
}
