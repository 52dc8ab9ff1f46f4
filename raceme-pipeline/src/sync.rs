//! The synchronizer: reconciles the timelines of sibling inputs feeding
//! one rewrite point, inserting plain delay registers where an exact
//! correction exists and elastic buffers where the dependency is
//! data-dependent.

use crate::build::UnitContext;
use crate::{Timed, Timeline, BUFFER_DEPTH};
use raceme_ir::{Builder, Node, RRC};
use raceme_utils::{Error, RacemeResult};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::rc::Rc;

impl<'a> UnitContext<'a> {
    /// Reconcile a set of sibling values: produce the unified target
    /// timeline and, per input, a value resynchronized onto it.
    ///
    /// The target carries the union of calculation sources across the
    /// inputs, each at the maximum observed offset. `None` is returned
    /// when every input is timeline-free.
    pub(crate) fn synchronize(
        &mut self,
        inputs: &[Timed],
    ) -> RacemeResult<(Option<Rc<Timeline>>, Vec<RRC<Node>>)> {
        let mut target: BTreeMap<_, u64> = BTreeMap::new();
        for input in inputs {
            if let Some(timeline) = &input.time {
                for (source, offset) in timeline.offsets() {
                    target
                        .entry(source)
                        .and_modify(|o| *o = (*o).max(offset))
                        .or_insert(offset);
                }
            }
        }
        if target.is_empty() {
            let nodes =
                inputs.iter().map(|t| Rc::clone(&t.node)).collect();
            return Ok((None, nodes));
        }
        let target = self.timelines.intern(target);
        let mut synced = Vec::with_capacity(inputs.len());
        for input in inputs {
            synced.push(self.resync(input, &target)?);
        }
        Ok((Some(target), synced))
    }

    /// Re-time one value onto `target`, memoized per (value, target
    /// timeline) so repeated references share the correction hardware.
    pub(crate) fn resync(
        &mut self,
        input: &Timed,
        target: &Rc<Timeline>,
    ) -> RacemeResult<RRC<Node>> {
        let key = (input.node.borrow().name(), target.id());
        if let Some(hit) = self.resync_cache.get(&key) {
            return Ok(Rc::clone(hit));
        }
        let synced = self.resync_uncached(input, target)?;
        self.resync_cache.insert(key, Rc::clone(&synced));
        Ok(synced)
    }

    fn resync_uncached(
        &mut self,
        input: &Timed,
        target: &Rc<Timeline>,
    ) -> RacemeResult<RRC<Node>> {
        let name = input.node.borrow().name();

        let Some(own) = &input.time else {
            // A timeline-free value is anchored at offset zero on every
            // target source: it is re-produced at each activation and has
            // to travel with the pipeline wave. A uniform target offset is
            // a plain delay chain; with diverging offsets the value is
            // continuously valid and needs no correction at all.
            let offsets: HashSet<u64> =
                target.offsets().map(|(_, o)| o).collect();
            if offsets.len() == 1 {
                let delay = *offsets.iter().next().unwrap();
                if delay > 0 {
                    return Ok(Builder::new(&mut self.new)
                        .add_register(&input.node, delay));
                }
            }
            return Ok(Rc::clone(&input.node));
        };

        if own.id() == target.id() {
            return Ok(Rc::clone(&input.node));
        }

        let unrelated = target
            .sources()
            .any(|source| own.offset(source).is_none())
            || own
                .sources()
                .any(|source| target.offset(source).is_none());
        if unrelated {
            // No relation to at least one required source: inherently
            // data-dependent. Resynchronize through an elastic buffer
            // keyed on the target's done signal.
            let trigger = target.done(&self.sources, &mut self.new)?;
            let release = own.done(&self.sources, &mut self.new)?;
            return Ok(Builder::new(&mut self.new).add_buffer(
                &trigger,
                &release,
                &input.node,
                BUFFER_DEPTH,
            ));
        }

        // Every source is shared: a single additive correction must
        // reconcile all of them at once.
        let mut correction: Option<u64> = None;
        for (source, want) in target.offsets() {
            let have = own
                .offset(source)
                .expect("shared-source case checked above");
            let Some(diff) = want.checked_sub(have) else {
                return Err(Error::impossible_sync(
                    name,
                    format!(
                        "already {} cycle(s) past the target on {:?}",
                        have - want,
                        self.sources.get(source).kind
                    ),
                ));
            };
            match correction {
                None => correction = Some(diff),
                Some(current) if current == diff => {}
                Some(current) => {
                    return Err(Error::impossible_sync(
                        name,
                        format!(
                            "shared sources demand conflicting corrections \
                             ({} vs {} cycles); the values come from \
                             incompatible control contexts",
                            current, diff
                        ),
                    ))
                }
            }
        }
        match correction {
            Some(delay) if delay > 0 => Ok(Builder::new(&mut self.new)
                .add_register(&input.node, delay)),
            _ => Ok(Rc::clone(&input.node)),
        }
    }
}
