//! Loop and call expansion: the only two constructs whose translation
//! produces state machines rather than per-node rewrites.

use crate::build::{CallInfo, LoopInfo, Scope, UnitContext};
use crate::{Delay, SourceKind, Timed, BUFFER_DEPTH};
use raceme_ir::{BinaryOp, Builder, Node, NodeKind, RRC, UnaryOp};
use raceme_utils::{Error, RacemeResult};
use std::rc::Rc;

/// Expand a call node: arguments are retimed onto one schedule, the call
/// is emitted over the resynchronized edges, and results are timestamped
/// either by shifting the argument timeline (exact callee) or against a
/// fresh completion source behind an elastic buffer (data-dependent
/// callee).
pub(crate) fn expand_call(
    ctx: &mut UnitContext,
    scope: &mut Scope,
    node: &RRC<Node>,
) -> RacemeResult<Timed> {
    let n = node.borrow();
    let call_name = n.name();
    let NodeKind::Call { callee, args } = &n.kind else {
        unreachable!("expand_call on a non-call node")
    };
    let callee = *callee;

    let mut arguments = Vec::with_capacity(args.len());
    for arg in args {
        arguments.push(ctx.translate(scope, arg)?);
    }
    let (args_time, synced_args) = ctx.synchronize(&arguments)?;
    let args_time = match args_time {
        Some(timeline) => timeline,
        // Constant-only arguments: the call launches on the start pulse.
        None => {
            let start = ctx.sources.unit_start().id;
            ctx.timelines.single(start, 0)
        }
    };

    let callee_delay = *ctx
        .delays
        .get(&callee)
        .ok_or(Error::UndefinedCallee(callee))?;
    let call = Builder::new(&mut ctx.new).add_call(callee, &synced_args);

    let info = match callee_delay {
        Delay::Known(latency) => CallInfo {
            producer: Rc::clone(&call),
            time: ctx.timelines.shifted(&args_time, latency),
        },
        Delay::Unknown(min) => {
            // The callee's completion becomes a calculation source of its
            // own; consumers of the results inherit the non-determinism.
            let done = Builder::new(&mut ctx.new).add_call_done(&call);
            let source = ctx.sources.add(
                SourceKind::CallDone(call_name),
                &done,
                Delay::Unknown(min),
                Rc::clone(&args_time),
            );
            let trigger = args_time.done(&ctx.sources, &mut ctx.new)?;
            let buffer = Builder::new(&mut ctx.new).add_buffer(
                &trigger,
                &done,
                &call,
                BUFFER_DEPTH,
            );
            CallInfo {
                producer: buffer,
                time: ctx.timelines.single(source.id, 0),
            }
        }
        Delay::Invalid => {
            return Err(Error::unsupported_delay(format!(
                "callee `{}` has no computed delay",
                callee
            )))
        }
    };

    let out = Timed::new(Rc::clone(&info.producer), Some(Rc::clone(&info.time)));
    scope.calls.insert(call_name, info);
    log::debug!(
        "expanded call `{}` to `{}` (delay {})",
        call_name,
        callee,
        callee_delay
    );
    Ok(out)
}

/// Expand a loop node into an Idle/Iterating state machine flattened into
/// the surrounding graph:
///
/// - `working` and `step_ready` feedback bits track whether an invocation
///   is in flight and whether another iteration starts next cycle;
/// - each carried value selects the external entry when idle and the carry
///   feedback while iterating, feeding both the body and the condition;
/// - the condition result and every body next-value are retimed onto one
///   iteration schedule, and the exit test waits for that schedule's done
///   pulse (which includes the body's own completion) before sampling the
///   condition;
/// - the exit pulse returns the machine to idle and releases per-entry
///   hold structures exposing the exported results.
pub(crate) fn expand_loop(
    ctx: &mut UnitContext,
    scope: &mut Scope,
    node: &RRC<Node>,
) -> RacemeResult<Timed> {
    let n = node.borrow();
    let loop_name = n.name();
    let NodeKind::Loop {
        entries,
        body,
        condition,
    } = &n.kind
    else {
        unreachable!("expand_loop on a non-loop node")
    };
    if entries.is_empty() {
        return Err(Error::malformed_graph(format!(
            "loop `{}` carries no values",
            loop_name
        )));
    }

    // External entry values, retimed onto one schedule.
    let mut initials = Vec::with_capacity(entries.len());
    for entry in entries {
        initials.push(ctx.translate(scope, &entry.initial)?);
    }
    let (entry_time, synced_initials) = ctx.synchronize(&initials)?;
    let entry_time = match entry_time {
        Some(timeline) => timeline,
        None => {
            let start = ctx.sources.unit_start().id;
            ctx.timelines.single(start, 0)
        }
    };
    let entry_done = entry_time.done(&ctx.sources, &mut ctx.new)?;

    // State bits and the step pulse. A fresh invocation begins when the
    // entries arrive while the machine is idle; further steps fire while
    // working whenever the previous iteration signalled readiness.
    let (working, working_seal, step_seal, start_pulse, step_start) = {
        let mut builder = Builder::new(&mut ctx.new);
        let (working, working_seal) = builder.add_feedback("working", 1);
        let (step_ready, step_seal) = builder.add_feedback("step_ready", 1);
        let idle = builder.add_unary(UnaryOp::Not, &working);
        let start_pulse =
            builder.add_binary(BinaryOp::And, &entry_done, &idle);
        let stepping =
            builder.add_binary(BinaryOp::And, &working, &step_ready);
        let step_start =
            builder.add_binary(BinaryOp::Or, &start_pulse, &stepping);
        (working, working_seal, step_seal, start_pulse, step_start)
    };

    let source = ctx.sources.add(
        SourceKind::LoopStep(loop_name),
        &step_start,
        // A step may be the first or any later iteration: the offset from
        // the entry schedule is data dependent with a zero lower bound.
        Delay::Unknown(0),
        Rc::clone(&entry_time),
    );
    let carried_time = ctx.timelines.single(source.id, 0);

    // Carried-value selection, seeding the body and condition subgraphs.
    let mut body_scope = Scope::default();
    let mut cond_scope = Scope::default();
    let mut carried = Vec::with_capacity(entries.len());
    let mut carry_seals = Vec::with_capacity(entries.len());
    for (entry, initial) in entries.iter().zip(&synced_initials) {
        let width = initial.borrow().width;
        let mut builder = Builder::new(&mut ctx.new);
        let (feedback, seal) = builder.add_feedback("carry", width);
        let selected = builder.add_mux(&working, &feedback, initial);
        let timed =
            Timed::new(Rc::clone(&selected), Some(Rc::clone(&carried_time)));
        body_scope
            .map
            .insert(entry.body_view.borrow().name(), timed.clone());
        cond_scope
            .map
            .insert(entry.cond_view.borrow().name(), timed);
        carried.push(selected);
        carry_seals.push(seal);
    }

    // Translate the nested subgraphs against the step schedule.
    let mut nexts = Vec::with_capacity(entries.len());
    for entry in entries {
        nexts.push(ctx.translate(&mut body_scope, &entry.next)?);
    }
    let cond_output = condition.outputs.first().ok_or_else(|| {
        Error::malformed_graph(format!(
            "loop `{}` has a condition graph with no output",
            loop_name
        ))
    })?;
    let cond = ctx.translate(&mut cond_scope, cond_output)?;

    // One iteration schedule for the condition and every next value. The
    // exit test samples the condition only once this schedule's done pulse
    // fires, so a body with data-dependent latency is fully waited for.
    let mut iteration = vec![cond];
    iteration.extend(nexts.iter().cloned());
    let (iter_time, mut synced) = ctx.synchronize(&iteration)?;
    let iter_time = match iter_time {
        Some(timeline) => timeline,
        None => Rc::clone(&carried_time),
    };
    let cond_synced = synced.remove(0);
    let iter_done = iter_time.done(&ctx.sources, &mut ctx.new)?;

    let (exit, continue_pulse) = {
        let mut builder = Builder::new(&mut ctx.new);
        let exit = builder.add_binary(BinaryOp::And, &iter_done, &cond_synced);
        let not_cond = builder.add_unary(UnaryOp::Not, &cond_synced);
        let continue_pulse =
            builder.add_binary(BinaryOp::And, &iter_done, &not_cond);
        // working' = (working | start) & !exit
        let engaged = builder.add_binary(BinaryOp::Or, &working, &start_pulse);
        let not_exit = builder.add_unary(UnaryOp::Not, &exit);
        let working_next =
            builder.add_binary(BinaryOp::And, &engaged, &not_exit);
        working_seal.seal(&working_next);
        step_seal.seal(&continue_pulse);
        (exit, continue_pulse)
    };

    // Carry style: an exact per-iteration latency seals the carry register
    // directly; a data-dependent one has no fixed cycle count per step, so
    // the carry goes through the full handshake path.
    let iter_delay = ctx.sources.delay_from(&iter_time, source.id);
    for (seal, next) in carry_seals.into_iter().zip(&synced) {
        if iter_delay.is_exact() {
            seal.seal(next);
        } else {
            let buffer = Builder::new(&mut ctx.new).add_buffer(
                &continue_pulse,
                &iter_done,
                next,
                BUFFER_DEPTH,
            );
            seal.seal(&buffer);
        }
    }

    // Exported results: the body's final update where the body drives the
    // entry, the unmodified carried value otherwise, held stable from the
    // exit pulse on.
    let mut results = Vec::with_capacity(entries.len());
    for (index, next) in synced.iter().enumerate() {
        let passthrough = Rc::ptr_eq(&nexts[index].node, &carried[index]);
        let final_value = if passthrough { &carried[index] } else { next };
        let width = final_value.borrow().width;
        let mut builder = Builder::new(&mut ctx.new);
        let (hold, hold_seal) = builder.add_feedback("hold", width);
        let released = builder.add_mux(&exit, final_value, &hold);
        hold_seal.seal(&released);
        results.push(Timed::new(released, Some(Rc::clone(&iter_time))));
    }
    scope.loops.insert(loop_name, LoopInfo { results });

    log::debug!(
        "expanded loop `{}` ({} carried entries, iteration delay {})",
        loop_name,
        entries.len(),
        iter_delay
    );
    Ok(Timed::new(exit, Some(iter_time)))
}
