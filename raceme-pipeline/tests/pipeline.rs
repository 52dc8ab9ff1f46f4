//! End-to-end retiming scenarios driven through the public API.

use raceme_ir::{
    BinaryOp, Builder, ConstValue, Graph, LoopEntry, Node, NodeKind, RRC,
};
use raceme_pipeline::{build_unit, build_units, Delay, DelayMap};
use raceme_utils::Error;
use std::collections::HashMap;
use std::rc::Rc;

fn count_kind<F>(graph: &Graph, pred: F) -> usize
where
    F: Fn(&NodeKind) -> bool,
{
    graph
        .nodes
        .iter()
        .filter(|node| pred(&node.borrow().kind))
        .count()
}

fn buffers(graph: &Graph) -> usize {
    count_kind(graph, |k| matches!(k, NodeKind::Buffer { .. }))
}

fn as_register(node: &RRC<Node>) -> (RRC<Node>, u64) {
    match &node.borrow().kind {
        NodeKind::Register { input, delay } => (Rc::clone(input), *delay),
        other => panic!("expected a register, got {:?}", other),
    }
}

fn mux_edges(node: &RRC<Node>) -> (RRC<Node>, RRC<Node>, RRC<Node>) {
    match &node.borrow().kind {
        NodeKind::Mux {
            cond,
            on_true,
            on_false,
        } => (Rc::clone(cond), Rc::clone(on_true), Rc::clone(on_false)),
        other => panic!("expected a mux, got {:?}", other),
    }
}

/// Find the first node satisfying `pred`, in creation order.
fn find<F>(graph: &Graph, pred: F) -> RRC<Node>
where
    F: Fn(&NodeKind) -> bool,
{
    graph
        .nodes
        .iter()
        .find(|node| pred(&node.borrow().kind))
        .cloned()
        .expect("no matching node")
}

/// `length` incrementing binary operations, each one followed by a
/// register of `delay` cycles when nonzero.
fn chain(length: usize, delay: u64) -> Graph {
    let mut graph = Graph::new("chain");
    let mut builder = Builder::new(&mut graph);
    let mut value = builder.add_input("x", 32);
    let one = builder.add_constant(ConstValue::Value(1), 32);
    for _ in 0..length {
        let sum = builder.add_binary(BinaryOp::Add, &value, &one);
        value = if delay > 0 {
            builder.add_register(&sum, delay)
        } else {
            sum
        };
    }
    builder.add_output("out", &value);
    graph
}

#[test]
fn registered_chain_accumulates_exact_delay() {
    let unit = build_unit(&chain(4, 3), &DelayMap::new()).unwrap();
    assert_eq!(unit.delay, Delay::Known(12));
}

#[test]
fn combinational_chain_has_zero_delay() {
    let unit = build_unit(&chain(4, 0), &DelayMap::new()).unwrap();
    assert_eq!(unit.delay, Delay::Known(0));
    assert_eq!(count_kind(&unit.graph, |k| matches!(k, NodeKind::Register { .. })), 0);
}

#[test]
fn constant_is_registered_to_meet_its_delayed_copy() {
    // out = C + register(C, 3): the constant path gets exactly one new
    // register of delay 3 and the result is exact.
    let mut graph = Graph::new("skewed");
    {
        let mut builder = Builder::new(&mut graph);
        let constant = builder.add_constant(ConstValue::Value(5), 32);
        let delayed = builder.add_register(&constant, 3);
        let sum = builder.add_binary(BinaryOp::Add, &constant, &delayed);
        builder.add_output("out", &sum);
    }
    let unit = build_unit(&graph, &DelayMap::new()).unwrap();
    assert_eq!(unit.delay, Delay::Known(3));

    let add = find(&unit.graph, |k| {
        matches!(
            k,
            NodeKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        )
    });
    let (lhs, rhs) = match &add.borrow().kind {
        NodeKind::Binary { lhs, rhs, .. } => (Rc::clone(lhs), Rc::clone(rhs)),
        _ => unreachable!(),
    };
    // The left operand is the inserted correction: a 3-cycle register fed
    // directly by the constant.
    let (input, delay) = as_register(&lhs);
    assert_eq!(delay, 3);
    assert!(input.borrow().is_constant());
    // The right operand is the translated original register, untouched.
    let (_, delay) = as_register(&rhs);
    assert_eq!(delay, 3);
}

fn merge_graph(fast: u64, slow: u64) -> Graph {
    let mut graph = Graph::new("merge");
    let mut builder = Builder::new(&mut graph);
    let a = builder.add_input("a", 32);
    let b = builder.add_input("b", 32);
    let fast_v = builder.add_register(&a, fast);
    let slow_v = builder.add_register(&b, slow);
    let cond = builder.add_binary(BinaryOp::Lt, &fast_v, &slow_v);
    let merged = builder.add_mux(&cond, &fast_v, &slow_v);
    builder.add_output("out", &merged);
    graph
}

#[test]
fn balanced_merge_needs_no_correction() {
    let unit = build_unit(&merge_graph(2, 2), &DelayMap::new()).unwrap();
    assert_eq!(unit.delay, Delay::Known(2));
    let mux = find(&unit.graph, |k| matches!(k, NodeKind::Mux { .. }));
    let (_, on_true, on_false) = mux_edges(&mux);
    // Both branches arrive straight from their original registers.
    let (input, delay) = as_register(&on_true);
    assert_eq!(delay, 2);
    assert!(matches!(input.borrow().kind, NodeKind::Input { .. }));
    let (input, delay) = as_register(&on_false);
    assert_eq!(delay, 2);
    assert!(matches!(input.borrow().kind, NodeKind::Input { .. }));
}

#[test]
fn skewed_merge_pads_the_faster_branch() {
    let unit = build_unit(&merge_graph(2, 5), &DelayMap::new()).unwrap();
    assert_eq!(unit.delay, Delay::Known(5));
    let mux = find(&unit.graph, |k| matches!(k, NodeKind::Mux { .. }));
    let (_, on_true, on_false) = mux_edges(&mux);
    // The faster branch is padded by exactly the difference.
    let (padded, delay) = as_register(&on_true);
    assert_eq!(delay, 3);
    let (_, inner_delay) = as_register(&padded);
    assert_eq!(inner_delay, 2);
    // The slower branch is untouched.
    let (_, delay) = as_register(&on_false);
    assert_eq!(delay, 5);
}

#[test]
fn corrections_are_shared_between_rewrite_points() {
    // The condition and the mux both consume the padded fast branch; the
    // correction register must be built once.
    let unit = build_unit(&merge_graph(2, 5), &DelayMap::new()).unwrap();
    let cond_node = find(&unit.graph, |k| {
        matches!(k, NodeKind::Binary { op: BinaryOp::Lt, .. })
    });
    let cond_lhs = match &cond_node.borrow().kind {
        NodeKind::Binary { lhs, .. } => Rc::clone(lhs),
        _ => unreachable!(),
    };
    let mux = find(&unit.graph, |k| matches!(k, NodeKind::Mux { .. }));
    let (_, on_true, _) = mux_edges(&mux);
    assert!(Rc::ptr_eq(&cond_lhs, &on_true));
}

/// A counting loop: carry `x`, body computes `x + 1` behind `delay`
/// register cycles, condition exits once `x >= 10`.
fn counting_loop(delay: u64) -> Graph {
    let mut body = Graph::new("body");
    let (body_view, next) = {
        let mut builder = Builder::new(&mut body);
        let x = builder.add_input("x", 32);
        let one = builder.add_constant(ConstValue::Value(1), 32);
        let sum = builder.add_binary(BinaryOp::Add, &x, &one);
        let next = if delay > 0 {
            builder.add_register(&sum, delay)
        } else {
            sum
        };
        (x, next)
    };

    let mut condition = Graph::new("cond");
    let cond_view = {
        let mut builder = Builder::new(&mut condition);
        let x = builder.add_input("xc", 32);
        let limit = builder.add_constant(ConstValue::Value(10), 32);
        let exit = builder.add_binary(BinaryOp::Ge, &x, &limit);
        builder.add_output("exit", &exit);
        x
    };

    let mut graph = Graph::new("looped");
    let mut builder = Builder::new(&mut graph);
    let seed = builder.add_input("seed", 32);
    let entries = vec![LoopEntry {
        initial: seed,
        body_view,
        cond_view,
        next,
    }];
    let looped = builder.add_loop(entries, body, condition);
    let result = builder.add_loop_result(&looped, 0, 32);
    builder.add_output("out", &result);
    graph
}

#[test]
fn loop_delay_is_never_exact() {
    let unit = build_unit(&counting_loop(3), &DelayMap::new()).unwrap();
    assert_eq!(unit.delay, Delay::Unknown(3));
    // Exact per-iteration latency: the carry is a plain feedback register,
    // no handshake buffer anywhere.
    assert_eq!(buffers(&unit.graph), 0);
    assert_eq!(
        count_kind(&unit.graph, |k| matches!(
            k,
            NodeKind::FeedbackRegister { .. }
        )),
        4 // working, step_ready, carry, hold
    );
}

#[test]
fn immediate_loop_still_has_unknown_delay() {
    let unit = build_unit(&counting_loop(0), &DelayMap::new()).unwrap();
    assert_eq!(unit.delay, Delay::Unknown(0));
}

#[test]
fn unknown_latency_body_buffers_the_loop_carry() {
    // The body contains a call with data-dependent latency, so no fixed
    // per-iteration cycle count exists and the carry goes through the
    // handshake path.
    let mut body = Graph::new("body");
    let (body_view, next) = {
        let mut builder = Builder::new(&mut body);
        let x = builder.add_input("x", 32);
        let call = builder.add_call("f", &[Rc::clone(&x)]);
        let result = builder.add_call_result(&call, 0, 32);
        (x, result)
    };
    let mut condition = Graph::new("cond");
    let cond_view = {
        let mut builder = Builder::new(&mut condition);
        let x = builder.add_input("xc", 32);
        let limit = builder.add_constant(ConstValue::Value(10), 32);
        let exit = builder.add_binary(BinaryOp::Ge, &x, &limit);
        builder.add_output("exit", &exit);
        x
    };
    let mut graph = Graph::new("slow_loop");
    let mut builder = Builder::new(&mut graph);
    let seed = builder.add_input("seed", 32);
    let looped = builder.add_loop(
        vec![LoopEntry {
            initial: seed,
            body_view,
            cond_view,
            next,
        }],
        body,
        condition,
    );
    let result = builder.add_loop_result(&looped, 0, 32);
    builder.add_output("out", &result);

    let delays: DelayMap = HashMap::from([("f".into(), Delay::Unknown(2))]);
    let unit = build_unit(&graph, &delays).unwrap();
    assert!(!unit.delay.is_exact());

    let carry = unit.graph.get("carry0");
    let driver = match &carry.borrow().kind {
        NodeKind::FeedbackRegister {
            driver: Some(driver),
        } => driver.upgrade(),
        other => panic!("expected a sealed feedback, got {:?}", other),
    };
    assert!(matches!(driver.borrow().kind, NodeKind::Buffer { .. }));
}

#[test]
fn sequential_unknown_calls_chain_their_minimums() {
    let mut graph = Graph::new("twocalls");
    {
        let mut builder = Builder::new(&mut graph);
        let x = builder.add_input("x", 32);
        let first = builder.add_call("f", &[x]);
        let r1 = builder.add_call_result(&first, 0, 32);
        let second = builder.add_call("f", &[r1]);
        let r2 = builder.add_call_result(&second, 0, 32);
        builder.add_output("out", &r2);
    }
    let delays: DelayMap = HashMap::from([("f".into(), Delay::Unknown(2))]);
    let unit = build_unit(&graph, &delays).unwrap();
    assert_eq!(unit.delay, Delay::Unknown(4));
    // One handshake structure per call, nothing else.
    assert_eq!(buffers(&unit.graph), 2);
}

#[test]
fn exact_calls_need_no_handshake() {
    let mut graph = Graph::new("fastcall");
    {
        let mut builder = Builder::new(&mut graph);
        let x = builder.add_input("x", 32);
        let call = builder.add_call("g", &[x]);
        let result = builder.add_call_result(&call, 0, 32);
        builder.add_output("out", &result);
    }
    let delays: DelayMap = HashMap::from([("g".into(), Delay::Known(3))]);
    let unit = build_unit(&graph, &delays).unwrap();
    assert_eq!(unit.delay, Delay::Known(3));
    assert_eq!(buffers(&unit.graph), 0);
    assert_eq!(
        count_kind(&unit.graph, |k| matches!(k, NodeKind::CallDone { .. })),
        0
    );
}

#[test]
fn unrelated_schedules_resynchronize_through_buffers() {
    // A start-scheduled input combined with a call-completion-scheduled
    // result: the two share no calculation source, so both sides go
    // through buffers, never plain registers.
    let mut graph = Graph::new("unrelated");
    {
        let mut builder = Builder::new(&mut graph);
        let x = builder.add_input("x", 32);
        let y = builder.add_input("y", 32);
        let call = builder.add_call("f", &[x]);
        let result = builder.add_call_result(&call, 0, 32);
        let sum = builder.add_binary(BinaryOp::Add, &y, &result);
        builder.add_output("out", &sum);
    }
    let delays: DelayMap = HashMap::from([("f".into(), Delay::Unknown(1))]);
    let unit = build_unit(&graph, &delays).unwrap();

    let add = find(&unit.graph, |k| {
        matches!(
            k,
            NodeKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        )
    });
    let (lhs, rhs) = match &add.borrow().kind {
        NodeKind::Binary { lhs, rhs, .. } => (Rc::clone(lhs), Rc::clone(rhs)),
        _ => unreachable!(),
    };
    assert!(matches!(lhs.borrow().kind, NodeKind::Buffer { .. }));
    assert!(matches!(rhs.borrow().kind, NodeKind::Buffer { .. }));
}

#[test]
fn conflicting_shared_offsets_are_fatal() {
    // m sits at {start: 0, call: 0}; its sibling sits at {start: 1}. The
    // unified target demands +1 on the start source but 0 on the call
    // source, which no register chain can satisfy at once.
    let mut graph = Graph::new("conflict");
    {
        let mut builder = Builder::new(&mut graph);
        let x = builder.add_input("x", 32);
        let y = builder.add_input("y", 32);
        let call = builder.add_call("f", &[x]);
        let result = builder.add_call_result(&call, 0, 32);
        let m = builder.add_binary(BinaryOp::Add, &y, &result);
        let delayed_y = builder.add_register(&y, 1);
        let clash = builder.add_binary(BinaryOp::Add, &m, &delayed_y);
        builder.add_output("out", &clash);
    }
    let delays: DelayMap = HashMap::from([("f".into(), Delay::Unknown(1))]);
    let err = build_unit(&graph, &delays).unwrap_err();
    assert!(matches!(err, Error::ImpossibleSync { .. }));
}

#[test]
fn missing_callee_delay_is_reported() {
    let mut graph = Graph::new("orphan");
    {
        let mut builder = Builder::new(&mut graph);
        let x = builder.add_input("x", 32);
        let call = builder.add_call("nope", &[x]);
        let result = builder.add_call_result(&call, 0, 32);
        builder.add_output("out", &result);
    }
    let err = build_unit(&graph, &DelayMap::new()).unwrap_err();
    assert!(matches!(err, Error::UndefinedCallee(_)));
}

#[test]
fn reserved_port_names_are_rejected() {
    let mut graph = Graph::new("clash");
    {
        let mut builder = Builder::new(&mut graph);
        let x = builder.add_input("start", 1);
        builder.add_output("out", &x);
    }
    let err = build_unit(&graph, &DelayMap::new()).unwrap_err();
    assert!(matches!(err, Error::MalformedGraph(_)));
}

#[test]
fn failing_units_do_not_stop_their_siblings() {
    let mut bad = Graph::new("bad");
    {
        let mut builder = Builder::new(&mut bad);
        let x = builder.add_input("x", 32);
        let call = builder.add_call("missing", &[x]);
        let result = builder.add_call_result(&call, 0, 32);
        builder.add_output("out", &result);
    }
    let mut good = Graph::new("good");
    {
        let mut builder = Builder::new(&mut good);
        let x = builder.add_input("x", 32);
        let y = builder.add_register(&x, 1);
        builder.add_output("out", &y);
    }
    let results = build_units(&[bad, good], &DelayMap::new());
    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_err());
    let good = results[1].1.as_ref().unwrap();
    assert_eq!(good.delay, Delay::Known(1));
}

#[test]
fn unit_delays_feed_forward_into_callers() {
    let helper = chain(2, 1); // Known(2), named "chain"
    let mut caller = Graph::new("caller");
    {
        let mut builder = Builder::new(&mut caller);
        let x = builder.add_input("x", 32);
        let call = builder.add_call("chain", &[x]);
        let result = builder.add_call_result(&call, 0, 32);
        builder.add_output("out", &result);
    }
    let results = build_units(&[helper, caller], &DelayMap::new());
    assert_eq!(results[0].1.as_ref().unwrap().delay, Delay::Known(2));
    assert_eq!(results[1].1.as_ref().unwrap().delay, Delay::Known(2));
}

#[test]
fn boundary_signals_are_exposed() {
    let unit = build_unit(&chain(1, 1), &DelayMap::new()).unwrap();
    assert!(unit.graph.find("clk").is_some());
    assert!(unit.graph.find("start").is_some());
    let done = unit.graph.get("done");
    assert!(matches!(done.borrow().kind, NodeKind::Output { .. }));
}
