//! IR builder. Provides convenience methods to construct nodes inside a
//! graph with non-conflicting generated names.

use crate::{
    BinaryOp, ConstValue, Graph, LoopEntry, Node, NodeKind, Operands,
    UnaryOp, RRC, WRC,
};
use raceme_utils::Id;
use std::rc::Rc;

/// Graph builder. Owns a mutable borrow of the graph it extends.
pub struct Builder<'a> {
    pub graph: &'a mut Graph,
}

impl<'a> Builder<'a> {
    pub fn new(graph: &'a mut Graph) -> Self {
        Self { graph }
    }

    fn add_node<S: Into<Id>>(
        &mut self,
        prefix: S,
        width: u64,
        kind: NodeKind,
    ) -> RRC<Node> {
        let name = self.graph.generate_name(prefix);
        self.graph.add(Node::new(name, width, kind))
    }

    /// Declare a boundary input. The name is used verbatim.
    pub fn add_input<S: Into<Id>>(&mut self, name: S, width: u64) -> RRC<Node> {
        let name = name.into();
        self.graph.reserve_name(name);
        let index = self.graph.inputs.len();
        let node = self
            .graph
            .add(Node::new(name, width, NodeKind::Input { index }));
        self.graph.inputs.push(Rc::clone(&node));
        node
    }

    /// Declare a boundary output over `value`. The name is used verbatim.
    pub fn add_output<S: Into<Id>>(
        &mut self,
        name: S,
        value: &RRC<Node>,
    ) -> RRC<Node> {
        let name = name.into();
        self.graph.reserve_name(name);
        let width = value.borrow().width;
        let node = self.graph.add(Node::new(
            name,
            width,
            NodeKind::Output {
                value: Rc::clone(value),
            },
        ));
        self.graph.outputs.push(Rc::clone(&node));
        node
    }

    /// Return the constant node for `(value, width)`, building it if
    /// needed. Plain value constants are shared per graph.
    pub fn add_constant(
        &mut self,
        value: ConstValue,
        width: u64,
    ) -> RRC<Node> {
        let name: Id = match &value {
            ConstValue::Value(v) => format!("c{}_{}", v, width).into(),
            ConstValue::External(ext) => format!("ext_{}", ext).into(),
            ConstValue::Undefined => {
                return self.add_node(
                    "undef",
                    width,
                    NodeKind::Constant { value },
                )
            }
        };
        if let Some(existing) = self.graph.find(name) {
            return existing;
        }
        self.graph.reserve_name(name);
        self.graph
            .add(Node::new(name, width, NodeKind::Constant { value }))
    }

    pub fn add_unary(&mut self, op: UnaryOp, operand: &RRC<Node>) -> RRC<Node> {
        let width = operand.borrow().width;
        self.add_node(
            op.as_str(),
            width,
            NodeKind::Unary {
                op,
                operand: Rc::clone(operand),
            },
        )
    }

    pub fn add_binary(
        &mut self,
        op: BinaryOp,
        lhs: &RRC<Node>,
        rhs: &RRC<Node>,
    ) -> RRC<Node> {
        let width = if op.is_comparison() {
            1
        } else {
            lhs.borrow().width.max(rhs.borrow().width)
        };
        self.add_node(
            op.as_str(),
            width,
            NodeKind::Binary {
                op,
                lhs: Rc::clone(lhs),
                rhs: Rc::clone(rhs),
            },
        )
    }

    pub fn add_mux(
        &mut self,
        cond: &RRC<Node>,
        on_true: &RRC<Node>,
        on_false: &RRC<Node>,
    ) -> RRC<Node> {
        let width = on_true.borrow().width.max(on_false.borrow().width);
        self.add_node(
            "mux",
            width,
            NodeKind::Mux {
                cond: Rc::clone(cond),
                on_true: Rc::clone(on_true),
                on_false: Rc::clone(on_false),
            },
        )
    }

    /// An explicit delay of `delay` cycles.
    pub fn add_register(&mut self, input: &RRC<Node>, delay: u64) -> RRC<Node> {
        let width = input.borrow().width;
        self.add_node(
            "reg",
            width,
            NodeKind::Register {
                input: Rc::clone(input),
                delay,
            },
        )
    }

    pub fn add_buffer(
        &mut self,
        trigger: &RRC<Node>,
        release: &RRC<Node>,
        value: &RRC<Node>,
        depth: u64,
    ) -> RRC<Node> {
        let width = value.borrow().width;
        self.add_node(
            "buf",
            width,
            NodeKind::Buffer {
                trigger: Rc::clone(trigger),
                release: Rc::clone(release),
                value: Rc::clone(value),
                depth,
            },
        )
    }

    /// The argument bundle of a subroutine invocation. Result values are
    /// read through [Builder::add_call_result].
    pub fn add_call<S: Into<Id>>(
        &mut self,
        callee: S,
        args: &[RRC<Node>],
    ) -> RRC<Node> {
        let callee = callee.into();
        self.add_node(
            format!("call_{}", callee),
            0,
            NodeKind::Call {
                callee,
                args: args.iter().map(Rc::clone).collect::<Operands>(),
            },
        )
    }

    pub fn add_call_result(
        &mut self,
        producer: &RRC<Node>,
        index: usize,
        width: u64,
    ) -> RRC<Node> {
        self.add_node(
            "res",
            width,
            NodeKind::CallResult {
                producer: Rc::clone(producer),
                index,
            },
        )
    }

    /// The completion pulse of a data-dependent call.
    pub fn add_call_done(&mut self, call: &RRC<Node>) -> RRC<Node> {
        self.add_node(
            "call_done",
            1,
            NodeKind::CallDone {
                call: Rc::clone(call),
            },
        )
    }

    pub fn add_loop(
        &mut self,
        entries: Vec<LoopEntry>,
        body: Graph,
        condition: Graph,
    ) -> RRC<Node> {
        self.add_node(
            "loop",
            0,
            NodeKind::Loop {
                entries,
                body,
                condition,
            },
        )
    }

    pub fn add_loop_result(
        &mut self,
        source: &RRC<Node>,
        entry: usize,
        width: u64,
    ) -> RRC<Node> {
        self.add_node(
            "carried",
            width,
            NodeKind::LoopResult {
                source: Rc::clone(source),
                entry,
            },
        )
    }

    /// Create an unsealed feedback register. The returned
    /// [FeedbackBuilder] must be used to bind the driving edge once the
    /// cyclic substructure exists.
    pub fn add_feedback<S: Into<Id>>(
        &mut self,
        prefix: S,
        width: u64,
    ) -> (RRC<Node>, FeedbackBuilder) {
        let node = self.add_node(
            prefix,
            width,
            NodeKind::FeedbackRegister { driver: None },
        );
        let handle = FeedbackBuilder {
            node: Rc::clone(&node),
        };
        (node, handle)
    }
}

/// One-shot handle binding a feedback register to its driving edge. The
/// handle is consumed by [FeedbackBuilder::seal], so a register cannot be
/// driven twice and an unsealed register is visible to validation.
pub struct FeedbackBuilder {
    node: RRC<Node>,
}

impl FeedbackBuilder {
    /// Attach the driving edge, consuming the handle.
    pub fn seal(self, driver: &RRC<Node>) {
        let mut node = self.node.borrow_mut();
        match &mut node.kind {
            NodeKind::FeedbackRegister { driver: slot } => {
                debug_assert!(slot.is_none());
                *slot = Some(WRC::from(driver));
            }
            _ => unreachable!("feedback handle over a non-feedback node"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_shared() {
        let mut graph = Graph::new("g");
        let mut builder = Builder::new(&mut graph);
        let a = builder.add_constant(ConstValue::Value(4), 8);
        let b = builder.add_constant(ConstValue::Value(4), 8);
        let c = builder.add_constant(ConstValue::Value(4), 16);
        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn feedback_seal_is_one_shot() {
        let mut graph = Graph::new("g");
        let mut builder = Builder::new(&mut graph);
        let (fb, handle) = builder.add_feedback("state", 1);
        assert!(!fb.borrow().is_sealed());
        let one = builder.add_constant(ConstValue::Value(1), 1);
        handle.seal(&one);
        assert!(fb.borrow().is_sealed());
    }

    #[test]
    fn comparison_results_are_single_bit() {
        let mut graph = Graph::new("g");
        let mut builder = Builder::new(&mut graph);
        let a = builder.add_input("a", 32);
        let b = builder.add_input("b", 32);
        let lt = builder.add_binary(BinaryOp::Lt, &a, &b);
        let add = builder.add_binary(BinaryOp::Add, &a, &b);
        assert_eq!(lt.borrow().width, 1);
        assert_eq!(add.borrow().width, 32);
    }
}
