//! Node representation for raceme dataflow graphs.

use crate::{Graph, RRC, WRC};
use raceme_utils::{GetName, Id};
use smallvec::SmallVec;

/// Short list of forward operand edges.
pub type Operands = SmallVec<[RRC<Node>; 4]>;

/// Payload of a constant node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstValue {
    /// A compile-time fixed value.
    Value(u64),
    /// A constant defined outside the compiled design, referenced by name.
    External(Id),
    /// An explicitly undefined placeholder; the code generator may pick any
    /// encoding for it.
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "neg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::Eq => "eq",
            BinaryOp::Neq => "neq",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
        }
    }

    /// True for operators whose result is a single bit regardless of the
    /// operand widths.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Neq
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }
}

/// One loop-carried binding. `body_view` and `cond_view` are input nodes of
/// the nested body and condition graphs; both observe the same carried
/// value. `next` is the body-graph node producing the value carried into
/// the following iteration.
#[derive(Debug)]
pub struct LoopEntry {
    /// Value entering the loop from the surrounding graph.
    pub initial: RRC<Node>,
    /// Input node of the body graph bound to the carried value.
    pub body_view: RRC<Node>,
    /// Input node of the condition graph bound to the carried value.
    pub cond_view: RRC<Node>,
    /// Body-graph node producing the next carried value.
    pub next: RRC<Node>,
}

/// The closed set of node kinds. The pipeline engine dispatches on this
/// type with an exhaustive match, so adding a variant forces every
/// translation site to handle it.
#[derive(Debug)]
pub enum NodeKind {
    /// A boundary input of the enclosing graph.
    Input {
        index: usize,
    },
    /// A boundary output of the enclosing graph.
    Output {
        value: RRC<Node>,
    },
    Constant {
        value: ConstValue,
    },
    Unary {
        op: UnaryOp,
        operand: RRC<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: RRC<Node>,
        rhs: RRC<Node>,
    },
    /// Conditional merge of two values.
    Mux {
        cond: RRC<Node>,
        on_true: RRC<Node>,
        on_false: RRC<Node>,
    },
    /// Invocation of a named subroutine. The node itself is the argument
    /// bundle; values are read through [NodeKind::CallResult] views.
    Call {
        callee: Id,
        args: Operands,
    },
    /// The `index`-th result of a call. `producer` is the call node or, for
    /// data-dependent callees, the buffer wrapping it.
    CallResult {
        producer: RRC<Node>,
        index: usize,
    },
    /// The completion pulse of a call with data-dependent latency.
    CallDone {
        call: RRC<Node>,
    },
    /// A loop bundle with nested body and condition subgraphs.
    Loop {
        entries: Vec<LoopEntry>,
        body: Graph,
        condition: Graph,
    },
    /// The post-loop view of the `entry`-th carried value.
    LoopResult {
        source: RRC<Node>,
        entry: usize,
    },
    /// An explicit delay of `delay` clock cycles.
    Register {
        input: RRC<Node>,
        delay: u64,
    },
    /// A two-phase register: created without a driver, bound to exactly one
    /// driving edge later through [crate::FeedbackBuilder]. The driver edge
    /// is weak since it closes the only value cycle in a graph.
    FeedbackRegister {
        driver: Option<WRC<Node>>,
    },
    /// Bounded-concurrency, in-order handshake element. A token is opened
    /// whenever `trigger` fires, up to `depth` outstanding, and tokens are
    /// released in arrival order as `release` (the value's own completion
    /// pulse) fires.
    Buffer {
        trigger: RRC<Node>,
        release: RRC<Node>,
        value: RRC<Node>,
        depth: u64,
    },
}

/// A single value-producing node.
#[derive(Debug)]
pub struct Node {
    name: Id,
    /// Abstract signal width in bits. How structured values map onto bits
    /// is decided outside this crate.
    pub width: u64,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(name: Id, width: u64, kind: NodeKind) -> Self {
        Node { name, width, kind }
    }

    pub fn name(&self) -> Id {
        self.name
    }

    /// Short tag naming the node kind, used in diagnostics and printing.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Input { .. } => "input",
            NodeKind::Output { .. } => "output",
            NodeKind::Constant { .. } => "const",
            NodeKind::Unary { .. } => "unary",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Mux { .. } => "mux",
            NodeKind::Call { .. } => "call",
            NodeKind::CallResult { .. } => "result",
            NodeKind::CallDone { .. } => "calldone",
            NodeKind::Loop { .. } => "loop",
            NodeKind::LoopResult { .. } => "loopresult",
            NodeKind::Register { .. } => "register",
            NodeKind::FeedbackRegister { .. } => "feedback",
            NodeKind::Buffer { .. } => "buffer",
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant { .. })
    }

    /// True once a feedback register has been bound to its driver.
    pub fn is_sealed(&self) -> bool {
        match &self.kind {
            NodeKind::FeedbackRegister { driver } => driver.is_some(),
            _ => true,
        }
    }

    /// Forward operand edges of this node. The driver edge of a feedback
    /// register is a back edge and is deliberately excluded, so walking
    /// `operands` over any graph terminates.
    pub fn operands(&self) -> Operands {
        let mut ops = Operands::new();
        match &self.kind {
            NodeKind::Input { .. }
            | NodeKind::Constant { .. }
            | NodeKind::FeedbackRegister { .. } => {}
            NodeKind::Output { value } => ops.push(value.clone()),
            NodeKind::Unary { operand, .. } => ops.push(operand.clone()),
            NodeKind::Binary { lhs, rhs, .. } => {
                ops.push(lhs.clone());
                ops.push(rhs.clone());
            }
            NodeKind::Mux {
                cond,
                on_true,
                on_false,
            } => {
                ops.push(cond.clone());
                ops.push(on_true.clone());
                ops.push(on_false.clone());
            }
            NodeKind::Call { args, .. } => ops.extend(args.iter().cloned()),
            NodeKind::CallResult { producer, .. } => {
                ops.push(producer.clone())
            }
            NodeKind::CallDone { call } => ops.push(call.clone()),
            NodeKind::Loop { entries, .. } => {
                ops.extend(entries.iter().map(|e| e.initial.clone()))
            }
            NodeKind::LoopResult { source, .. } => ops.push(source.clone()),
            NodeKind::Register { input, .. } => ops.push(input.clone()),
            NodeKind::Buffer {
                trigger,
                release,
                value,
                ..
            } => {
                ops.push(trigger.clone());
                ops.push(release.clone());
                ops.push(value.clone());
            }
        }
        ops
    }
}

impl GetName for Node {
    fn name(&self) -> Id {
        self.name
    }
}
