//! Dataflow-graph representation shared by the raceme pipeline engine and
//! its collaborators.
//!
//! The same node vocabulary describes both sides of the engine: upstream
//! graphs use the clock-free subset (inputs, constants, operations, muxes,
//! calls, loops and explicit registers), while pipelined graphs additionally
//! contain feedback registers and elastic buffers. Nodes are reference
//! counted and edges are pointers rather than names, so translation passes
//! can key caches on identity.

mod builder;
mod common;
mod graph;
mod node;
mod printer;
mod validate;

pub use builder::{Builder, FeedbackBuilder};
pub use common::{rrc, RRC, WRC};
pub use graph::{Graph, IdList};
pub use node::{
    BinaryOp, ConstValue, LoopEntry, Node, NodeKind, Operands, UnaryOp,
};
pub use printer::Printer;
pub use raceme_utils::{GetName, Id};
pub use validate::validate;
