//! Implements a formatter for the in-memory representation of graphs. The
//! output is stable across runs and suitable for test assertions.

use crate::{ConstValue, Graph, Node, NodeKind, RRC};
use itertools::Itertools;
use std::io;

/// Printer for the IR.
pub struct Printer;

impl Printer {
    /// Render `graph` to `out`.
    pub fn write_graph<W: io::Write>(
        graph: &Graph,
        out: &mut W,
    ) -> io::Result<()> {
        Self::write_graph_at(graph, "unit", 0, out)
    }

    /// Render `graph` into a string. Convenience for tests and logging.
    pub fn graph_to_string(graph: &Graph) -> String {
        let mut buf = Vec::new();
        Self::write_graph(graph, &mut buf)
            .expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("printer emits utf-8")
    }

    fn write_graph_at<W: io::Write>(
        graph: &Graph,
        role: &str,
        level: usize,
        out: &mut W,
    ) -> io::Result<()> {
        let pad = "  ".repeat(level);
        writeln!(out, "{}{} {} {{", pad, role, graph.name)?;
        for node in graph.nodes.iter() {
            Self::write_node(node, level + 1, out)?;
        }
        if !graph.outputs.is_empty() {
            writeln!(
                out,
                "{}  expose {};",
                pad,
                graph
                    .outputs
                    .iter()
                    .map(|o| o.borrow().name().to_string())
                    .join(", ")
            )?;
        }
        writeln!(out, "{}}}", pad)
    }

    fn write_node<W: io::Write>(
        node: &RRC<Node>,
        level: usize,
        out: &mut W,
    ) -> io::Result<()> {
        let pad = "  ".repeat(level);
        let n = node.borrow();
        if let NodeKind::Loop {
            entries,
            body,
            condition,
        } = &n.kind
        {
            writeln!(
                out,
                "{}{} = loop({}) {{",
                pad,
                n.name(),
                entries
                    .iter()
                    .map(|e| e.initial.borrow().name().to_string())
                    .join(", ")
            )?;
            Self::write_graph_at(body, "body", level + 1, out)?;
            Self::write_graph_at(condition, "condition", level + 1, out)?;
            return writeln!(out, "{}}}", pad);
        }
        writeln!(
            out,
            "{}{} = {} : {};",
            pad,
            n.name(),
            Self::format_kind(&n),
            n.width
        )
    }

    fn format_kind(node: &Node) -> String {
        let name = |n: &RRC<Node>| n.borrow().name().to_string();
        match &node.kind {
            NodeKind::Input { index } => format!("input({})", index),
            NodeKind::Output { value } => format!("output({})", name(value)),
            NodeKind::Constant { value } => match value {
                ConstValue::Value(v) => format!("const({})", v),
                ConstValue::External(ext) => format!("external({})", ext),
                ConstValue::Undefined => "undefined".to_string(),
            },
            NodeKind::Unary { op, operand } => {
                format!("{}({})", op.as_str(), name(operand))
            }
            NodeKind::Binary { op, lhs, rhs } => {
                format!("{}({}, {})", op.as_str(), name(lhs), name(rhs))
            }
            NodeKind::Mux {
                cond,
                on_true,
                on_false,
            } => format!(
                "mux({}, {}, {})",
                name(cond),
                name(on_true),
                name(on_false)
            ),
            NodeKind::Call { callee, args } => format!(
                "call {}({})",
                callee,
                args.iter().map(name).join(", ")
            ),
            NodeKind::CallResult { producer, index } => {
                format!("result({}, {})", name(producer), index)
            }
            NodeKind::CallDone { call } => format!("done({})", name(call)),
            NodeKind::Loop { .. } => unreachable!("handled by write_node"),
            NodeKind::LoopResult { source, entry } => {
                format!("carried({}, {})", name(source), entry)
            }
            NodeKind::Register { input, delay } => {
                format!("register({}, {})", name(input), delay)
            }
            NodeKind::FeedbackRegister { driver } => match driver {
                Some(d) => format!("feedback(<- {})", name(&d.upgrade())),
                None => "feedback(<unsealed>)".to_string(),
            },
            NodeKind::Buffer {
                trigger,
                release,
                value,
                depth,
            } => format!(
                "buffer(trigger={}, release={}, value={}, depth={})",
                name(trigger),
                name(release),
                name(value),
                depth
            ),
        }
    }
}
