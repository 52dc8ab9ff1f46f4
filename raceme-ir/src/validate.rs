use crate::{Graph, NodeKind};
use petgraph::{algo, graph::DiGraph};
use raceme_utils::{Error, Id, RacemeResult};
use std::collections::HashMap;

/// Check the structural invariants of a graph:
///
/// - every operand edge resolves to a node registered in the same graph
///   (loop bodies and conditions are their own graphs and are checked
///   recursively);
/// - the forward edge relation is acyclic. Feedback-register driver edges
///   are back edges by construction and do not participate;
/// - every feedback register has been sealed.
pub fn validate(graph: &Graph) -> RacemeResult<()> {
    let mut view: DiGraph<Id, ()> = DiGraph::new();
    let mut index = HashMap::new();
    for node in graph.nodes.iter() {
        let name = node.borrow().name();
        index.insert(name, view.add_node(name));
    }

    for node in graph.nodes.iter() {
        let n = node.borrow();
        if !n.is_sealed() {
            return Err(Error::malformed_graph(format!(
                "feedback register `{}` in `{}` was never sealed",
                n.name(),
                graph.name
            )));
        }
        let dst = index[&n.name()];
        for op in n.operands() {
            let op_name = op.borrow().name();
            match graph.find(op_name) {
                Some(resolved) if std::rc::Rc::ptr_eq(&resolved, &op) => {}
                _ => {
                    return Err(Error::malformed_graph(format!(
                        "`{}` in `{}` references `{}`, which is not a node \
                         of the same graph",
                        n.name(),
                        graph.name,
                        op_name
                    )))
                }
            }
            view.add_edge(index[&op_name], dst, ());
        }
        if let NodeKind::Loop {
            body, condition, ..
        } = &n.kind
        {
            validate(body)?;
            validate(condition)?;
        }
    }

    if algo::is_cyclic_directed(&view) {
        return Err(Error::malformed_graph(format!(
            "graph `{}` has a combinational cycle",
            graph.name
        )));
    }
    log::debug!(
        "validated graph `{}` ({} nodes)",
        graph.name,
        graph.nodes.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinaryOp, Builder, ConstValue, Graph};

    #[test]
    fn accepts_straightline_graph() {
        let mut graph = Graph::new("ok");
        let mut builder = Builder::new(&mut graph);
        let a = builder.add_input("a", 8);
        let c = builder.add_constant(ConstValue::Value(1), 8);
        let sum = builder.add_binary(BinaryOp::Add, &a, &c);
        builder.add_output("out", &sum);
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn rejects_unsealed_feedback() {
        let mut graph = Graph::new("bad");
        let mut builder = Builder::new(&mut graph);
        let (fb, _handle) = builder.add_feedback("state", 1);
        builder.add_output("out", &fb);
        let err = validate(&graph).unwrap_err();
        assert!(err.to_string().contains("never sealed"));
    }

    #[test]
    fn sealed_feedback_cycle_is_fine() {
        let mut graph = Graph::new("cycle");
        let mut builder = Builder::new(&mut graph);
        let (fb, handle) = builder.add_feedback("state", 1);
        let inv = builder.add_unary(crate::UnaryOp::Not, &fb);
        handle.seal(&inv);
        builder.add_output("out", &inv);
        assert!(validate(&graph).is_ok());
    }
}
