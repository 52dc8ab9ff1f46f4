//! JSON description of compilation units, consumed by the `raceme` binary
//! so the engine can be driven without the external bytecode frontend.
//!
//! Nodes must be listed in topological order: every `args` entry names an
//! input or an earlier node of the same (sub)graph. Loop bodies and
//! conditions are closed over their carried entries and cannot reference
//! the surrounding graph.

use itertools::Itertools;
use raceme_ir::{
    BinaryOp, Builder, ConstValue, Graph, LoopEntry, Node, UnaryOp, RRC,
};
use raceme_pipeline::{Delay, DelayMap};
use raceme_utils::{bits_needed_for, Error, Id, RacemeResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitsFile {
    /// Delays of external callees, folded into the delay map before any
    /// unit is compiled.
    #[serde(default)]
    pub delays: HashMap<String, DelayDef>,
    pub units: Vec<UnitDef>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DelayDef {
    Known { cycles: u64 },
    Unknown { min: u64 },
}

impl From<&DelayDef> for Delay {
    fn from(def: &DelayDef) -> Delay {
        match def {
            DelayDef::Known { cycles } => Delay::Known(*cycles),
            DelayDef::Unknown { min } => Delay::Unknown(*min),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitDef {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<PortDef>,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    pub outputs: Vec<OutputDef>,
}

#[derive(Deserialize)]
pub struct PortDef {
    pub name: String,
    pub width: u64,
}

#[derive(Deserialize)]
pub struct OutputDef {
    pub name: String,
    pub value: String,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SubgraphDef {
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    /// For condition subgraphs: the node whose value decides the exit.
    pub output: Option<String>,
}

#[derive(Deserialize)]
pub struct EntryDef {
    /// Name of the surrounding-graph node entering the loop.
    pub initial: String,
    /// Input name the body subgraph sees the carried value under.
    pub body: String,
    /// Input name the condition subgraph sees the carried value under.
    pub condition: String,
    /// Body node producing the next carried value.
    pub next: String,
    pub width: u64,
}

#[derive(Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub value: Option<u64>,
    pub external: Option<String>,
    pub width: Option<u64>,
    pub delay: Option<u64>,
    pub callee: Option<String>,
    pub index: Option<usize>,
    pub entry: Option<usize>,
    pub entries: Option<Vec<EntryDef>>,
    pub body: Option<SubgraphDef>,
    pub condition: Option<SubgraphDef>,
}

/// Parse a units file into graphs plus the external delay map.
pub fn load_units(text: &str) -> RacemeResult<(Vec<Graph>, DelayMap)> {
    let file: UnitsFile = serde_json::from_str(text)?;
    let delays: DelayMap = file
        .delays
        .iter()
        .map(|(name, def)| (Id::from(name), Delay::from(def)))
        .collect();
    let units = file
        .units
        .iter()
        .map(build_graph)
        .collect::<RacemeResult<Vec<_>>>()?;
    Ok((units, delays))
}

fn build_graph(def: &UnitDef) -> RacemeResult<Graph> {
    let mut graph = Graph::new(&def.name);
    let mut builder = Builder::new(&mut graph);
    let mut env: HashMap<&str, RRC<Node>> = HashMap::new();
    for port in &def.inputs {
        let node = builder.add_input(&port.name, port.width);
        env.insert(&port.name, node);
    }
    for node in &def.nodes {
        add_node(&mut builder, &mut env, node)?;
    }
    for output in &def.outputs {
        let value = lookup(&env, &output.value, &def.name)?;
        builder.add_output(&output.name, &value);
    }
    drop(builder);
    Ok(graph)
}

fn lookup(
    env: &HashMap<&str, RRC<Node>>,
    name: &str,
    context: &str,
) -> RacemeResult<RRC<Node>> {
    env.get(name).map(Rc::clone).ok_or_else(|| {
        Error::malformed_graph(format!(
            "`{}` names no earlier node in `{}`",
            name, context
        ))
    })
}

fn binary_op(op: &str) -> Option<BinaryOp> {
    Some(match op {
        "add" => BinaryOp::Add,
        "sub" => BinaryOp::Sub,
        "mul" => BinaryOp::Mul,
        "div" => BinaryOp::Div,
        "rem" => BinaryOp::Rem,
        "and" => BinaryOp::And,
        "or" => BinaryOp::Or,
        "xor" => BinaryOp::Xor,
        "shl" => BinaryOp::Shl,
        "shr" => BinaryOp::Shr,
        "eq" => BinaryOp::Eq,
        "neq" => BinaryOp::Neq,
        "lt" => BinaryOp::Lt,
        "le" => BinaryOp::Le,
        "gt" => BinaryOp::Gt,
        "ge" => BinaryOp::Ge,
        _ => return None,
    })
}

fn add_node<'d>(
    builder: &mut Builder,
    env: &mut HashMap<&'d str, RRC<Node>>,
    def: &'d NodeDef,
) -> RacemeResult<()> {
    let field = |value: Option<u64>, what: &str| {
        value.ok_or_else(|| {
            Error::malformed_graph(format!(
                "node `{}` ({}) is missing `{}`",
                def.name, def.op, what
            ))
        })
    };
    let node = match def.op.as_str() {
        "const" => {
            let value = field(def.value, "value")?;
            let width = def.width.unwrap_or_else(|| bits_needed_for(value));
            builder.add_constant(ConstValue::Value(value), width)
        }
        "external" => {
            let ext = def.external.as_deref().ok_or_else(|| {
                Error::malformed_graph(format!(
                    "external constant `{}` is missing `external`",
                    def.name
                ))
            })?;
            let width = field(def.width, "width")?;
            builder.add_constant(ConstValue::External(ext.into()), width)
        }
        "undefined" => {
            let width = field(def.width, "width")?;
            builder.add_constant(ConstValue::Undefined, width)
        }
        "not" | "neg" => {
            let operand = args(env, def, 1)?.remove(0);
            let op = if def.op == "not" {
                UnaryOp::Not
            } else {
                UnaryOp::Neg
            };
            builder.add_unary(op, &operand)
        }
        "mux" => {
            let (cond, on_true, on_false) = args(env, def, 3)?
                .into_iter()
                .collect_tuple()
                .expect("arity checked");
            builder.add_mux(&cond, &on_true, &on_false)
        }
        "register" => {
            let input = args(env, def, 1)?.remove(0);
            builder.add_register(&input, field(def.delay, "delay")?)
        }
        "call" => {
            let callee = def.callee.as_deref().ok_or_else(|| {
                Error::malformed_graph(format!(
                    "call `{}` is missing `callee`",
                    def.name
                ))
            })?;
            let call_args = def
                .args
                .iter()
                .map(|a| lookup(env, a, &def.name))
                .collect::<RacemeResult<Vec<_>>>()?;
            builder.add_call(callee, &call_args)
        }
        "result" => {
            let producer = args(env, def, 1)?.remove(0);
            builder.add_call_result(
                &producer,
                def.index.unwrap_or(0),
                field(def.width, "width")?,
            )
        }
        "carried" => {
            let source = args(env, def, 1)?.remove(0);
            let entry = def.entry.ok_or_else(|| {
                Error::malformed_graph(format!(
                    "node `{}` (carried) is missing `entry`",
                    def.name
                ))
            })?;
            builder.add_loop_result(&source, entry, field(def.width, "width")?)
        }
        "loop" => build_loop(builder, env, def)?,
        op => {
            let Some(op) = binary_op(op) else {
                return Err(Error::malformed_graph(format!(
                    "node `{}` has unknown op `{}`",
                    def.name, def.op
                )));
            };
            let (lhs, rhs) = args(env, def, 2)?
                .into_iter()
                .collect_tuple()
                .expect("arity checked");
            builder.add_binary(op, &lhs, &rhs)
        }
    };
    env.insert(&def.name, node);
    Ok(())
}

fn args(
    env: &HashMap<&str, RRC<Node>>,
    def: &NodeDef,
    arity: usize,
) -> RacemeResult<Vec<RRC<Node>>> {
    if def.args.len() != arity {
        return Err(Error::malformed_graph(format!(
            "node `{}` ({}) wants {} argument(s), got {}",
            def.name,
            def.op,
            arity,
            def.args.len()
        )));
    }
    def.args
        .iter()
        .map(|a| lookup(env, a, &def.name))
        .collect()
}

fn build_loop<'d>(
    builder: &mut Builder,
    env: &mut HashMap<&'d str, RRC<Node>>,
    def: &'d NodeDef,
) -> RacemeResult<RRC<Node>> {
    let entries = def.entries.as_deref().ok_or_else(|| {
        Error::malformed_graph(format!(
            "loop `{}` is missing `entries`",
            def.name
        ))
    })?;
    let body_def = def.body.as_ref().ok_or_else(|| {
        Error::malformed_graph(format!("loop `{}` is missing `body`", def.name))
    })?;
    let cond_def = def.condition.as_ref().ok_or_else(|| {
        Error::malformed_graph(format!(
            "loop `{}` is missing `condition`",
            def.name
        ))
    })?;

    let mut body = Graph::new(format!("{}_body", def.name));
    let mut condition = Graph::new(format!("{}_condition", def.name));
    let mut body_env: HashMap<&str, RRC<Node>> = HashMap::new();
    let mut cond_env: HashMap<&str, RRC<Node>> = HashMap::new();
    {
        let mut body_builder = Builder::new(&mut body);
        let mut cond_builder = Builder::new(&mut condition);
        for entry in entries {
            let body_view = body_builder.add_input(&entry.body, entry.width);
            body_env.insert(&entry.body, body_view);
            let cond_view =
                cond_builder.add_input(&entry.condition, entry.width);
            cond_env.insert(&entry.condition, cond_view);
        }
        for node in &body_def.nodes {
            add_node(&mut body_builder, &mut body_env, node)?;
        }
        for node in &cond_def.nodes {
            add_node(&mut cond_builder, &mut cond_env, node)?;
        }
        let exit_name = cond_def.output.as_deref().ok_or_else(|| {
            Error::malformed_graph(format!(
                "loop `{}` condition is missing `output`",
                def.name
            ))
        })?;
        let exit_value = lookup(&cond_env, exit_name, &def.name)?;
        cond_builder.add_output("exit", &exit_value);
    }

    let entries = entries
        .iter()
        .map(|entry| {
            Ok(LoopEntry {
                initial: lookup(env, &entry.initial, &def.name)?,
                body_view: lookup(&body_env, &entry.body, &def.name)?,
                cond_view: lookup(&cond_env, &entry.condition, &def.name)?,
                next: lookup(&body_env, &entry.next, &def.name)?,
            })
        })
        .collect::<RacemeResult<Vec<_>>>()?;
    Ok(builder.add_loop(entries, body, condition))
}
