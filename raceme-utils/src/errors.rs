use crate::Id;
use thiserror::Error;

/// A type alias for a result with an [Error] as the error type.
pub type RacemeResult<T> = Result<T, Error>;

/// Errors raised while retiming a unit. Every variant is fatal for the
/// enclosing compilation unit: no partial pipeline is ever emitted. The
/// multi-unit driver reports the failure and continues with sibling units.
#[derive(Error, Debug)]
pub enum Error {
    /// A delay-lattice case the engine does not cover, e.g. a callee whose
    /// delay was never computed to an exact or bounded value.
    #[error("unsupported delay combination: {0}")]
    UnsupportedDelay(String),

    /// An IR node kind the engine does not know how to retime.
    #[error("cannot retime node `{node}` of kind `{kind}`")]
    UnsupportedNode { node: Id, kind: &'static str },

    /// Two values share a calculation source but no single additive
    /// correction reconciles all shared sources at once. The values
    /// originate from mutually incompatible control contexts.
    #[error("cannot synchronize `{node}`: {reason}")]
    ImpossibleSync { node: Id, reason: String },

    /// A timeline with no contributing source was asked for its done
    /// signal. Internal invariant violation.
    #[error("done signal queried on a timeline with no contributing source (near `{0}`)")]
    EmptySource(Id),

    /// The input graph violates a structural precondition.
    #[error("malformed graph: {0}")]
    MalformedGraph(String),

    /// A call names a subroutine with no entry in the delay map.
    #[error("no delay known for callee `{0}`")]
    UndefinedCallee(Id),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid unit description: {0}")]
    InvalidFormat(#[from] serde_json::Error),
}

impl Error {
    pub fn unsupported_delay<S: ToString>(msg: S) -> Self {
        Error::UnsupportedDelay(msg.to_string())
    }

    pub fn unsupported_node(node: Id, kind: &'static str) -> Self {
        Error::UnsupportedNode { node, kind }
    }

    pub fn impossible_sync<S: ToString>(node: Id, reason: S) -> Self {
        Error::ImpossibleSync {
            node,
            reason: reason.to_string(),
        }
    }

    pub fn malformed_graph<S: ToString>(msg: S) -> Self {
        Error::MalformedGraph(msg.to_string())
    }
}
