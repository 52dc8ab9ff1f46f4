//! The pipeline-timing engine.
//!
//! Takes a clock-free dataflow graph (see [raceme_ir]) and rewrites it into
//! a cycle-accurate synchronous pipeline. Every translated value is proven
//! to be available at an exact, or provably-bounded, offset relative to one
//! or more calculation sources (the unit's start pulse, a loop's step
//! pulse, a call's completion pulse). Divergent timings are reconciled by
//! the synchronizer with plain delay registers where an exact correction
//! exists, and with elastic handshake buffers where the dependency is
//! data-dependent.
//!
//! The engine runs as a single-threaded, single-pass rewrite: each input
//! node is translated at most once, loops and calls are expanded into
//! explicit state machines on first encounter, and all caches are scoped to
//! one [build_unit] invocation.

mod build;
mod delay;
mod expand;
mod source;
mod sync;
mod timeline;

pub use build::{build_unit, build_units, DelayMap, PipelinedUnit};
pub use delay::Delay;
pub use source::{CalcSource, SourceId, SourceKind, SourceTable};
pub use timeline::{Timed, Timeline, TimelineId};

/// Maximum number of in-flight tokens an elastic buffer may hold. Bounds
/// the concurrency of slow operations; exceeding it is a backpressure
/// condition handled by the code generator.
pub const BUFFER_DEPTH: u64 = 4;
