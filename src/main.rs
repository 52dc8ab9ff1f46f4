//! The raceme driver: reads a JSON description of one or more units, runs
//! the pipeline-timing engine over them in forward order, and prints the
//! retimed graphs together with their summary delays.

mod json;

use argh::FromArgs;
use raceme_ir::Printer;
use raceme_pipeline::build_units;
use raceme_utils::RacemeResult;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

#[derive(FromArgs)]
/// Retime dataflow units into synchronous pipelines.
struct Opts {
    /// input file with the unit descriptions; stdin when omitted
    #[argh(positional)]
    file: Option<PathBuf>,

    /// write the pipelined graphs here instead of stdout
    #[argh(option, short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// only report errors
    #[argh(switch, short = 'q', long = "quiet")]
    quiet: bool,
}

fn main() {
    let opts: Opts = argh::from_env();
    let default_level = if opts.quiet { "error" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level),
    )
    .init();

    match run(&opts) {
        Ok(0) => {}
        Ok(failed) => {
            log::error!("{} unit(s) failed to compile", failed);
            std::process::exit(1);
        }
        Err(error) => {
            log::error!("{}", error);
            std::process::exit(1);
        }
    }
}

/// Compile everything, returning the number of failed units.
fn run(opts: &Opts) -> RacemeResult<usize> {
    let text = match &opts.file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let (units, delays) = json::load_units(&text)?;

    let mut out: Box<dyn Write> = match &opts.output {
        Some(path) => Box::new(fs::File::create(path)?),
        None => Box::new(io::stdout()),
    };

    let mut failed = 0;
    for (name, result) in build_units(&units, &delays) {
        match result {
            Ok(unit) => {
                writeln!(out, "// `{}` delay: {}", name, unit.delay)?;
                Printer::write_graph(&unit.graph, &mut out)?;
                writeln!(out)?;
            }
            // Already reported by build_units.
            Err(_) => failed += 1,
        }
    }
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::json::load_units;
    use raceme_pipeline::{build_units, Delay};

    const MAC: &str = r#"{
        "delays": { "slowdiv": { "kind": "unknown", "min": 2 } },
        "units": [
            {
                "name": "mac",
                "inputs": [
                    { "name": "a", "width": 32 },
                    { "name": "b", "width": 32 },
                    { "name": "c", "width": 32 }
                ],
                "nodes": [
                    { "name": "p", "op": "mul", "args": ["a", "b"] },
                    { "name": "pr", "op": "register", "args": ["p"], "delay": 2 },
                    { "name": "s", "op": "add", "args": ["pr", "c"] }
                ],
                "outputs": [ { "name": "out", "value": "s" } ]
            },
            {
                "name": "scaled",
                "inputs": [ { "name": "x", "width": 32 } ],
                "nodes": [
                    { "name": "q", "op": "call", "callee": "slowdiv", "args": ["x"] },
                    { "name": "q0", "op": "result", "args": ["q"], "width": 32 }
                ],
                "outputs": [ { "name": "out", "value": "q0" } ]
            }
        ]
    }"#;

    #[test]
    fn loads_and_compiles_units() {
        let (units, delays) = load_units(MAC).unwrap();
        assert_eq!(units.len(), 2);
        let results = build_units(&units, &delays);
        let mac = results[0].1.as_ref().unwrap();
        assert_eq!(mac.delay, Delay::Known(2));
        let scaled = results[1].1.as_ref().unwrap();
        assert_eq!(scaled.delay, Delay::Unknown(2));
    }

    #[test]
    fn rejects_dangling_references() {
        let text = r#"{
            "units": [ {
                "name": "broken",
                "inputs": [ { "name": "x", "width": 8 } ],
                "nodes": [ { "name": "y", "op": "add", "args": ["x", "ghost"] } ],
                "outputs": [ { "name": "out", "value": "y" } ]
            } ]
        }"#;
        let err = load_units(text).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
