//! Netlist (`.bench`) parser.
//!
//! Three line kinds:
//!
//! ```text
//! INPUT( <signal> )
//! OUTPUT( <signal> )
//! <signal> = <gate_name> ( <in1> , <in2> , ... )
//! ```
//!
//! Gate names are lowercased and must exist in the library (checked here so
//! the line number is preserved). A `dff` net is diverted: its output
//! becomes a DFF Q signal, its first argument is recorded as the D data
//! input, and the line never reaches the combinational worklist.

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::netlist::diagnostic::render_error;
use crate::netlist::dlib::Library;
use crate::netlist::tokenizer::{tokenize, LineParser};

const KEEP_SEPARATORS: &str = "(),=";

/// Gate type that breaks combinational paths.
pub const DFF_GATE_NAME: &str = "dff";

/// One combinational net line: `out = gate(in, ...)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetLine {
    pub out: String,
    pub gate: String,
    pub ins: Vec<String>,
}

/// The parsed netlist.
#[derive(Clone, Debug, Default)]
pub struct Netlist {
    pub file: String,
    pub inputs: BTreeSet<String>,
    pub outputs: BTreeSet<String>,
    pub dff_outputs: BTreeSet<String>,
    pub dff_inputs: BTreeSet<String>,
    pub nets: Vec<NetLine>,
}

impl Netlist {
    /// Parse from a source string. Does not render diagnostics.
    pub fn parse_str(file: &str, source: &str, library: &Library) -> Result<Netlist> {
        let mut netlist = Netlist {
            file: file.to_string(),
            ..Netlist::default()
        };
        // Signals already claimed during the parse: inputs and DFF outputs.
        let mut defined: BTreeSet<String> = BTreeSet::new();

        for line in tokenize(source, KEEP_SEPARATORS) {
            let mut p = LineParser::new(file, &line);
            let head = p.word()?.clone();
            match head.text.as_str() {
                "INPUT" => {
                    let signal = parenthesized_signal(&mut p)?;
                    if defined.contains(&signal) {
                        return Err(Error::DuplicateSignal {
                            head: "input",
                            signal,
                            file: file.to_string(),
                        });
                    }
                    defined.insert(signal.clone());
                    netlist.inputs.insert(signal);
                }
                "OUTPUT" => {
                    let signal = parenthesized_signal(&mut p)?;
                    if netlist.outputs.contains(&signal) {
                        return Err(Error::DuplicateSignal {
                            head: "output",
                            signal,
                            file: file.to_string(),
                        });
                    }
                    netlist.outputs.insert(signal);
                }
                _ => {
                    parse_net(&mut p, head.text, library, &mut netlist, &mut defined)?;
                }
            }
        }
        Ok(netlist)
    }

    /// Parse from disk, rendering a source report on parse failure.
    pub fn parse_file(path: &Path, library: &Library) -> Result<Netlist> {
        let source = std::fs::read_to_string(path).map_err(|_| Error::File {
            path: path.display().to_string(),
        })?;
        let file = path.display().to_string();
        Netlist::parse_str(&file, &source, library).map_err(|e| {
            render_error(&e, &file, &source);
            e
        })
    }
}

fn parenthesized_signal(p: &mut LineParser<'_>) -> Result<String> {
    p.expect('(')?;
    let signal = p.word()?.text.clone();
    p.expect(')')?;
    p.finish()?;
    Ok(signal)
}

fn parse_net(
    p: &mut LineParser<'_>,
    out: String,
    library: &Library,
    netlist: &mut Netlist,
    defined: &mut BTreeSet<String>,
) -> Result<()> {
    p.expect('=')?;

    let gate_tok = p.word()?.clone();
    let gate = gate_tok.text.to_lowercase();
    if !library.contains(&gate) {
        return Err(Error::UnknownGate {
            gate,
            file: netlist.file.clone(),
            line: p.line_number(),
            span: gate_tok.span,
        });
    }

    p.expect('(')?;
    let mut ins = Vec::new();
    loop {
        ins.push(p.word()?.text.clone());
        match p.separator()? {
            ')' => break,
            ',' => continue,
            _ => return Err(p.unexpected_previous()),
        }
    }
    p.finish()?;

    if gate == DFF_GATE_NAME {
        if defined.contains(&out) {
            return Err(Error::DuplicateSignal {
                head: "node",
                signal: out,
                file: netlist.file.clone(),
            });
        }
        defined.insert(out.clone());
        netlist.dff_inputs.insert(ins[0].clone());
        netlist.dff_outputs.insert(out);
    } else {
        netlist.nets.push(NetLine { out, gate, ins });
    }
    Ok(())
}
