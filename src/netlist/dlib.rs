//! Gate-library (`.dlib`) parser.
//!
//! Each non-empty line installs one delay arc:
//!
//! ```text
//! <gate_name> <in_pin> <out_pin> gauss ( <mean> , <sigma> )
//! <gate_name> <in_pin> <out_pin> const ( <mean> )
//! ```
//!
//! Means and sigmas must be non-negative; `sigma` squares into the variance
//! and `const` arcs carry variance 0 (floored to epsilon when read as a
//! distribution). Repeated lines for one gate accumulate arcs.

use std::collections::BTreeMap;
use std::path::Path;

use crate::circuit::gate::{Delay, Gate};
use crate::error::{Error, Result};
use crate::netlist::diagnostic::render_error;
use crate::netlist::tokenizer::{tokenize, LineParser};

const KEEP_SEPARATORS: &str = "(),";

/// The parsed gate library.
#[derive(Clone, Debug, Default)]
pub struct Library {
    gates: BTreeMap<String, Gate>,
}

impl Library {
    pub fn contains(&self, name: &str) -> bool {
        self.gates.contains_key(name)
    }

    pub fn gate(&self, name: &str) -> Option<&Gate> {
        self.gates.get(name)
    }

    pub fn gate_mut(&mut self, name: &str) -> Option<&mut Gate> {
        self.gates.get_mut(name)
    }

    pub fn gate_names(&self) -> impl Iterator<Item = &str> {
        self.gates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Parse from a source string. Does not render diagnostics.
    pub fn parse_str(file: &str, source: &str) -> Result<Library> {
        let mut library = Library::default();
        for line in tokenize(source, KEEP_SEPARATORS) {
            let mut p = LineParser::new(file, &line);
            parse_line(&mut p, &mut library)?;
        }
        Ok(library)
    }

    /// Parse from disk, rendering a source report on parse failure.
    pub fn parse_file(path: &Path) -> Result<Library> {
        let source = std::fs::read_to_string(path).map_err(|_| Error::File {
            path: path.display().to_string(),
        })?;
        let file = path.display().to_string();
        Library::parse_str(&file, &source).map_err(|e| {
            render_error(&e, &file, &source);
            e
        })
    }
}

fn parse_line(p: &mut LineParser<'_>, library: &mut Library) -> Result<()> {
    let gate_name = p.word()?.text.clone();
    let input = p.word()?.text.clone();
    let output = p.word()?.text.clone();

    let kind = p.word()?.text.clone();
    if kind != "gauss" && kind != "const" {
        return Err(p.unexpected_previous());
    }

    p.expect('(')?;

    let mean = p.number()?;
    if mean < 0.0 {
        return Err(p.unexpected_previous());
    }

    let variance = if kind == "gauss" {
        p.expect(',')?;
        let sigma = p.number()?;
        if sigma < 0.0 {
            return Err(p.unexpected_previous());
        }
        sigma * sigma
    } else {
        0.0
    };

    p.expect(')')?;
    p.finish()?;

    library
        .gates
        .entry(gate_name.clone())
        .or_insert_with(|| Gate::new(gate_name))
        .set_delay(input, output, Delay { mean, variance });
    Ok(())
}
