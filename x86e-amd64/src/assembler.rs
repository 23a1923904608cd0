use std::collections::HashMap;
use std::fmt;

/// One instruction line as written in the source, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInstruction {
    /// Lowercased mnemonic.
    pub mnemonic: String,
    pub operands: Vec<String>,
    /// 1-based line number in the source text.
    pub line: usize,
}

impl fmt::Display for SourceInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonic)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.join(", "))?;
        }
        Ok(())
    }
}

/// Parsed assembly: directives, labels and the instruction stream. Labels
/// index into `instructions`, not into source lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    pub directives: HashMap<String, Vec<String>>,
    pub labels: HashMap<String, usize>,
    pub instructions: Vec<SourceInstruction>,
}

impl Program {
    /// Parses source text. Parsing never fails; lines it cannot make sense
    /// of become instructions and are rejected by the decoder.
    pub fn parse(source: &str) -> Program {
        let mut program = Program::default();

        for (idx, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || is_comment(line) {
                continue;
            }

            if let Some(directive) = line.strip_prefix('.') {
                let (name, args) = split_directive(directive);
                program.directives.insert(name, args);
                continue;
            }

            if let Some(label) = parse_label(line) {
                program
                    .labels
                    .insert(label.to_string(), program.instructions.len());
                continue;
            }

            program.instructions.push(parse_instruction(line, idx + 1));
        }

        tracing::debug!(
            "parsed {} instruction(s), {} label(s), {} directive(s)",
            program.instructions.len(),
            program.labels.len(),
            program.directives.len()
        );
        program
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    pub fn has_directive(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';')
}

fn split_directive(directive: &str) -> (String, Vec<String>) {
    let (name, rest) = match directive.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest),
        None => (directive, ""),
    };
    let args = rest
        .split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(String::from)
        .collect();
    (String::from(name), args)
}

// Everything before the first ':' names the label; the rest of the line is dropped.
fn parse_label(line: &str) -> Option<&str> {
    let code = line.split_once(';').map_or(line, |(code, _)| code);
    let (name, _) = code.split_once(':')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        None
    } else {
        Some(name)
    }
}

fn parse_instruction(line: &str, line_number: usize) -> SourceInstruction {
    let code = match line.split_once(';') {
        Some((code, _)) => code.trim_end(),
        None => line,
    };

    let (mnemonic, rest) = match code.split_once([' ', '\t']) {
        Some((mnemonic, rest)) => (mnemonic, rest.trim()),
        None => (code, ""),
    };

    let mut operands: Vec<String> = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(',').map(|op| String::from(op.trim())).collect()
    };
    if operands.last().map_or(false, |op| op.is_empty()) {
        operands.pop();
    }

    SourceInstruction {
        mnemonic: mnemonic.to_lowercase(),
        operands,
        line: line_number,
    }
}
