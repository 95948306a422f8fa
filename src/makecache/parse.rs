//! Parsing of make's printed database (`make -p -n`)

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Nesting limit for variable expansion, guards against self-references
const MAX_EXPANSION_DEPTH: usize = 16;

fn variable_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_.\-]+)\s*(?::{1,2}=|\+=|\?=|=)\s?(.*)$")
            .unwrap_or_else(|e| unreachable!("invalid variable regex: {e}"))
    })
}

/// Variables of one Makefile as printed by make
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MakeDatabase {
    variables: HashMap<String, String>,
}

impl MakeDatabase {
    /// Parse the output of `make -p -n`.
    ///
    /// Only the global variable section is read; target and pattern
    /// specific values live after the `# Files` header and are skipped
    /// together with `define` blocks.
    pub fn parse(output: &str) -> Self {
        let mut variables = HashMap::new();
        let mut in_define = false;

        for line in output.lines() {
            if line.starts_with("# Files") {
                break;
            }
            if in_define {
                if line.trim_end() == "endef" {
                    in_define = false;
                }
                continue;
            }
            if line.starts_with("define ") {
                in_define = true;
                continue;
            }
            if line.starts_with('#') || line.starts_with('\t') {
                continue;
            }
            if let Some(caps) = variable_line().captures(line) {
                variables.insert(caps[1].to_string(), caps[2].trim_end().to_string());
            }
        }

        Self { variables }
    }

    /// Raw, unexpanded value
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Whether `name` is defined
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Variable names, unordered
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Fully expanded value; undefined variables expand to nothing
    pub fn get(&self, name: &str) -> String {
        self.raw(name)
            .map(|value| self.expand(value))
            .unwrap_or_default()
    }

    /// Expand `$(VAR)`, `${VAR}` and `$$` references in `value`.
    ///
    /// Function calls such as `$(shell ...)` and automatic variables expand
    /// to nothing.
    pub fn expand(&self, value: &str) -> String {
        self.expand_depth(value, 0)
    }

    fn expand_depth(&self, value: &str, depth: usize) -> String {
        if depth > MAX_EXPANSION_DEPTH {
            return String::new();
        }

        let mut out = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            match after.chars().next() {
                None => {
                    out.push('$');
                    rest = "";
                }
                Some('$') => {
                    out.push('$');
                    rest = &after[1..];
                }
                Some(open @ ('(' | '{')) => {
                    let close = if open == '(' { ')' } else { '}' };
                    match find_close(after, open, close) {
                        Some(end) => {
                            out.push_str(&self.expand_reference(&after[1..end], depth));
                            rest = &after[end + 1..];
                        }
                        None => {
                            out.push_str(&rest[pos..]);
                            rest = "";
                        }
                    }
                }
                // Single-character and automatic variables
                Some(c) => {
                    if let Some(raw) = self.raw(c.encode_utf8(&mut [0; 4])) {
                        out.push_str(&self.expand_depth(raw, depth + 1));
                    }
                    rest = &after[c.len_utf8()..];
                }
            }
        }

        out.push_str(rest);
        out
    }

    fn expand_reference(&self, reference: &str, depth: usize) -> String {
        let name = self.expand_depth(reference, depth + 1);
        if name.contains(char::is_whitespace) || name.contains(',') {
            return String::new();
        }
        match self.raw(&name) {
            Some(raw) => self.expand_depth(raw, depth + 1),
            None => String::new(),
        }
    }
}

/// Index of the delimiter closing the one `value` starts with
fn find_close(value: &str, open: char, close: char) -> Option<usize> {
    let mut level = 0usize;
    for (i, c) in value.char_indices() {
        if c == open {
            level += 1;
        } else if c == close {
            level = level.saturating_sub(1);
            if level == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Split a command line into words the way a POSIX shell would, minus
/// expansions. Quotes group words and backslashes escape the next char.
pub fn shell_split(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    current.push(c);
                }
            }
            '"' => {
                in_word = true;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some(next @ ('"' | '\\' | '$' | '`')) => current.push(next),
                            Some(next) => {
                                current.push('\\');
                                current.push(next);
                            }
                            None => current.push('\\'),
                        },
                        c => current.push(c),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    words
}
