//! Notebook step parser
//!
//! Splits a notebook in jupytext "light" Python form into numbered steps
//! without executing anything.
//!
//! A step starts at either marker form:
//!
//! ```text
//! # + tags=["same_step_1"]
//! # SAME-step-1
//! ```
//!
//! Code before the first marker belongs to step 0. Cells without a step tag
//! continue the current step. Simple assignments in a cell tagged
//! `parameters` become pipeline parameters instead of step code.

use indexmap::IndexMap;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, trace};

static STEP_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*SAME-step-(\d+)\s*$").expect("valid regex"));

/// `# +` alone or followed by cell metadata: `tags=[...]`, `key=value`,
/// `[markdown]` or a `{...}` block. Other `#+` comments are code.
static CELL_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^# \+(?:\s+(?:",
        r"tags\s*=\s*\[(?P<tags>[^\]]*)\].*|\{.*\}|\[\w+\].*|[A-Za-z_][\w.-]*=\S.*",
        r"))?\s*$",
    ))
    .expect("valid regex")
});

static STEP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^same_step_(\d+)$").expect("valid regex"));

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?P<value>.+?)\s*(?:#.*)?$")
        .expect("valid regex")
});

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:from|import)\s+(\w+(?:\s*,\s*\w+)*)").expect("valid regex")
});

/// Modules shipped with Python; never passed to pip
const STANDARD_LIBRARY: &[&str] = &[
    "abc", "argparse", "ast", "base64", "collections", "copy", "csv", "dataclasses", "datetime",
    "enum", "functools", "glob", "hashlib", "hmac", "io", "itertools", "json", "logging", "math",
    "os", "pathlib", "pickle", "random", "re", "shutil", "string", "subprocess", "sys",
    "tarfile", "tempfile", "time", "typing", "urllib", "uuid", "warnings", "zipfile",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotebookError {
    #[error("no steps found; mark cells with tags=[\"same_step_N\"] or a '# SAME-step-N' line")]
    NoSteps,

    #[error("step number '{0}' is out of range")]
    InvalidStep(String),
}

/// One pipeline step extracted from the notebook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub index: u32,
    pub code: String,
    /// Third-party modules imported by the step, sorted
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedNotebook {
    /// Steps in ascending index order
    pub steps: Vec<Step>,
    /// Values from the `parameters` cell, in file order
    pub parameters: IndexMap<String, String>,
}

/// Parse a notebook in jupytext light format
pub fn parse_notebook(source: &str) -> Result<ParsedNotebook, NotebookError> {
    let mut code: BTreeMap<u32, String> = BTreeMap::new();
    let mut parameters = IndexMap::new();
    let mut current_step = 0;
    let mut saw_marker = false;
    let mut in_parameters = false;

    for line in strip_front_matter(source) {
        if let Some(captures) = STEP_MARKER.captures(line) {
            current_step = parse_step_number(&captures[1])?;
            saw_marker = true;
            in_parameters = false;
            continue;
        }

        if let Some(captures) = CELL_HEADER.captures(line) {
            let tags = captures
                .name("tags")
                .map(|tags| parse_tags(tags.as_str()))
                .unwrap_or_default();
            in_parameters = tags.iter().any(|tag| tag == "parameters");
            for tag in &tags {
                if let Some(step) = STEP_TAG.captures(tag) {
                    current_step = parse_step_number(&step[1])?;
                    saw_marker = true;
                }
            }
            continue;
        }

        if line.trim() == "# -" {
            in_parameters = false;
            continue;
        }

        if in_parameters {
            if let Some(assignment) = ASSIGNMENT.captures(line) {
                let value = unquote(&assignment["value"]);
                trace!("Parameter {} = {}", &assignment["name"], value);
                parameters.insert(assignment["name"].to_string(), value);
            }
            continue;
        }

        let block = code.entry(current_step).or_default();
        block.push_str(line);
        block.push('\n');
    }

    if !saw_marker {
        return Err(NotebookError::NoSteps);
    }

    let steps: Vec<Step> = code
        .into_iter()
        .filter(|(index, code)| *index != 0 || !code.trim().is_empty())
        .map(|(index, code)| Step {
            index,
            packages: detect_packages(&code),
            code,
        })
        .collect();

    debug!(
        "Found {} step(s) and {} parameter(s)",
        steps.len(),
        parameters.len()
    );

    Ok(ParsedNotebook { steps, parameters })
}

/// Third-party top-level modules imported by `code`
pub fn detect_packages(code: &str) -> Vec<String> {
    let mut packages = BTreeSet::new();
    for captures in IMPORT.captures_iter(code) {
        for module in captures[1].split(',') {
            let module = module.trim();
            if !module.is_empty() && !STANDARD_LIBRARY.contains(&module) {
                packages.insert(module.to_string());
            }
        }
    }
    packages.into_iter().collect()
}

/// Skip the jupytext YAML header (`# ---` ... `# ---`) if present
fn strip_front_matter(source: &str) -> impl Iterator<Item = &str> {
    let lines: Vec<&str> = source.lines().collect();
    let first = lines.iter().position(|line| !line.trim().is_empty());

    let start = match first {
        Some(i) if lines[i].trim() == "# ---" => lines[i + 1..]
            .iter()
            .position(|line| line.trim() == "# ---")
            .map(|end| i + 1 + end + 1)
            .unwrap_or(0),
        _ => 0,
    };

    lines.into_iter().skip(start)
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|tag| unquote(tag.trim()))
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn parse_step_number(raw: &str) -> Result<u32, NotebookError> {
    raw.parse()
        .map_err(|_| NotebookError::InvalidStep(raw.to_string()))
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
