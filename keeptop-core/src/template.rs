//! Checkpoint path templates.
//!
//! Templates use `{name}` placeholders filled from the displayed epoch and the
//! epoch's metric logs, e.g. `weights.{epoch:02d}-{val_loss:.2f}.ckpt`. An
//! `_{epoch}` suffix is always inserted before the extension so every epoch
//! writes to its own file.

use crate::error::CheckpointError;
use crate::policy::EpochLogs;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spec {
    Plain,
    Int { width: usize, zero_pad: bool },
    Fixed { precision: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { name: String, spec: Spec },
}

#[derive(Clone, Copy)]
enum Value {
    Int(usize),
    Float(f64),
}

/// A parsed, epoch-distinct path template.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse `template` after inserting the `_{epoch}` suffix.
    pub fn new(template: &str) -> Result<Self, CheckpointError> {
        let source = with_epoch_suffix(template);
        let segments = parse(&source)?;
        Ok(Self { source, segments })
    }

    /// The template actually rendered, including the epoch suffix.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render the destination path for `epoch` (already 1-based).
    pub fn render(&self, epoch: usize, logs: &EpochLogs) -> Result<PathBuf, CheckpointError> {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { name, spec } => {
                    let value = if name == "epoch" {
                        Value::Int(epoch)
                    } else {
                        logs.get(name).copied().map(Value::Float).ok_or_else(|| {
                            CheckpointError::template(format!(
                                "placeholder '{name}' has no value in the epoch logs"
                            ))
                        })?
                    };
                    write_value(&mut out, name, value, *spec)?;
                }
            }
        }
        Ok(PathBuf::from(out))
    }
}

/// `dir/model.h5` -> `dir/model_{epoch}.h5`
fn with_epoch_suffix(template: &str) -> String {
    let tail_start = template
        .rfind(std::path::is_separator)
        .map(|i| i + 1)
        .unwrap_or(0);
    let tail = &template[tail_start..];
    // Leading dots do not start an extension, and a dot inside a
    // placeholder such as `{val_loss:.2f}` never does either.
    let split = match tail.rfind('.') {
        Some(i)
            if tail[..i].chars().any(|c| c != '.')
                && !tail[i..].contains(['{', '}']) =>
        {
            tail_start + i
        }
        _ => template.len(),
    };
    format!("{}_{{epoch}}{}", &template[..split], &template[split..])
}

fn parse(template: &str) -> Result<Vec<Segment>, CheckpointError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => {
                return Err(CheckpointError::template(format!(
                    "single '}}' in template '{template}'"
                )));
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => {
                            return Err(CheckpointError::template(format!(
                                "unterminated placeholder in template '{template}'"
                            )));
                        }
                        Some(ch) => field.push(ch),
                    }
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(parse_field(&field)?);
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn parse_field(field: &str) -> Result<Segment, CheckpointError> {
    let (name, spec) = match field.split_once(':') {
        Some((name, spec)) => (name, spec),
        None => (field, ""),
    };
    if name.is_empty() {
        return Err(CheckpointError::template("empty placeholder name"));
    }
    let spec = parse_spec(spec)
        .ok_or_else(|| CheckpointError::template(format!("unsupported format spec '{field}'")))?;
    Ok(Segment::Field {
        name: name.to_string(),
        spec,
    })
}

fn parse_spec(spec: &str) -> Option<Spec> {
    if spec.is_empty() {
        return Some(Spec::Plain);
    }
    if let Some(width) = spec.strip_suffix('d') {
        if width.is_empty() {
            return Some(Spec::Int {
                width: 0,
                zero_pad: false,
            });
        }
        let zero_pad = width.starts_with('0');
        return width.parse().ok().map(|width| Spec::Int { width, zero_pad });
    }
    if let Some(precision) = spec.strip_suffix('f') {
        if precision.is_empty() {
            return Some(Spec::Fixed { precision: 6 });
        }
        return precision
            .strip_prefix('.')?
            .parse()
            .ok()
            .map(|precision| Spec::Fixed { precision });
    }
    None
}

fn write_value(
    out: &mut String,
    name: &str,
    value: Value,
    spec: Spec,
) -> Result<(), CheckpointError> {
    let written = match (value, spec) {
        (Value::Int(v), Spec::Plain) => write!(out, "{v}"),
        (Value::Float(v), Spec::Plain) if v.is_finite() && v.fract() == 0.0 => write!(out, "{v:.1}"),
        (Value::Float(v), Spec::Plain) => write!(out, "{v}"),
        (Value::Int(v), Spec::Int { width, zero_pad: true }) => write!(out, "{v:0width$}"),
        (Value::Int(v), Spec::Int { width, zero_pad: false }) => write!(out, "{v:>width$}"),
        (Value::Float(_), Spec::Int { .. }) => {
            return Err(CheckpointError::template(format!(
                "placeholder '{name}' holds a real value and cannot use an integer format"
            )));
        }
        (Value::Int(v), Spec::Fixed { precision }) => write!(out, "{:.precision$}", v as f64),
        (Value::Float(v), Spec::Fixed { precision }) => write!(out, "{v:.precision$}"),
    };
    written.map_err(|e| CheckpointError::template(e.to_string()))
}
