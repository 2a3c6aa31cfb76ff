//! Key/value settings documents
//!
//! Two dialects share one structure:
//! - `Env`: `KEY=value` lines (application settings)
//! - `Postgres`: `key = 'value'` lines (`postgresql.auto.conf`)
//!
//! Comments, blank lines, ordering and untouched entries are written back
//! exactly as read. Only entries set through `set` are re-rendered.

/// Dialect of a settings document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Env,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry {
        key: String,
        value: String,
        /// Original text; `None` once the entry has been changed.
        raw: Option<String>,
    },
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueDocument {
    style: Style,
    lines: Vec<Line>,
}

impl KeyValueDocument {
    pub fn parse(text: &str, style: Style) -> Self {
        let lines = text
            .lines()
            .map(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return Line::Other(line.to_string());
                }
                match trimmed.split_once('=') {
                    Some((key, value)) if !key.trim().is_empty() => Line::Entry {
                        key: key.trim().to_string(),
                        value: unquote(value.trim(), style),
                        raw: Some(line.to_string()),
                    },
                    _ => Line::Other(line.to_string()),
                }
            })
            .collect();
        Self { style, lines }
    }

    /// Value of `key`. The last occurrence wins, as for both consumers.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set `key`, replacing the last occurrence and dropping earlier ones,
    /// or appending when absent.
    pub fn set(&mut self, key: &str, value: &str) {
        let positions: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| matches!(l, Line::Entry { key: k, .. } if k == key))
            .map(|(i, _)| i)
            .collect();

        let entry = Line::Entry {
            key: key.to_string(),
            value: value.to_string(),
            raw: None,
        };

        match positions.split_last() {
            Some((&last, earlier)) => {
                self.lines[last] = entry;
                for &i in earlier.iter().rev() {
                    self.lines.remove(i);
                }
            }
            None => self.lines.push(entry),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Other(raw) | Line::Entry { raw: Some(raw), .. } => out.push_str(raw),
                Line::Entry { key, value, raw: None } => {
                    out.push_str(&render_entry(key, value, self.style))
                }
            }
            out.push('\n');
        }
        out
    }
}

fn unquote(value: &str, style: Style) -> String {
    match style {
        Style::Env => {
            let stripped = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
            stripped.unwrap_or(value).to_string()
        }
        Style::Postgres => match value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            Some(inner) => inner.replace("''", "'"),
            None => value.to_string(),
        },
    }
}

fn render_entry(key: &str, value: &str, style: Style) -> String {
    match style {
        Style::Env => {
            if value.chars().any(|c| c.is_whitespace() || c == '#' || c == '"') {
                format!("{}=\"{}\"", key, value.replace('"', "\\\""))
            } else {
                format!("{}={}", key, value)
            }
        }
        Style::Postgres => format!("{} = '{}'", key, value.replace('\'', "''")),
    }
}
