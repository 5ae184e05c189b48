//! Purpose: Load and update the gateway plugins' INI-like room configuration files.
//! Exports: `ConfigDocument`, `SectionUpdates`, `load`, `save`, `backup_path`,
//! `section_name_problem`, `key_problem`.
//! Role: The only code that reads or writes plugin config files on disk.
//! Invariants: Comment markers are translated only here (see `core::markers`).
//! Invariants: `save` never creates a file; it backs up the current one before writing.
//! Invariants: Unmodified lines (comments, blanks, entries) are written back verbatim.
//! Invariants: Every written section name, key, and value reloads as itself on one line.
//! Invariants: The backup is not a lock; concurrent writers from other processes can race.
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info};

use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::markers::{DISK_COMMENT, PARSER_COMMENT, to_disk_markers, to_parser_markers};

/// Section name -> key -> value, as supplied by callers of `save`.
pub type SectionUpdates = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Line {
    Entry {
        key: String,
        value: String,
        raw: Option<String>,
    },
    Comment(String),
    Blank(String),
}

impl Line {
    fn render(&self) -> String {
        match self {
            Line::Entry {
                raw: Some(raw), ..
            } => raw.clone(),
            Line::Entry { key, value, .. } => format!("{key} = {value}"),
            Line::Comment(text) | Line::Blank(text) => text.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Section {
    name: String,
    header: String,
    lines: Vec<Line>,
}

impl Section {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            header: format!("[{name}]"),
            lines: Vec::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    fn set(&mut self, key: &str, value: &str) {
        let existing = self
            .lines
            .iter()
            .rposition(|line| matches!(line, Line::Entry { key: k, .. } if k == key));
        match existing {
            Some(pos) => {
                if let Line::Entry {
                    value: current,
                    raw,
                    ..
                } = &mut self.lines[pos]
                {
                    if current.as_str() != value {
                        *current = value.to_string();
                        *raw = None;
                    }
                }
            }
            None => {
                // Keep trailing comments/blanks after the new entry.
                let at = self
                    .lines
                    .iter()
                    .rposition(|line| matches!(line, Line::Entry { .. }))
                    .map(|pos| pos + 1)
                    .unwrap_or(0);
                self.lines.insert(
                    at,
                    Line::Entry {
                        key: key.to_string(),
                        value: value.to_string(),
                        raw: None,
                    },
                );
            }
        }
    }

    fn entries(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for line in &self.lines {
            if let Line::Entry { key, value, .. } = line {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    }
}

/// Parsed config file. Text passed to `parse` and returned by `to_text` uses
/// the parser's comment marker; disk text goes through `load`/`save`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    preamble: Vec<Line>,
    sections: Vec<Section>,
}

impl ConfigDocument {
    pub fn parse(text: &str) -> ApiResult<Self> {
        let mut doc = ConfigDocument::default();
        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim();
            let parsed = if trimmed.is_empty() {
                Line::Blank(line.to_string())
            } else if trimmed.starts_with(PARSER_COMMENT) {
                Line::Comment(line.to_string())
            } else if trimmed.starts_with('[') {
                let name = parse_section_header(trimmed).ok_or_else(|| {
                    Error::new(ErrorKind::Corrupt)
                        .with_message(format!("malformed section header on line {line_no}"))
                })?;
                doc.sections.push(Section {
                    name,
                    header: line.to_string(),
                    lines: Vec::new(),
                });
                continue;
            } else {
                let (key, value) = parse_entry(trimmed).ok_or_else(|| {
                    Error::new(ErrorKind::Corrupt)
                        .with_message(format!("expected key = value on line {line_no}"))
                })?;
                if doc.sections.is_empty() {
                    return Err(Error::new(ErrorKind::Corrupt)
                        .with_message(format!("entry outside of any section on line {line_no}")));
                }
                Line::Entry {
                    key,
                    value,
                    raw: Some(line.to_string()),
                }
            };
            match doc.sections.last_mut() {
                Some(section) => section.lines.push(parsed),
                None => doc.preamble.push(parsed),
            }
        }
        Ok(doc)
    }

    pub fn to_text(&self) -> String {
        let mut lines: Vec<String> = self.preamble.iter().map(Line::render).collect();
        for section in &self.sections {
            lines.push(section.header.clone());
            lines.extend(section.lines.iter().map(Line::render));
        }
        if lines.is_empty() {
            return String::new();
        }
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.find(section).and_then(|s| s.get(key))
    }

    pub fn section(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.find(name).map(Section::entries)
    }

    /// Section -> key/value view; comments and blank lines are not included.
    pub fn to_map(&self) -> SectionUpdates {
        let mut out = SectionUpdates::new();
        for section in &self.sections {
            out.entry(section.name.clone())
                .or_default()
                .extend(section.entries());
        }
        out
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) -> ApiResult<()> {
        check_entry(section, key, value)?;
        self.set_checked(section, key, value);
        Ok(())
    }

    /// New sections are created; listed keys overwritten; everything else kept.
    /// Nothing is applied unless every section, key, and value is writable.
    pub fn merge(&mut self, updates: &SectionUpdates) -> ApiResult<()> {
        for (section, entries) in updates {
            check_section_name(section)?;
            for (key, value) in entries {
                check_entry(section, key, value)?;
            }
        }
        for (section, entries) in updates {
            if entries.is_empty() && self.find(section).is_none() {
                self.sections.push(Section::new(section));
            }
            for (key, value) in entries {
                self.set_checked(section, key, value);
            }
        }
        Ok(())
    }

    fn set_checked(&mut self, section: &str, key: &str, value: &str) {
        let index = match self.sections.iter().position(|s| s.name == section) {
            Some(index) => index,
            None => {
                self.sections.push(Section::new(section));
                self.sections.len() - 1
            }
        };
        self.sections[index].set(key, value);
    }

    fn find(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}

fn parse_section_header(trimmed: &str) -> Option<String> {
    let end = trimmed.find(']')?;
    let name = trimmed[1..end].trim();
    let rest = trimmed[end + 1..].trim();
    if name.is_empty() || !(rest.is_empty() || rest.starts_with(PARSER_COMMENT)) {
        return None;
    }
    Some(name.to_string())
}

/// Why `name` cannot be written as a section header that reloads as itself.
pub fn section_name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("section name is empty")
    } else if name.contains(['\n', '\r']) {
        Some("section name spans lines")
    } else if name.contains(']') {
        Some("section name contains ']'")
    } else if name.contains(DISK_COMMENT) {
        Some("section name contains the comment marker")
    } else if name.trim() != name {
        Some("section name has surrounding whitespace")
    } else {
        None
    }
}

/// Why `key` cannot be written as the key of a `key = value` line.
pub fn key_problem(key: &str) -> Option<&'static str> {
    if key.is_empty() {
        Some("key is empty")
    } else if key.contains(['\n', '\r']) {
        Some("key spans lines")
    } else if key.contains('=') {
        Some("key contains '='")
    } else if key.trim() != key {
        Some("key has surrounding whitespace")
    } else if key.contains(DISK_COMMENT) {
        Some("key contains the comment marker")
    } else if key.starts_with(['[', PARSER_COMMENT]) {
        Some("key starts like a header or comment")
    } else {
        None
    }
}

fn check_section_name(section: &str) -> ApiResult<()> {
    match section_name_problem(section) {
        Some(problem) => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("cannot write section {section:?}: {problem}"))),
        None => Ok(()),
    }
}

fn check_entry(section: &str, key: &str, value: &str) -> ApiResult<()> {
    check_section_name(section)?;
    let problem = key_problem(key).or_else(|| {
        value
            .contains(['\n', '\r'])
            .then_some("value spans lines")
    });
    match problem {
        Some(problem) => Err(Error::new(ErrorKind::Usage).with_message(format!(
            "cannot write {key:?} in section {section:?}: {problem}"
        ))),
        None => Ok(()),
    }
}

fn parse_entry(trimmed: &str) -> Option<(String, String)> {
    // `:` separates only on lines without `=`.
    let split = trimmed.find('=').or_else(|| trimmed.find(':'))?;
    let key = trimmed[..split].trim();
    if key.is_empty() {
        return None;
    }
    let value = trimmed[split + 1..].trim();
    Some((key.to_string(), value.to_string()))
}

pub fn load(path: &Path) -> ApiResult<ConfigDocument> {
    let raw = read_existing(path)?;
    ConfigDocument::parse(&to_parser_markers(&raw)).map_err(|err| err.with_path(path))
}

/// Merge `updates` into the file at `path`, returning the backup's path.
pub fn save(updates: &SectionUpdates, path: &Path) -> ApiResult<PathBuf> {
    save_at(updates, path, OffsetDateTime::now_utc())
}

pub(crate) fn save_at(
    updates: &SectionUpdates,
    path: &Path,
    now: OffsetDateTime,
) -> ApiResult<PathBuf> {
    let raw = read_existing(path)?;
    let mut doc =
        ConfigDocument::parse(&to_parser_markers(&raw)).map_err(|err| err.with_path(path))?;

    doc.merge(updates).map_err(|err| err.with_path(path))?;

    let backup = backup_path(path, now)?;
    fs::copy(path, &backup).map_err(|err| {
        Error::new(map_io_error_kind(&err))
            .with_message("failed to back up config file")
            .with_path(&backup)
            .with_source(err)
    })?;
    info!(path = %path.display(), backup = %backup.display(), "backed up config file");

    let text = to_disk_markers(&doc.to_text());
    write_replacing(path, &text)?;
    info!(path = %path.display(), sections = updates.len(), "updated config file");
    Ok(backup)
}

/// `<path>-<UTC timestamp>`, with `.N` appended if that name is taken.
pub fn backup_path(path: &Path, now: OffsetDateTime) -> ApiResult<PathBuf> {
    let format =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z");
    let stamp = now
        .to_offset(time::UtcOffset::UTC)
        .format(format)
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("backup timestamp format failed")
                .with_source(err)
        })?;
    let mut base = path.as_os_str().to_os_string();
    base.push(format!("-{stamp}"));
    let candidate = PathBuf::from(&base);
    if !candidate.exists() {
        return Ok(candidate);
    }
    let mut n = 1u32;
    loop {
        let mut name = base.clone();
        name.push(format!(".{n}"));
        let candidate = PathBuf::from(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
        n += 1;
    }
}

fn read_existing(path: &Path) -> ApiResult<String> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(raw),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::new(ErrorKind::NotFound)
            .with_message("config file does not exist")
            .with_path(path)
            .with_hint("Point the plugin config path at an existing file.")),
        Err(err) => Err(Error::new(map_io_error_kind(&err))
            .with_message("failed to read config file")
            .with_path(path)
            .with_source(err)),
    }
}

fn write_replacing(path: &Path, text: &str) -> ApiResult<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".roomsync-tmp");
    let tmp = PathBuf::from(tmp);
    debug!(tmp = %tmp.display(), "writing config file");

    let result = fs::write(&tmp, text)
        .and_then(|()| {
            let permissions = fs::metadata(path)?.permissions();
            fs::set_permissions(&tmp, permissions)
        })
        .and_then(|()| fs::rename(&tmp, path));
    result.map_err(|err| {
        let _ = fs::remove_file(&tmp);
        Error::new(map_io_error_kind(&err))
            .with_message("failed to write config file")
            .with_path(path)
            .with_source(err)
    })
}

fn map_io_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        _ => ErrorKind::Io,
    }
}
