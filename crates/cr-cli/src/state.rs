//! On-disk state owned by the caller: the previous rendered list, the
//! version counter and the added/removed line lists.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Previous contents of an output file, if it exists.
pub fn read_previous(path: &Path) -> Result<Option<String>, String> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("Failed to read '{}': {}", path.display(), e)),
    }
}

/// Version counter of a published list: a plain integer (`7`) or a dotted
/// `major.minor.patch` (`1.0.7`). Bumping increments the last component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListVersion(Vec<u64>);

impl ListVersion {
    pub fn bump(&self) -> Self {
        let mut parts = self.0.clone();
        if let Some(last) = parts.last_mut() {
            *last = last.saturating_add(1);
        }
        ListVersion(parts)
    }
}

impl FromStr for ListVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid version '{}': {}", s.trim(), e))?;
        Ok(ListVersion(parts))
    }
}

impl fmt::Display for ListVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

/// Current value of a version counter file. A missing or unparsable file
/// counts as no version yet.
pub fn read_version(path: &Path) -> Result<Option<ListVersion>, String> {
    match read_previous(path)? {
        Some(text) => match text.parse::<ListVersion>() {
            Ok(version) => Ok(Some(version)),
            Err(e) => {
                log::warn!("ignoring version file '{}': {}", path.display(), e);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Fresh counters start at `1`.
pub fn next_version(current: Option<ListVersion>) -> ListVersion {
    match current {
        Some(version) => version.bump(),
        None => ListVersion(vec![1]),
    }
}

pub fn write_text(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
        }
    }
    fs::write(path, content)
        .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    Ok(())
}

/// `Clash/AD/EasyList.list` -> `Clash/AD/EasyList_added.txt`, `..._removed.txt`.
pub fn change_list_paths(output: &Path) -> (PathBuf, PathBuf) {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rules".to_string());
    (
        output.with_file_name(format!("{}_added.txt", stem)),
        output.with_file_name(format!("{}_removed.txt", stem)),
    )
}

pub fn write_lines(path: &Path, lines: &[String]) -> Result<(), String> {
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    write_text(path, &content)
}
