//! Upstream list header metadata
//!
//! Filter lists announce their provenance in leading comments:
//!
//! ```text
//! ! Title: EasyList
//! ! Version: 202501011000
//! ! Last modified: 01 Jan 2025 10:00 UTC
//! ```
//!
//! Clash rule lists use `#` comments instead (`# 更新时间：…` for ACL4SSR,
//! `# UPDATED: …` for blackmatrix7). Only the header block is scanned.

const MAX_HEADER_LINES: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMetadata {
    pub title: Option<String>,
    pub version: Option<String>,
    pub last_modified: Option<String>,
}

impl ListMetadata {
    pub fn scan(text: &str) -> Self {
        let mut meta = ListMetadata::default();
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        for line in text.lines().take(MAX_HEADER_LINES) {
            let line = line.trim();
            if line.is_empty() || line.starts_with('[') {
                continue;
            }

            let body = match line.strip_prefix('!').or_else(|| line.strip_prefix('#')) {
                Some(body) => body.trim(),
                // First rule line ends the header
                None => break,
            };

            if let Some(value) = field(body, "Title") {
                meta.title.get_or_insert(value);
            } else if let Some(value) = field(body, "Version") {
                meta.version.get_or_insert(value);
            } else if let Some(value) = field(body, "Last modified")
                .or_else(|| field(body, "Last updated"))
                .or_else(|| field(body, "UPDATED"))
                .or_else(|| field(body, "更新时间"))
            {
                meta.last_modified.get_or_insert(value);
            }
        }

        meta
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.version.is_none() && self.last_modified.is_none()
    }

    /// Merge metadata from another URL of the same source, keeping what is
    /// already known.
    pub fn absorb(&mut self, other: ListMetadata) {
        if self.title.is_none() {
            self.title = other.title;
        }
        if self.version.is_none() {
            self.version = other.version;
        }
        if self.last_modified.is_none() {
            self.last_modified = other.last_modified;
        }
    }
}

/// `Name: value` or `Name：value` (full-width colon), name case-insensitive.
fn field(body: &str, name: &str) -> Option<String> {
    let head = body.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }

    let rest = body[name.len()..].trim_start();
    let value = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('：'))?
        .trim();

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_adblock_header() {
        let text = "[Adblock Plus 2.0]\n! Version: 202501011000\n! Title: EasyList\n! Last modified: 01 Jan 2025 10:00 UTC\n! Expires: 4 days\n||ads.com^\n! Version: ignored\n";
        let meta = ListMetadata::scan(text);
        assert_eq!(meta.title.as_deref(), Some("EasyList"));
        assert_eq!(meta.version.as_deref(), Some("202501011000"));
        assert_eq!(meta.last_modified.as_deref(), Some("01 Jan 2025 10:00 UTC"));
    }

    #[test]
    fn scans_clash_headers() {
        let acl = "# 内容：BanAD\n# 更新时间：2026年01月16日 12:51（北京时间）\nDOMAIN-SUFFIX,a.com\n";
        assert_eq!(
            ListMetadata::scan(acl).last_modified.as_deref(),
            Some("2026年01月16日 12:51（北京时间）")
        );

        let bm7 = "# NAME: OpenAI\n# UPDATED: 2025-01-02 03:04:05\nDOMAIN,openai.com\n";
        assert_eq!(ListMetadata::scan(bm7).last_modified.as_deref(), Some("2025-01-02 03:04:05"));
    }

    #[test]
    fn missing_header_is_empty() {
        assert!(ListMetadata::scan("0.0.0.0 ads.com\n").is_empty());
        assert!(ListMetadata::scan("").is_empty());
    }

    #[test]
    fn absorb_keeps_first_value() {
        let mut meta = ListMetadata {
            title: Some("A".to_string()),
            ..Default::default()
        };
        meta.absorb(ListMetadata {
            title: Some("B".to_string()),
            version: Some("2".to_string()),
            last_modified: None,
        });
        assert_eq!(meta.title.as_deref(), Some("A"));
        assert_eq!(meta.version.as_deref(), Some("2"));
    }
}
