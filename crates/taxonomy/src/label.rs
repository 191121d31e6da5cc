use crate::error::{Result, TaxonomyError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// `Name [abcd1234][iso]-l-` with the ISO code and language marker optional.
static LABEL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>[^\[\]]+?)\s*\[(?P<code>[a-z0-9]{4}[0-9]{4})\](?:\[(?P<iso>[a-z]{3})\])?(?P<language>-l-)?$",
    )
    .expect("label pattern is a valid regex")
});

/// Decoded taxonomy node label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NodeLabel {
    /// Display name (e.g., "Indo-European")
    pub name: String,

    /// 8-character clade code (e.g., "indo1319")
    pub clade_code: String,

    /// 3-letter ISO code, when the node is an ISO-coded language
    pub iso_code: Option<String>,

    /// Set when the label carries the `-l-` language marker
    pub is_language: bool,
}

impl NodeLabel {
    pub fn new(name: impl Into<String>, clade_code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clade_code: clade_code.into(),
            iso_code: None,
            is_language: false,
        }
    }

    #[must_use]
    pub fn with_iso(mut self, iso: impl Into<String>) -> Self {
        self.iso_code = Some(iso.into());
        self
    }

    #[must_use]
    pub fn language(mut self) -> Self {
        self.is_language = true;
        self
    }

    /// Decode a raw label. Surrounding single quotes are ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let unquoted = trimmed
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .unwrap_or(trimmed);

        let caps = LABEL_PATTERN
            .captures(unquoted)
            .ok_or_else(|| TaxonomyError::format(format!("unrecognised node label '{raw}'")))?;

        Ok(Self {
            name: caps["name"].trim().to_string(),
            clade_code: caps["code"].to_string(),
            iso_code: caps.name("iso").map(|m| m.as_str().to_string()),
            is_language: caps.name("language").is_some(),
        })
    }

    /// Every identifier this node is indexed under: clade code first, then ISO code.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.clade_code.as_str()).chain(self.iso_code.as_deref())
    }

    /// Case-insensitive match against the display name or the clade code
    #[must_use]
    pub fn matches(&self, token: &str) -> bool {
        self.name.eq_ignore_ascii_case(token) || self.clade_code.eq_ignore_ascii_case(token)
    }
}

impl FromStr for NodeLabel {
    type Err = TaxonomyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.clade_code)?;
        if let Some(iso) = &self.iso_code {
            write!(f, "[{iso}]")?;
        }
        if self.is_language {
            f.write_str("-l-")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_family_label() {
        let label = NodeLabel::parse("Indo-European [indo1319]").unwrap();
        assert_eq!(label, NodeLabel::new("Indo-European", "indo1319"));
    }

    #[test]
    fn parses_language_label_with_iso_and_marker() {
        let label = NodeLabel::parse("'Standard English [stan1293][eng]-l-'").unwrap();
        assert_eq!(label.name, "Standard English");
        assert_eq!(label.clade_code, "stan1293");
        assert_eq!(label.iso_code.as_deref(), Some("eng"));
        assert!(label.is_language);
        assert_eq!(label.identifiers().collect::<Vec<_>>(), vec!["stan1293", "eng"]);
    }

    #[test]
    fn display_round_trips_encoding() {
        let raw = "Old Norse [oldn1244][non]-l-";
        assert_eq!(NodeLabel::parse(raw).unwrap().to_string(), raw);
    }

    #[test]
    fn rejects_bad_codes() {
        for raw in [
            "English",
            "English [stan12]",
            "English [STAN1293]",
            "English [stan1293][en]",
            "[stan1293]",
        ] {
            let err = NodeLabel::parse(raw).unwrap_err();
            assert!(matches!(err, TaxonomyError::FormatError(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn matches_name_or_code_case_insensitively() {
        let label = NodeLabel::new("Germanic", "germ1287");
        assert!(label.matches("germanic"));
        assert!(label.matches("GERM1287"));
        assert!(!label.matches("Germ"));
    }
}
