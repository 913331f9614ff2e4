//! Output naming patterns shared by the fetch tool and the file selector.
//!
//! A [`NamingPattern`] is built from a list of [`Segment`]s. The same segment
//! list renders both the output template handed to the fetch tool and the
//! regular expression the selector uses to find what the tool wrote, so the
//! two cannot drift apart.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::Result;

/// Names the fetch tool uses while a file is still being written or merged.
static SCRATCH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\.(part|ytdl|temp)$|\.part-frag\d*$|\.temp\.[a-z0-9]+$|\.f\d+\.[a-z0-9]+$)")
        .unwrap()
});

/// Separator between a job discriminator and the rest of a filename.
pub(crate) const DISCRIMINATOR_SEPARATOR: &str = "__";

/// One piece of an output filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Fixed text.
    Literal(String),
    /// Playlist position, zero-padded to at least `width` digits.
    Index { width: usize },
    /// The remote item's title, as the fetch tool sanitizes it.
    Title,
    /// The container extension chosen by the fetch tool.
    Ext,
}

impl Segment {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    fn template(&self) -> String {
        match self {
            Self::Literal(text) => text.replace('%', "%%"),
            Self::Index { width } => format!("%(playlist_index)0{}d", width),
            Self::Title => "%(title)s".to_string(),
            Self::Ext => "%(ext)s".to_string(),
        }
    }

    fn regex(&self) -> String {
        match self {
            Self::Literal(text) => regex::escape(text),
            Self::Index { width } => format!(r"\d{{{},}}", width),
            Self::Title => ".+".to_string(),
            Self::Ext => "[A-Za-z0-9]+".to_string(),
        }
    }
}

/// A fetch-tool output template paired with the matcher derived from it.
#[derive(Debug, Clone)]
pub struct NamingPattern {
    prefix: String,
    segments: Vec<Segment>,
    matcher: Regex,
}

impl NamingPattern {
    /// Build a pattern, optionally prefixing every name with a job discriminator.
    pub fn new(discriminator: Option<&str>, segments: Vec<Segment>) -> Result<Self> {
        let prefix = discriminator
            .map(|d| format!("{}{}", d, DISCRIMINATOR_SEPARATOR))
            .unwrap_or_default();

        let mut expr = String::from("^");
        expr.push_str(&regex::escape(&prefix));
        for segment in &segments {
            expr.push_str(&segment.regex());
        }
        expr.push('$');

        let matcher = Regex::new(&expr)
            .map_err(|e| crate::Error::Other(format!("Invalid naming pattern {}: {}", expr, e)))?;

        Ok(Self {
            prefix,
            segments,
            matcher,
        })
    }

    /// `NN - <title>.<ext>`, the playlist item layout.
    pub fn playlist_item(discriminator: Option<&str>) -> Result<Self> {
        Self::new(
            discriminator,
            vec![
                Segment::Index { width: 2 },
                Segment::literal(" - "),
                Segment::Title,
                Segment::literal("."),
                Segment::Ext,
            ],
        )
    }

    /// `<stem><suffix>.<ext>`; without a stem the remote title names the file.
    pub fn single(discriminator: Option<&str>, stem: Option<&str>, suffix: &str) -> Result<Self> {
        let mut segments = vec![match stem {
            Some(stem) => Segment::literal(stem),
            None => Segment::Title,
        }];
        if !suffix.is_empty() {
            segments.push(Segment::literal(suffix));
        }
        segments.push(Segment::literal("."));
        segments.push(Segment::Ext);
        Self::new(discriminator, segments)
    }

    /// Output template for the fetch tool (a filename, relative to the working directory).
    pub fn template(&self) -> String {
        let mut template = self.prefix.replace('%', "%%");
        for segment in &self.segments {
            template.push_str(&segment.template());
        }
        template
    }

    /// Whether `file_name` is a finished output written under this pattern.
    pub fn matches(&self, file_name: &str) -> bool {
        self.matcher.is_match(file_name) && !SCRATCH_REGEX.is_match(file_name)
    }

    /// Whether names under this pattern carry a playlist index.
    pub fn is_indexed(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Index { .. }))
    }

    /// Playlist position carried by `file_name`, when names under this pattern start with one.
    ///
    /// Indices wider than the padding (`100` under `%(playlist_index)02d`) still parse.
    pub fn index_of(&self, file_name: &str) -> Option<u64> {
        if !matches!(self.segments.first(), Some(Segment::Index { .. })) {
            return None;
        }
        let name = self.display_name(file_name);
        let end = name
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(name.len());
        name[..end].parse().ok()
    }

    /// The filename as presented to the caller, without the job discriminator.
    pub fn display_name<'a>(&self, file_name: &'a str) -> &'a str {
        file_name.strip_prefix(&self.prefix).unwrap_or(file_name)
    }

    /// Prefix every name under this pattern starts with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl fmt::Display for NamingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template())
    }
}
