//! Zero-copy text storage for AST attributes.
//!
//! Every textual attribute on an AST node starts life as a `(start, len)`
//! view into the shared input buffer. A node only pays for an allocation
//! when a transformation visitor assigns a synthetic value that is not a
//! substring of the input.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// The shared, immutable input buffer all slices point into.
pub type SourceText = Arc<str>;

/// A piece of text that is either a view into the original input or an
/// owned string produced by a transformation.
#[derive(Clone)]
pub enum Text {
    /// A `(start, len)` view into the shared input buffer.
    Slice {
        /// The input buffer.
        source: SourceText,
        /// Byte offset of the view.
        start: usize,
        /// Byte length of the view.
        len: usize,
    },
    /// An owned string assigned by a visitor.
    Owned(String),
}

impl Text {
    /// Create a view into the shared input buffer.
    pub fn slice(source: SourceText, start: usize, len: usize) -> Self {
        debug_assert!(source.get(start..start + len).is_some());
        Text::Slice { source, start, len }
    }

    /// Create an owned text value.
    pub fn owned<S: Into<String>>(value: S) -> Self {
        Text::Owned(value.into())
    }

    /// Create an empty text value.
    pub fn empty() -> Self {
        Text::Owned(String::new())
    }

    /// Get the text content.
    pub fn as_str(&self) -> &str {
        match self {
            Text::Slice { source, start, len } => &source[*start..*start + *len],
            Text::Owned(s) => s.as_str(),
        }
    }

    /// Byte length of the content.
    pub fn len(&self) -> usize {
        match self {
            Text::Slice { len, .. } => *len,
            Text::Owned(s) => s.len(),
        }
    }

    /// Check whether the content is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte offset into the original input, if this is still a view.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Text::Slice { start, .. } => Some(*start),
            Text::Owned(_) => None,
        }
    }

    /// Overwrite the content with an owned value.
    pub fn set<S: Into<String>>(&mut self, value: S) {
        *self = Text::Owned(value.into());
    }
}

impl Default for Text {
    fn default() -> Self {
        Text::empty()
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for Text {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Text {}

impl PartialEq<str> for Text {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Text {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl From<String> for Text {
    fn from(value: String) -> Self {
        Text::Owned(value)
    }
}

impl From<&str> for Text {
    fn from(value: &str) -> Self {
        Text::Owned(value.to_string())
    }
}

/// Resolve Lucene `\x` escape sequences.
///
/// Borrows the input when it contains no backslash. A trailing lone
/// backslash is kept literally.
pub fn unescape(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\\') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

/// Escape Lucene special characters in a term.
///
/// Wildcard characters `*` and `?` are left intact so that escaping a
/// wildcard term does not change its meaning.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' | '+' | '-' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"' | '~' | ':'
            | '/' | '&' | '|' | ' ' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}
