// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Error types for document encoding and decoding.

use thiserror::Error;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding or decoding a project document.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Input ended in the middle of an entry
    #[error("Unexpected end of {section} at offset {offset}")]
    UnexpectedEof { section: Section, offset: usize },

    /// Opcode byte not understood by this codec
    #[error("Unknown opcode {opcode:#04x} in {section} at offset {offset}")]
    UnknownOpcode {
        section: Section,
        opcode: u8,
        offset: usize,
    },

    /// Dictionary was written by a newer codec
    #[error("Unsupported dictionary format version {0}")]
    UnsupportedFormat(u8),

    /// Body referenced a name index missing from the dictionary
    #[error("Name index {0} is not in the dictionary")]
    UnknownName(u16),

    /// Dictionary defined the same index twice
    #[error("Name index {0} is defined twice")]
    DuplicateName(u16),

    /// More distinct names than fit a two-byte index
    #[error("Document uses more than {} distinct names", u16::MAX)]
    TooManyNames,

    /// A name or string value is not valid UTF-8
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(Section),

    /// A string is longer than its length prefix can describe
    #[error("Value of {0} bytes is too long to encode")]
    TooLong(usize),

    /// Attribute appeared outside of any element
    #[error("Attribute '{0}' appears outside of an element")]
    StrayAttribute(String),

    /// End tag does not close the innermost open element
    #[error("End tag '{found}' does not match open element '{expected}'")]
    MismatchedEndTag { expected: String, found: String },

    /// End tag with no open element
    #[error("End tag '{0}' has no matching start tag")]
    UnopenedEndTag(String),

    /// Body ended with elements still open
    #[error("Document ended with {0} unclosed element(s)")]
    Unclosed(usize),

    /// Elements nested deeper than the codec accepts
    #[error("Document nests elements deeper than {0} levels")]
    TooDeep(usize),

    /// Body contained more than one top-level element
    #[error("Document has more than one root element")]
    MultipleRoots,

    /// Body contained no element at all
    #[error("Document is empty")]
    Empty,
}

/// Which of the two blobs an error was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Dictionary,
    Body,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Dictionary => f.write_str("dictionary"),
            Section::Body => f.write_str("body"),
        }
    }
}
