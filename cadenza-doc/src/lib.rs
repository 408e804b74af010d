// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Compact binary codec for Cadenza project documents.
//!
//! A project document is an element tree (think XML without character data).
//! It is stored as two blobs:
//!
//! - a *dictionary* mapping two-byte indices to element and attribute names, and
//! - a *body* of opcodes that refer to names only by index.
//!
//! The storage engine treats both blobs as opaque, except when importing one
//! project into another: then it decodes the body, rewrites every element that
//! carries a [`BLOCK_ID_ATTR`] attribute, and encodes it again.
//!
//! # Example
//!
//! ```
//! use cadenza_doc::{Document, Element, decode, encode};
//!
//! let doc = Document::new(
//!     Element::new("project")
//!         .with_child(Element::new("waveblock").with_attr("blockid", 7i64)),
//! );
//! let stored = encode(&doc).unwrap();
//! assert_eq!(decode(&stored).unwrap().block_ids(), vec![7]);
//! ```

mod decode;
mod element;
mod encode;
mod error;

pub use decode::{MAX_DEPTH, decode};
pub use element::{BLOCK_ID_ATTR, Document, Element, Value};
pub use encode::encode;
pub use error::{Error, Result, Section};

/// Highest dictionary format this crate reads and the one it writes.
pub const FORMAT_VERSION: u8 = 1;

/// Opcodes shared by the encoder and decoder.
pub(crate) mod op {
    // dictionary
    pub const FORMAT: u8 = 0x0f;
    pub const NAME: u8 = 0x10;

    // body
    pub const START_TAG: u8 = 0x01;
    pub const END_TAG: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const INT: u8 = 0x04;
    pub const BOOL: u8 = 0x05;
    pub const LONG_LONG: u8 = 0x06;
    pub const DOUBLE: u8 = 0x07;
}

/// A document as persisted: the name dictionary and the body that indexes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializedDoc {
    pub dict: Vec<u8>,
    pub body: Vec<u8>,
}

impl SerializedDoc {
    pub fn new(dict: Vec<u8>, body: Vec<u8>) -> Self {
        Self { dict, body }
    }

    /// Combined size of both blobs.
    pub fn len(&self) -> usize {
        self.dict.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty() && self.body.is_empty()
    }
}
