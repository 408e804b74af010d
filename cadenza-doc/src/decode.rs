// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Document decoder.

use std::collections::HashMap;

use bytes::Buf;

use crate::element::{Document, Element, Value};
use crate::error::{Error, Result, Section};
use crate::{FORMAT_VERSION, SerializedDoc, op};

/// Deepest element nesting accepted by [`decode`] and written by
/// [`encode`](crate::encode), counting the root as level one.
pub const MAX_DEPTH: usize = 1024;

/// Decode a `(dictionary, body)` pair back into a document tree.
pub fn decode(doc: &SerializedDoc) -> Result<Document> {
    let names = read_dictionary(&doc.dict)?;
    read_body(&doc.body, &names)
}

struct Reader<'a> {
    buf: &'a [u8],
    len: usize,
    section: Section,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], section: Section) -> Self {
        Self {
            buf,
            len: buf.len(),
            section,
        }
    }

    fn offset(&self) -> usize {
        self.len - self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(Error::UnexpectedEof {
                section: self.section,
                offset: self.offset(),
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    fn i64(&mut self) -> Result<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    fn f64(&mut self) -> Result<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    fn string(&mut self, len: usize) -> Result<String> {
        self.need(len)?;
        let bytes = self.buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8(self.section))
    }

    fn unknown(&self, opcode: u8) -> Error {
        Error::UnknownOpcode {
            section: self.section,
            opcode,
            // the opcode byte has already been consumed
            offset: self.offset() - 1,
        }
    }
}

fn read_dictionary(dict: &[u8]) -> Result<HashMap<u16, String>> {
    let mut r = Reader::new(dict, Section::Dictionary);
    let mut names = HashMap::new();

    while r.buf.has_remaining() {
        match r.u8()? {
            op::FORMAT => {
                let version = r.u8()?;
                if version > FORMAT_VERSION {
                    return Err(Error::UnsupportedFormat(version));
                }
            }
            op::NAME => {
                let id = r.u16()?;
                let len = usize::from(r.u16()?);
                let name = r.string(len)?;
                if names.insert(id, name).is_some() {
                    return Err(Error::DuplicateName(id));
                }
            }
            other => return Err(r.unknown(other)),
        }
    }

    Ok(names)
}

fn read_body(body: &[u8], names: &HashMap<u16, String>) -> Result<Document> {
    let mut r = Reader::new(body, Section::Body);
    let lookup = |id: u16| names.get(&id).cloned().ok_or(Error::UnknownName(id));

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    while r.buf.has_remaining() {
        let opcode = r.u8()?;
        match opcode {
            op::START_TAG => {
                let name = lookup(r.u16()?)?;
                if root.is_some() {
                    return Err(Error::MultipleRoots);
                }
                if stack.len() == MAX_DEPTH {
                    return Err(Error::TooDeep(MAX_DEPTH));
                }
                stack.push(Element::new(name));
            }
            op::END_TAG => {
                let name = lookup(r.u16()?)?;
                let el = stack.pop().ok_or_else(|| Error::UnopenedEndTag(name.clone()))?;
                if el.name != name {
                    return Err(Error::MismatchedEndTag {
                        expected: el.name,
                        found: name,
                    });
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            op::STRING | op::INT | op::BOOL | op::LONG_LONG | op::DOUBLE => {
                let name = lookup(r.u16()?)?;
                let value = match opcode {
                    op::STRING => {
                        let len = r.u32()? as usize;
                        Value::Str(r.string(len)?)
                    }
                    op::INT => Value::Int(r.i32()?),
                    op::BOOL => Value::Bool(r.u8()? != 0),
                    op::LONG_LONG => Value::LongLong(r.i64()?),
                    _ => Value::Double(r.f64()?),
                };
                let el = stack.last_mut().ok_or_else(|| Error::StrayAttribute(name.clone()))?;
                el.attributes.push((name, value));
            }
            other => return Err(r.unknown(other)),
        }
    }

    if !stack.is_empty() {
        return Err(Error::Unclosed(stack.len()));
    }
    root.map(Document::new).ok_or(Error::Empty)
}
