// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Document encoder.
//!
//! The dictionary starts with a format marker and then holds one `NAME` entry
//! per distinct element or attribute name. The body is a flat opcode stream;
//! every name is written as its two-byte dictionary index.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use crate::element::{Document, Element, Value};
use crate::error::{Error, Result};
use crate::{FORMAT_VERSION, MAX_DEPTH, SerializedDoc, op};

/// Encode a document into its `(dictionary, body)` pair.
pub fn encode(doc: &Document) -> Result<SerializedDoc> {
    let mut encoder = Encoder::new();
    encoder.element(&doc.root, 1)?;
    Ok(encoder.finish())
}

struct Encoder {
    names: HashMap<String, u16>,
    dict: BytesMut,
    body: BytesMut,
}

impl Encoder {
    fn new() -> Self {
        let mut dict = BytesMut::new();
        dict.put_u8(op::FORMAT);
        dict.put_u8(FORMAT_VERSION);
        Self {
            names: HashMap::new(),
            dict,
            body: BytesMut::new(),
        }
    }

    fn name_id(&mut self, name: &str) -> Result<u16> {
        if let Some(&id) = self.names.get(name) {
            return Ok(id);
        }
        let id = u16::try_from(self.names.len()).map_err(|_| Error::TooManyNames)?;
        let len = u16::try_from(name.len()).map_err(|_| Error::TooLong(name.len()))?;
        self.dict.put_u8(op::NAME);
        self.dict.put_u16_le(id);
        self.dict.put_u16_le(len);
        self.dict.put_slice(name.as_bytes());
        self.names.insert(name.to_owned(), id);
        Ok(id)
    }

    fn element(&mut self, el: &Element, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::TooDeep(MAX_DEPTH));
        }
        let id = self.name_id(&el.name)?;
        self.body.put_u8(op::START_TAG);
        self.body.put_u16_le(id);

        for (name, value) in &el.attributes {
            let id = self.name_id(name)?;
            self.attribute(id, value)?;
        }
        for child in &el.children {
            self.element(child, depth + 1)?;
        }

        self.body.put_u8(op::END_TAG);
        self.body.put_u16_le(id);
        Ok(())
    }

    fn attribute(&mut self, id: u16, value: &Value) -> Result<()> {
        match value {
            Value::Str(s) => {
                let len = u32::try_from(s.len()).map_err(|_| Error::TooLong(s.len()))?;
                self.body.put_u8(op::STRING);
                self.body.put_u16_le(id);
                self.body.put_u32_le(len);
                self.body.put_slice(s.as_bytes());
            }
            Value::Int(v) => {
                self.body.put_u8(op::INT);
                self.body.put_u16_le(id);
                self.body.put_i32_le(*v);
            }
            Value::Bool(v) => {
                self.body.put_u8(op::BOOL);
                self.body.put_u16_le(id);
                self.body.put_u8(u8::from(*v));
            }
            Value::LongLong(v) => {
                self.body.put_u8(op::LONG_LONG);
                self.body.put_u16_le(id);
                self.body.put_i64_le(*v);
            }
            Value::Double(v) => {
                self.body.put_u8(op::DOUBLE);
                self.body.put_u16_le(id);
                self.body.put_f64_le(*v);
            }
        }
        Ok(())
    }

    fn finish(self) -> SerializedDoc {
        SerializedDoc {
            dict: self.dict.to_vec(),
            body: self.body.to_vec(),
        }
    }
}
