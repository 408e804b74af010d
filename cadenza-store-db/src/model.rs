// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! What the storage engine needs from the in-memory project.

use std::collections::HashSet;

use cadenza_doc::{Document, SerializedDoc};

use crate::error::Result;
use crate::types::BlockId;

/// The in-memory project, as seen by the storage engine.
///
/// The engine only asks for block references and a fresh serialization; it
/// never mutates the model.
pub trait ProjectModel {
    /// Every block reference in the project, in document order. May repeat.
    fn block_refs(&self) -> Vec<BlockId>;

    /// Serialize the current state for a save or autosave.
    fn serialize(&self) -> Result<SerializedDoc>;

    /// Blocks that must survive orphan collection and pruning.
    fn live_block_ids(&self) -> HashSet<BlockId> {
        self.block_refs().into_iter().collect()
    }
}

impl ProjectModel for Document {
    fn block_refs(&self) -> Vec<BlockId> {
        self.block_ids().into_iter().map(BlockId).collect()
    }

    fn serialize(&self) -> Result<SerializedDoc> {
        Ok(cadenza_doc::encode(self)?)
    }
}

#[cfg(test)]
mod tests {
    use cadenza_doc::{BLOCK_ID_ATTR, Element};

    use super::*;

    #[test]
    fn test_document_model() {
        let doc = Document::new(
            Element::new("project")
                .with_child(Element::new("waveblock").with_attr(BLOCK_ID_ATTR, 4i64))
                .with_child(Element::new("waveblock").with_attr(BLOCK_ID_ATTR, 4i64))
                .with_child(Element::new("waveblock").with_attr(BLOCK_ID_ATTR, 9i64)),
        );
        assert_eq!(doc.block_refs(), vec![BlockId(4), BlockId(4), BlockId(9)]);
        assert_eq!(
            doc.live_block_ids(),
            HashSet::from([BlockId(4), BlockId(9)])
        );
        assert_eq!(
            cadenza_doc::decode(&doc.serialize().unwrap()).unwrap(),
            doc
        );
    }
}
