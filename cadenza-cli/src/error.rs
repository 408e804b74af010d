// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("Store error: {0}")]
    Store(#[from] cadenza_store_db::Error),

    #[error("Document error: {0}")]
    Document(#[from] cadenza_doc::Error),

    #[error("'{0}' has autosaved changes; open and save it before running this command")]
    Unsaved(PathBuf),
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
