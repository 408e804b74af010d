// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Row types for the sample block table.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::summary::BlockSummary;

/// Identity of a stored sample block.
///
/// Assigned by the database from a monotonic sequence; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub i64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for BlockId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl ToSql for BlockId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for BlockId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(BlockId)
    }
}

/// Encoding of the samples in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    Int16,
    Int24,
    Float,
}

impl SampleFormat {
    /// Tag stored in the `sampleformat` column.
    pub const fn raw(self) -> i64 {
        match self {
            SampleFormat::Int16 => 0x0002_0001,
            SampleFormat::Int24 => 0x0004_0001,
            SampleFormat::Float => 0x0004_000f,
        }
    }

    pub const fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0x0002_0001 => Some(SampleFormat::Int16),
            0x0004_0001 => Some(SampleFormat::Int24),
            0x0004_000f => Some(SampleFormat::Float),
            _ => None,
        }
    }

    /// Bytes occupied by one sample.
    pub const fn sample_size(self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Int24 | SampleFormat::Float => 4,
        }
    }
}

impl ToSql for SampleFormat {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.raw()))
    }
}

impl FromSql for SampleFormat {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        SampleFormat::from_raw(raw).ok_or(FromSqlError::OutOfRange(raw))
    }
}

/// A stored sample block.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    pub id: BlockId,
    pub format: SampleFormat,
    pub summary: BlockSummary,
    /// Raw sample payload
    pub samples: Vec<u8>,
}

impl SampleBlock {
    /// Bytes this block occupies in the block table (payload plus summaries).
    pub fn space_usage(&self) -> u64 {
        (self.samples.len() + self.summary.summary_256.len() + self.summary.summary_64k.len())
            as u64
    }
}

/// Block count and total block bytes of a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageTotals {
    pub blocks: u64,
    pub bytes: u64,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::int16(SampleFormat::Int16)]
    #[case::int24(SampleFormat::Int24)]
    #[case::float(SampleFormat::Float)]
    fn test_format_tag(#[case] format: SampleFormat) {
        assert_eq!(SampleFormat::from_raw(format.raw()), Some(format));
    }

    #[test]
    fn test_unknown_format_tag() {
        assert_eq!(SampleFormat::from_raw(0), None);
        let err = SampleFormat::column_result(ValueRef::Integer(0)).unwrap_err();
        assert!(matches!(err, FromSqlError::OutOfRange(0)));
    }
}
