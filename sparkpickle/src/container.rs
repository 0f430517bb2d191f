// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Framing of the Hadoop SequenceFiles that `saveAsPickleFile` writes.
//!
//! ```text
//! header | sync | record ... [ FF FF FF FF | sync ] record ...
//! record = record length (4) | key length = 0 (4) | value size (4) | value
//! ```

use crate::{SparkPickleResult, error::Details, util::Positioned};
use log::{debug, warn};
use std::{fmt, io::Read};

/// SequenceFile version 6 with `NullWritable` keys, `BytesWritable` values, no compression and
/// no metadata.
pub const HEADER: [u8; 79] = *b"SEQ\x06\x21org.apache.hadoop.io.NullWritable\x22org.apache.hadoop.io.BytesWritable\x00\x00\x00\x00\x00\x00";

pub const SYNC_SIZE: usize = 16;

/// Written in place of a record length right before a repeated sync marker.
pub const SYNC_ESCAPE: [u8; 4] = [0xFF; 4];

const KEY_LENGTH: [u8; 4] = [0; 4];

/// The random marker a SequenceFile repeats between records.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct SyncMarker(pub [u8; SYNC_SIZE]);

impl fmt::Debug for SyncMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// The fixed fields in front of a record's payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RecordHeader {
    /// Offset of the first payload byte.
    pub offset: u64,
    /// Hadoop's record length, `None` when the stream held fewer than four bytes for it.
    pub record_length: Option<u32>,
    /// Size of the `BytesWritable` payload.
    pub declared_size: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FramerState {
    /// Between records; the next read is a record length.
    ExpectRecord,
    /// The four bytes after the previous record were not a sync escape; they are the record
    /// length of the next record.
    ExpectRecordCarried(Vec<u8>),
    /// A record header was handed out and its payload is being decoded.
    ExpectPayload(RecordHeader),
    End,
}

/// Walks the records of one SequenceFile.
///
/// A framer is created by [`open`](Self::open), which consumes the header. Each call of
/// [`next_record`](Self::next_record) must be followed by reading exactly `declared_size` bytes
/// of payload and then [`finish_record`](Self::finish_record).
#[derive(Debug)]
pub struct Framer {
    sync: SyncMarker,
    state: FramerState,
}

impl Framer {
    /// Validate the header and capture the sync marker.
    pub fn open<R: Read>(stream: &mut Positioned<R>) -> SparkPickleResult<Self> {
        let header = stream.read_up_to(HEADER.len())?;
        if header != HEADER {
            return Err(Details::HeaderMismatch.into());
        }
        let sync = SyncMarker(stream.read_array()?);
        debug!("SequenceFile header accepted, sync marker {sync:?}");
        Ok(Self {
            sync,
            state: FramerState::ExpectRecord,
        })
    }

    pub fn sync_marker(&self) -> SyncMarker {
        self.sync
    }

    pub fn state(&self) -> &FramerState {
        &self.state
    }

    /// Read the header of the next record, or `None` at the end of the stream.
    ///
    /// Calling this while a record is still open finishes that record first.
    pub fn next_record<R: Read>(
        &mut self,
        stream: &mut Positioned<R>,
    ) -> SparkPickleResult<Option<RecordHeader>> {
        let lead = match std::mem::replace(&mut self.state, FramerState::End) {
            FramerState::End => return Ok(None),
            open @ FramerState::ExpectPayload(_) => {
                self.state = open;
                self.finish_record(stream)?;
                return self.next_record(stream);
            }
            FramerState::ExpectRecordCarried(lead) => lead,
            FramerState::ExpectRecord => {
                let lead = stream.read_up_to(4)?;
                if lead.is_empty() {
                    return Ok(None);
                }
                lead
            }
        };

        let key_length = stream.read_up_to(4)?;
        if key_length != KEY_LENGTH {
            return Err(Details::RecordMarkerMismatch(key_length).into());
        }
        let size = stream.read_up_to(4)?;
        let declared_size = <[u8; 4]>::try_from(size.as_slice())
            .map(u32::from_be_bytes)
            .map_err(|_| Details::LengthDecode(size.len()))?;

        let record_length = <[u8; 4]>::try_from(lead.as_slice())
            .ok()
            .map(u32::from_be_bytes);
        if record_length != declared_size.checked_add(4) {
            warn!(
                "Record length {record_length:?} does not match payload size {declared_size} + 4"
            );
        }

        let record = RecordHeader {
            offset: stream.position(),
            record_length,
            declared_size,
        };
        debug!(
            "Record at offset {} declares {declared_size} payload bytes",
            record.offset
        );
        self.state = FramerState::ExpectPayload(record);
        Ok(Some(record))
    }

    /// Consume what follows a record: a sync escape, the end of the stream, or the record length
    /// of the next record.
    pub fn finish_record<R: Read>(&mut self, stream: &mut Positioned<R>) -> SparkPickleResult<()> {
        if !matches!(self.state, FramerState::ExpectPayload(_)) {
            return Ok(());
        }
        let lookahead = stream.read_up_to(4)?;
        self.state = if lookahead == SYNC_ESCAPE {
            let offset = stream.position();
            let sync = stream.read_up_to(SYNC_SIZE)?;
            if sync != self.sync.0 {
                self.state = FramerState::End;
                return Err(Details::SyncMarkerMismatch { offset }.into());
            }
            FramerState::ExpectRecord
        } else if lookahead.is_empty() {
            FramerState::End
        } else {
            debug!("Record length {lookahead:02x?} follows without a sync escape");
            FramerState::ExpectRecordCarried(lookahead)
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sparkpickle_test_helper::{
        TestResult,
        fixture::{SYNC, SequenceFileWriter},
        logger::{assert_logged, assert_not_logged, clear_log_messages, logged_containing},
    };

    fn skip_payload(stream: &mut Positioned<&[u8]>, record: &RecordHeader) -> TestResult {
        stream.read_vec(record.declared_size as usize, &Default::default())?;
        Ok(())
    }

    #[test]
    fn header_has_the_hadoop_layout() {
        assert_eq!(&HEADER[..4], b"SEQ\x06");
        assert_eq!(HEADER[4] as usize, "org.apache.hadoop.io.NullWritable".len());
        assert_eq!(HEADER[38] as usize, "org.apache.hadoop.io.BytesWritable".len());
        assert_eq!(&HEADER[73..], &[0u8; 6]);
    }

    #[test]
    fn walks_records_with_and_without_sync_escapes() -> TestResult {
        let bytes = SequenceFileWriter::new(2)
            .record(b"one")
            .record(b"three")
            .record(b"two")
            .finish();
        let mut stream = Positioned::new(bytes.as_slice());
        let mut framer = Framer::open(&mut stream)?;
        assert_eq!(framer.sync_marker(), SyncMarker(SYNC));

        let mut sizes = Vec::new();
        while let Some(record) = framer.next_record(&mut stream)? {
            sizes.push(record.declared_size);
            skip_payload(&mut stream, &record)?;
            framer.finish_record(&mut stream)?;
            if sizes.len() == 1 {
                assert!(matches!(framer.state(), FramerState::ExpectRecordCarried(_)));
            }
            if sizes.len() == 2 {
                assert_eq!(framer.state(), &FramerState::ExpectRecord);
            }
        }
        assert_eq!(sizes, [3, 5, 3]);
        assert_eq!(framer.state(), &FramerState::End);
        assert_eq!(stream.position(), bytes.len() as u64);
        Ok(())
    }

    #[test]
    fn empty_file_has_no_records() -> TestResult {
        let bytes = SequenceFileWriter::new(0).finish();
        let mut stream = Positioned::new(bytes.as_slice());
        let mut framer = Framer::open(&mut stream)?;
        assert_eq!(framer.next_record(&mut stream)?, None);
        assert_eq!(framer.next_record(&mut stream)?, None);
        Ok(())
    }

    #[test]
    fn rejects_a_foreign_header() {
        let mut bytes = SequenceFileWriter::new(0).finish();
        bytes[10] ^= 0x20;
        let err = Framer::open(&mut Positioned::new(bytes.as_slice())).unwrap_err();
        assert!(matches!(err.details(), Details::HeaderMismatch));
    }

    #[test]
    fn short_header_is_a_mismatch() {
        let err = Framer::open(&mut Positioned::new(&HEADER[..20])).unwrap_err();
        assert!(matches!(err.details(), Details::HeaderMismatch));
    }

    #[test]
    fn missing_sync_marker_is_an_io_error() {
        let err = Framer::open(&mut Positioned::new(&HEADER[..])).unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[test]
    fn key_length_must_be_zero() -> TestResult {
        let mut bytes = SequenceFileWriter::new(0).record(b"x").finish();
        let key_at = HEADER.len() + SYNC_SIZE + 4;
        bytes[key_at + 3] = 1;
        let mut stream = Positioned::new(bytes.as_slice());
        let mut framer = Framer::open(&mut stream)?;
        let err = framer.next_record(&mut stream).unwrap_err();
        match err.details() {
            Details::RecordMarkerMismatch(found) => assert_eq!(found, &[0, 0, 0, 1]),
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn short_size_field_is_a_length_error() -> TestResult {
        let mut bytes = SequenceFileWriter::new(0).finish();
        bytes.extend([0, 0, 0, 5, 0, 0, 0, 0, 0, 1]);
        let mut stream = Positioned::new(bytes.as_slice());
        let mut framer = Framer::open(&mut stream)?;
        let err = framer.next_record(&mut stream).unwrap_err();
        assert!(matches!(err.details(), Details::LengthDecode(2)));
        Ok(())
    }

    #[test]
    fn sync_mismatch_reports_its_offset() -> TestResult {
        let mut writer = SequenceFileWriter::new(0);
        writer.record(b"abc");
        let sync_at = writer.position() + 4;
        let mut bytes = writer.sync().record(b"def").finish();
        bytes[sync_at + 7] ^= 0xFF;

        let mut stream = Positioned::new(bytes.as_slice());
        let mut framer = Framer::open(&mut stream)?;
        let record = framer.next_record(&mut stream)?.ok_or_else(|| anyhow::anyhow!("no record"))?;
        skip_payload(&mut stream, &record)?;
        let err = framer.finish_record(&mut stream).unwrap_err();
        match err.details() {
            Details::SyncMarkerMismatch { offset } => assert_eq!(*offset, sync_at as u64),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(framer.next_record(&mut stream)?, None);
        Ok(())
    }

    #[test]
    fn inconsistent_record_length_is_only_logged() -> TestResult {
        sparkpickle_test_helper::init();
        clear_log_messages();
        let mut bytes = SequenceFileWriter::new(0).record(b"abcd").finish();
        bytes[HEADER.len() + SYNC_SIZE + 3] = 99;
        let mut stream = Positioned::new(bytes.as_slice());
        let mut framer = Framer::open(&mut stream)?;
        let record = framer.next_record(&mut stream)?;
        assert_eq!(
            record,
            Some(RecordHeader {
                offset: (HEADER.len() + SYNC_SIZE + 12) as u64,
                record_length: Some(99),
                declared_size: 4,
            })
        );
        assert_logged("Record length Some(99) does not match payload size 4 + 4");
        Ok(())
    }

    #[test]
    fn carried_record_length_is_logged_at_debug() -> TestResult {
        sparkpickle_test_helper::init();
        clear_log_messages();
        let bytes = SequenceFileWriter::new(0).record(b"ab").record(b"cd").finish();
        let mut stream = Positioned::new(bytes.as_slice());
        let mut framer = Framer::open(&mut stream)?;
        while let Some(record) = framer.next_record(&mut stream)? {
            skip_payload(&mut stream, &record)?;
        }
        assert!(logged_containing("follows without a sync escape"));
        assert_not_logged("Record length Some(6) does not match payload size 2 + 4");
        Ok(())
    }
}
