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

//! Logic handling reading pickle files at user level.

use crate::{
    SparkPickleResult,
    bridge::{self, ProgressFn},
    container::{Framer, SyncMarker},
    types::Value,
    util::{DEFAULT_MAX_ALLOCATION_BYTES, DEFAULT_MAX_DEPTH, Limits, Positioned},
};
use bon::bon;
use std::{
    collections::VecDeque,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

/// Main interface for reading the files `saveAsPickleFile` writes.
///
/// To be used as an iterator:
///
/// ```no_run
/// # use sparkpickle::Reader;
/// # use std::io::Cursor;
/// # let input = Cursor::new(Vec::<u8>::new());
/// for value in Reader::new(input).unwrap() {
///     match value {
///         Ok(v) => println!("{v}"),
///         Err(e) => println!("Error: {e}"),
///     };
/// }
/// ```
///
/// Values are handed out once the record holding them has been decoded completely. After the
/// first error the iterator ends.
pub struct Reader<'a, R> {
    stream: Positioned<R>,
    framer: Framer,
    pending: VecDeque<Value>,
    limits: Limits,
    progress: Option<&'a mut ProgressFn<'a>>,
    errored: bool,
}

#[bon]
impl<'a, R: Read> Reader<'a, R> {
    /// Creates a `Reader` given something implementing the `io::Read` trait to read from.
    ///
    /// **NOTE** The header and the sync marker are read upon creation of the `Reader`.
    pub fn new(reader: R) -> SparkPickleResult<Reader<'a, R>> {
        Reader::builder(reader).build()
    }

    /// Creates a `Reader` with an optional progress callback and decoding limits.
    ///
    /// The callback receives, after each pickled batch, the absolute offset one past the end of
    /// that batch. Offsets are counted from `start_offset`, the absolute position of the first
    /// byte `reader` yields. Pass `file.stream_position()?` for a source that was already seeked
    /// or partly read.
    ///
    /// **NOTE** The header and the sync marker are read upon creation of the `Reader`.
    #[builder(finish_fn = build)]
    pub fn builder(
        #[builder(start_fn)] reader: R,
        progress: Option<&'a mut ProgressFn<'a>>,
        #[builder(default)] start_offset: u64,
        #[builder(default = DEFAULT_MAX_ALLOCATION_BYTES)] max_allocation_bytes: usize,
        #[builder(default = DEFAULT_MAX_DEPTH)] max_depth: usize,
    ) -> SparkPickleResult<Reader<'a, R>> {
        let mut stream = Positioned::starting_at(reader, start_offset);
        let framer = Framer::open(&mut stream)?;
        Ok(Reader {
            stream,
            framer,
            pending: VecDeque::new(),
            limits: Limits {
                max_allocation_bytes,
                max_depth,
            },
            progress,
            errored: false,
        })
    }

    /// The sync marker captured from the file header.
    #[inline]
    pub fn sync_marker(&self) -> SyncMarker {
        self.framer.sync_marker()
    }

    /// Absolute offset of the next byte to be read from the underlying reader.
    #[inline]
    pub fn position(&self) -> u64 {
        self.stream.position()
    }

    #[inline]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Gives back the underlying reader, positioned wherever decoding stopped.
    pub fn into_inner(self) -> R {
        self.stream.into_inner()
    }

    fn read_next(&mut self) -> SparkPickleResult<Option<Value>> {
        loop {
            if let Some(value) = self.pending.pop_front() {
                return Ok(Some(value));
            }
            let Some(record) = self.framer.next_record(&mut self.stream)? else {
                return Ok(None);
            };
            let values = bridge::decode_payload(
                &mut self.stream,
                record.declared_size,
                &self.limits,
                self.progress.as_deref_mut(),
            )?;
            self.pending.extend(values);
        }
    }
}

impl<R: Read> Iterator for Reader<'_, R> {
    type Item = SparkPickleResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        // to prevent keep on reading after the first error occurs
        if self.errored {
            return None;
        };
        match self.read_next() {
            Ok(opt) => opt.map(Ok),
            Err(e) => {
                self.errored = true;
                Some(Err(e))
            }
        }
    }
}

/// Read every value from `reader`.
pub fn load<R: Read>(reader: R) -> SparkPickleResult<Vec<Value>> {
    Reader::new(reader)?.collect()
}

/// Read every value from `reader`, reporting the offset after each pickled batch.
pub fn load_with_progress<R: Read, F: FnMut(u64)>(
    reader: R,
    mut progress: F,
) -> SparkPickleResult<Vec<Value>> {
    Reader::builder(reader)
        .progress(&mut progress)
        .build()?
        .collect()
}

/// Read every value from an in-memory file.
pub fn loads(bytes: &[u8]) -> SparkPickleResult<Vec<Value>> {
    load(bytes)
}

/// [`loads`] with a progress callback, see [`load_with_progress`].
pub fn loads_with_progress<F: FnMut(u64)>(
    bytes: &[u8],
    progress: F,
) -> SparkPickleResult<Vec<Value>> {
    load_with_progress(bytes, progress)
}

/// Open the file at `path` and read every value from it.
pub fn load_file<P: AsRef<Path>>(path: P) -> SparkPickleResult<Vec<Value>> {
    let file = File::open(path)?;
    load(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{container::HEADER, error::Details};
    use pretty_assertions::assert_eq;
    use sparkpickle_test_helper::{
        TestResult,
        fixture::{SYNC, SequenceFileWriter, java_byte_arrays, pickle_ints, spark_int_file},
    };
    use std::io::{Cursor, Seek};

    fn ints(values: impl IntoIterator<Item = i64>) -> Vec<Value> {
        values.into_iter().map(Value::Int).collect()
    }

    #[test]
    fn reads_values_across_records() -> TestResult {
        let bytes = spark_int_file(0..45, 2);
        let reader = Reader::new(bytes.as_slice())?;
        assert_eq!(reader.sync_marker(), SyncMarker(SYNC));
        let values = reader.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(values, ints(0..45));
        Ok(())
    }

    #[test]
    fn into_inner_returns_the_source() -> TestResult {
        let bytes = spark_int_file(0..3, 0);
        let mut reader = Reader::new(Cursor::new(bytes.clone()))?;
        assert_eq!(reader.by_ref().count(), 3);
        assert_eq!(reader.position(), bytes.len() as u64);
        assert_eq!(reader.into_inner().position(), bytes.len() as u64);
        Ok(())
    }

    #[test]
    fn values_of_a_record_come_before_its_trailing_sync_is_checked() -> TestResult {
        let mut writer = SequenceFileWriter::new(0);
        writer.record(&java_byte_arrays(&[pickle_ints(&[1, 2])]));
        let sync_at = writer.position() + 4;
        let mut bytes = writer
            .sync()
            .record(&java_byte_arrays(&[pickle_ints(&[3])]))
            .finish();
        bytes[sync_at] ^= 1;

        let mut reader = Reader::new(bytes.as_slice())?;
        assert_eq!(reader.next().transpose()?, Some(Value::Int(1)));
        assert_eq!(reader.next().transpose()?, Some(Value::Int(2)));
        let err = reader.next().transpose().unwrap_err();
        assert!(matches!(err.details(), Details::SyncMarkerMismatch { .. }));
        assert!(reader.next().is_none());
        Ok(())
    }

    #[test]
    fn builder_limits_allocations() -> TestResult {
        let bytes = spark_int_file(0..10, 0);
        let mut reader = Reader::builder(bytes.as_slice())
            .max_allocation_bytes(8)
            .build()?;
        assert_eq!(reader.limits().max_depth, DEFAULT_MAX_DEPTH);
        let err = reader.next().transpose().unwrap_err();
        assert!(matches!(err.details(), Details::MemoryAllocation { maximum: 8, .. }));
        Ok(())
    }

    #[test]
    fn load_with_progress_reports_every_batch() -> TestResult {
        let bytes = spark_int_file(0..25, 0);
        let mut offsets = Vec::new();
        let values = loads_with_progress(&bytes, |offset| offsets.push(offset))?;
        assert_eq!(values, ints(0..25));
        assert_eq!(offsets.len(), 3);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(offsets.last().copied(), Some(bytes.len() as u64));
        Ok(())
    }

    #[test]
    fn offsets_are_absolute_for_a_seeked_source() -> TestResult {
        let file = spark_int_file(0..15, 0);
        let mut source = Cursor::new([b"leading junk".as_slice(), file.as_slice()].concat());
        source.seek(std::io::SeekFrom::Start(12))?;
        let start = source.stream_position()?;

        let mut offsets = Vec::new();
        let mut progress = |offset: u64| offsets.push(offset);
        let mut reader = Reader::builder(source)
            .progress(&mut progress)
            .start_offset(start)
            .build()?;
        assert_eq!(reader.position(), start + (HEADER.len() + 16) as u64);
        assert_eq!(reader.by_ref().count(), 15);
        let end = reader.position();
        drop(reader);
        assert_eq!(end, 12 + file.len() as u64);
        assert_eq!(offsets.last().copied(), Some(end));
        Ok(())
    }

    #[test]
    fn load_file_reads_from_disk() -> TestResult {
        let path = std::env::temp_dir().join(format!("sparkpickle-{}.seq", std::process::id()));
        std::fs::write(&path, spark_int_file(0..12, 0))?;
        let values = load_file(&path);
        std::fs::remove_file(&path)?;
        assert_eq!(values?, ints(0..12));
        Ok(())
    }

    #[test]
    fn load_file_surfaces_io_errors() {
        let err = load_file("/nonexistent/sparkpickle/file").unwrap_err();
        assert!(err.is_io());
    }
}
