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

//! Writers for the byte layout `RDD.saveAsPickleFile` produces.
//!
//! PySpark pickles every batch of values with protocol 2, groups up to ten pickles into one
//! Java `byte[][]`, and stores each of those as the value of a `NullWritable`/`BytesWritable`
//! SequenceFile record.

/// SequenceFile header for `NullWritable` keys and `BytesWritable` values.
pub const HEADER: &[u8] = b"SEQ\x06\x21org.apache.hadoop.io.NullWritable\x22org.apache.hadoop.io.BytesWritable\x00\x00\x00\x00\x00\x00";

pub const SYNC: [u8; 16] = [
    0x3A, 0x91, 0x5C, 0x07, 0xE2, 0x44, 0x18, 0xB6, 0x09, 0xD3, 0x7F, 0x21, 0x68, 0xAA, 0x05, 0xC4,
];

const SYNC_ESCAPE: [u8; 4] = [0xFF; 4];

/// A Python value the pickler below knows how to write.
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Item>),
}

impl From<i64> for Item {
    fn from(value: i64) -> Self {
        Item::Int(value)
    }
}

impl From<&str> for Item {
    fn from(value: &str) -> Self {
        Item::Str(value.to_owned())
    }
}

/// Protocol 2 pickles, memoized the way CPython's pickler does it.
#[derive(Default)]
struct Pickler {
    out: Vec<u8>,
    memo: u32,
}

impl Pickler {
    fn put(&mut self) {
        if let Ok(index) = u8::try_from(self.memo) {
            self.out.extend([b'q', index]);
        } else {
            self.out.push(b'r');
            self.out.extend(self.memo.to_le_bytes());
        }
        self.memo += 1;
    }

    fn unicode(&mut self, s: &str) {
        self.out.push(b'X');
        self.out.extend((s.len() as u32).to_le_bytes());
        self.out.extend(s.as_bytes());
        self.put();
    }

    fn item(&mut self, item: &Item) {
        match item {
            Item::None => self.out.push(b'N'),
            Item::Bool(true) => self.out.push(0x88),
            Item::Bool(false) => self.out.push(0x89),
            Item::Int(i) => self.int(*i),
            Item::Float(x) => {
                self.out.push(b'G');
                self.out.extend(x.to_be_bytes());
            }
            Item::Str(s) => self.unicode(s),
            Item::Bytes(b) => {
                // Python 3 writes bytes as _codecs.encode(latin1_text, 'latin1') in protocol 2.
                self.out.extend(b"c_codecs\nencode\n");
                self.put();
                let text: String = b.iter().map(|&c| char::from(c)).collect();
                self.unicode(&text);
                self.unicode("latin1");
                self.out.push(0x86);
                self.put();
                self.out.push(b'R');
                self.put();
            }
            Item::Tuple(items) => {
                match items.len() {
                    0 => self.out.push(b')'),
                    1..=3 => {
                        items.iter().for_each(|i| self.item(i));
                        self.out.push(0x84 + items.len() as u8);
                    }
                    _ => {
                        self.out.push(b'(');
                        items.iter().for_each(|i| self.item(i));
                        self.out.push(b't');
                    }
                }
                if !items.is_empty() {
                    self.put();
                }
            }
        }
    }

    fn int(&mut self, i: i64) {
        if let Ok(small) = u8::try_from(i) {
            self.out.extend([b'K', small]);
        } else if let Ok(medium) = u16::try_from(i) {
            self.out.push(b'M');
            self.out.extend(medium.to_le_bytes());
        } else if let Ok(word) = i32::try_from(i) {
            self.out.push(b'J');
            self.out.extend(word.to_le_bytes());
        } else {
            let bytes = i.to_le_bytes();
            self.out.extend([0x8A, 8]);
            self.out.extend(bytes);
        }
    }
}

/// `pickle.dumps(list(items), protocol=2)`
pub fn pickle_list(items: &[Item]) -> Vec<u8> {
    let mut pickler = Pickler::default();
    pickler.out.extend([0x80, 2, b']']);
    pickler.put();
    match items {
        [] => {}
        [single] => {
            pickler.item(single);
            pickler.out.push(b'a');
        }
        _ => {
            for chunk in items.chunks(1000) {
                pickler.out.push(b'(');
                chunk.iter().for_each(|i| pickler.item(i));
                pickler.out.push(b'e');
            }
        }
    }
    pickler.out.push(b'.');
    pickler.out
}

pub fn pickle_ints(values: &[i64]) -> Vec<u8> {
    let items: Vec<Item> = values.iter().copied().map(Item::Int).collect();
    pickle_list(&items)
}

/// Java serialization of a `byte[][]` holding `blobs`.
pub fn java_byte_arrays(blobs: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0xAC, 0xED, 0x00, 0x05];
    out.extend([0x75, 0x72, 0x00, 0x03]);
    out.extend(b"[[B");
    out.extend([0x4B, 0xFD, 0x19, 0x15, 0x67, 0x67, 0xDB, 0x37]);
    out.extend([0x02, 0x00, 0x00, 0x78, 0x70]);
    out.extend((blobs.len() as u32).to_be_bytes());
    for (i, blob) in blobs.iter().enumerate() {
        out.push(0x75);
        if i == 0 {
            out.extend([0x72, 0x00, 0x02]);
            out.extend(b"[B");
            out.extend([0xAC, 0xF3, 0x17, 0xF8, 0x06, 0x08, 0x54, 0xE0]);
            out.extend([0x02, 0x00, 0x00, 0x78, 0x70]);
        } else {
            // Handles: [[B descriptor, the outer array, then the [B descriptor.
            out.extend([0x71, 0x00, 0x7E, 0x00, 0x02]);
        }
        out.extend((blob.len() as u32).to_be_bytes());
        out.extend(blob);
    }
    out
}

/// Writes `NullWritable`/`BytesWritable` SequenceFiles.
pub struct SequenceFileWriter {
    out: Vec<u8>,
    records: usize,
    sync_every: usize,
}

impl SequenceFileWriter {
    /// A sync escape is written before every `sync_every`th record, never before the first.
    /// Zero disables them.
    pub fn new(sync_every: usize) -> Self {
        let mut out = HEADER.to_vec();
        out.extend(SYNC);
        Self {
            out,
            records: 0,
            sync_every,
        }
    }

    pub fn record(&mut self, payload: &[u8]) -> &mut Self {
        if self.sync_every > 0 && self.records > 0 && self.records % self.sync_every == 0 {
            self.out.extend(SYNC_ESCAPE);
            self.out.extend(SYNC);
        }
        let len = payload.len() as u32;
        self.out.extend((len + 4).to_be_bytes());
        self.out.extend([0; 4]);
        self.out.extend(len.to_be_bytes());
        self.out.extend(payload);
        self.records += 1;
        self
    }

    /// Write a sync escape now, as Hadoop does when a file is synced explicitly.
    pub fn sync(&mut self) -> &mut Self {
        self.out.extend(SYNC_ESCAPE);
        self.out.extend(SYNC);
        self
    }

    /// Offset at which the next byte will be written.
    pub fn position(&self) -> usize {
        self.out.len()
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }
}

/// A file as `saveAsPickleFile(batchSize)` writes `values`: `batch` values per pickle, up to
/// `per_record` pickles per record and a sync escape every `sync_every` records.
pub fn spark_pickle_file(
    values: &[Item],
    batch: usize,
    per_record: usize,
    sync_every: usize,
) -> Vec<u8> {
    let pickles: Vec<Vec<u8>> = values.chunks(batch.max(1)).map(pickle_list).collect();
    let mut writer = SequenceFileWriter::new(sync_every);
    for group in pickles.chunks(per_record.max(1)) {
        writer.record(&java_byte_arrays(group));
    }
    writer.finish()
}

/// `spark_pickle_file` for consecutive integers, with PySpark's defaults of ten values per
/// pickle and ten pickles per record.
pub fn spark_int_file(values: std::ops::Range<i64>, sync_every: usize) -> Vec<u8> {
    let items: Vec<Item> = values.map(Item::Int).collect();
    spark_pickle_file(&items, 10, 10, sync_every)
}
