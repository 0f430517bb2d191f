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

//! A reader for the files PySpark's `RDD.saveAsPickleFile` writes, without a JVM or a Python
//! interpreter.
//!
//! Such a file is a Hadoop SequenceFile with `NullWritable` keys and `BytesWritable` values.
//! Every value is a Java-serialized `byte[][]`, and every `byte[]` in it is a pickled list of
//! the RDD's elements. Decoding goes through three layers:
//!
//! 1. [`container`] frames the SequenceFile records and checks the sync markers.
//! 2. [`javaobj`] walks the Java object stream and hands every `byte[]` to a [`javaobj::BlobSink`].
//! 3. [`pickle`] runs the pickle virtual machine over each of those byte arrays.
//!
//! [`bridge`] ties the last two together for one record payload and [`Reader`] drives the whole
//! stack, yielding one [`Value`](types::Value) per element of the RDD.
//!
//! # Reading a file
//!
//! ```no_run
//! # fn main() -> sparkpickle::SparkPickleResult<()> {
//! for value in sparkpickle::load_file("part-00000")? {
//!     println!("{value}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Use [`Reader::builder`] to report progress or to tighten the decoding limits:
//!
//! ```no_run
//! # use sparkpickle::Reader;
//! # fn main() -> sparkpickle::SparkPickleResult<()> {
//! let file = std::io::BufReader::new(std::fs::File::open("part-00000")?);
//! let mut progress = |offset: u64| eprintln!("decoded up to byte {offset}");
//! let reader = Reader::builder(file)
//!     .progress(&mut progress)
//!     .max_allocation_bytes(64 * 1024 * 1024)
//!     .build()?;
//! for value in reader {
//!     println!("{}", value?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # MSRV
//!
//! The current MSRV is 1.88.0.

pub mod bridge;
pub mod container;
pub mod error;
pub mod javaobj;
pub mod pickle;
mod reader;
pub mod types;
pub mod util;

pub use crate::{
    bridge::ProgressFn,
    container::SyncMarker,
    error::{Details, Error},
    reader::{Reader, load, load_file, load_with_progress, loads, loads_with_progress},
    types::Value,
    util::Limits,
};

/// A convenience type alias for `Result`s with `Error`s.
pub type SparkPickleResult<T> = Result<T, Error>;
