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

//! Prints every value stored in a file written by `RDD.saveAsPickleFile`, followed by a summary.

use anyhow::Context;
use clap::Parser;
use log::{LevelFilter, info};
use sparkpickle::{ProgressFn, Reader, Value};
use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::PathBuf,
};

#[derive(Parser)]
#[command(name = "sparkpickle", version, about = "Print the contents of a PySpark pickle file")]
struct Cli {
    /// Path to one part file of the saved RDD.
    file: PathBuf,

    /// Print each value as a line of JSON instead of its Python repr.
    #[arg(long)]
    json: bool,

    /// Report the decoded byte offset on stderr after every pickled batch.
    #[arg(long)]
    progress: bool,

    /// Raise the log level; repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let file = File::open(&cli.file)
        .with_context(|| format!("Failed to open {}", cli.file.display()))?;
    let mut report = |offset: u64| eprintln!("{offset}");
    let progress: Option<&mut ProgressFn<'_>> = if cli.progress {
        Some(&mut report)
    } else {
        None
    };
    let reader = Reader::builder(BufReader::new(file))
        .maybe_progress(progress)
        .build()
        .with_context(|| format!("{} is not a PySpark pickle file", cli.file.display()))?;
    info!("Reading {} (sync marker {:?})", cli.file.display(), reader.sync_marker());

    let mut out = BufWriter::new(io::stdout().lock());
    let mut count = 0u64;
    let mut last_type = None;
    for value in reader {
        let value = value.with_context(|| format!("Failed after {count} values"))?;
        print_value(&mut out, &value, cli.json)?;
        last_type = Some(value.type_name());
        count += 1;
    }
    writeln!(out, "{}", "-".repeat(80))?;
    writeln!(
        out,
        "Overall: {count} objects of type {}",
        last_type.unwrap_or("None")
    )?;
    out.flush()?;
    Ok(())
}

fn print_value(out: &mut impl Write, value: &Value, json: bool) -> anyhow::Result<()> {
    if json {
        serde_json::to_writer(&mut *out, value)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{value}")?;
    }
    Ok(())
}
