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

use criterion::{Criterion, criterion_group, criterion_main};
use sparkpickle::{Value, loads};
use sparkpickle_test_helper::fixture::{Item, spark_int_file, spark_pickle_file};
use std::{hint::black_box, time::Duration};

fn read(bytes: &[u8]) -> Vec<Value> {
    loads(black_box(bytes)).unwrap()
}

fn bench_read(c: &mut Criterion, bytes: Vec<u8>, name: &str) {
    c.bench_function(name, |b| b.iter(|| read(&bytes)));
}

fn bench_ints_1_000(c: &mut Criterion) {
    bench_read(c, spark_int_file(0..1_000, 10), "ints 1_000");
}

fn bench_ints_100_000(c: &mut Criterion) {
    bench_read(c, spark_int_file(0..100_000, 10), "ints 100_000");
}

fn bench_tuples_10_000(c: &mut Criterion) {
    let items: Vec<Item> = (0..10_000)
        .map(|i| {
            Item::Tuple(vec![
                Item::Str(format!("key-{i}")),
                Item::Float(i as f64 / 3.0),
                Item::Bytes(vec![(i % 256) as u8; 16]),
            ])
        })
        .collect();
    bench_read(c, spark_pickle_file(&items, 10, 10, 10), "tuples 10_000");
}

criterion_group!(benches, bench_ints_1_000, bench_tuples_10_000);

criterion_group!(
    name = long_benches;
    config = Criterion::default().sample_size(20).measurement_time(Duration::from_secs(10));
    targets = bench_ints_100_000
);

criterion_main!(benches, long_benches);
