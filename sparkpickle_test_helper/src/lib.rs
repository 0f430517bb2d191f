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

pub mod fixture;
pub mod logger;

/// The result type for tests.
///
/// Any error type that converts into `anyhow::Error` can be propagated with `?`.
pub type TestResult = anyhow::Result<()>;

/// Stack size Rust gives spawned threads unless told otherwise.
pub const DEFAULT_THREAD_STACK: usize = 2 * 1024 * 1024;

/// Install the capturing logger. Safe to call from every test.
pub fn init() {
    logger::install();
}

/// Run `f` on a fresh thread with the default stack size and hand back its result.
pub fn on_default_thread_stack<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::Builder::new()
        .stack_size(DEFAULT_THREAD_STACK)
        .spawn(f)
        .expect("failed to spawn a test thread")
        .join()
        .expect("test thread panicked")
}
