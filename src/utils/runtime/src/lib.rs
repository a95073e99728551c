// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configures logging for Spyglass binaries and tests.

use tracing::Level;
use tracing_subscriber::filter;
use tracing_subscriber::prelude::*;

/// Log targets for all Spyglass crates. When new crates are added and
/// DEBUG level logs are needed, add them here.
fn configure_spyglass_targets(targets: filter::Targets) -> filter::Targets {
    targets
        .with_target("spyglass_storage", Level::DEBUG)
        .with_target("spyglass_query", Level::DEBUG)
        .with_target("spyglass_source", Level::INFO)
        .with_target("spyglass_common", Level::INFO)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoggerSettings {
    /// Enable colorful output in console.
    pub colorful: bool,
    /// Log everything at DEBUG, overriding the per-crate targets.
    pub verbose: bool,
}

/// Set up the global tracing subscriber. Call once at process start;
/// a second call panics, so tests use [`init_for_test`] instead.
pub fn init_logger(settings: LoggerSettings) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(settings.colorful);
    let targets = if settings.verbose {
        filter::Targets::new().with_default(Level::DEBUG)
    } else {
        configure_spyglass_targets(filter::Targets::new().with_default(Level::WARN))
    };
    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(targets))
        .init();
}

/// Best-effort logger for tests: ignores the error when another test
/// already installed one.
pub fn init_for_test() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_test_writer()
        .with_ansi(false);
    let targets = configure_spyglass_targets(filter::Targets::new().with_default(Level::WARN));
    let _ = tracing_subscriber::registry()
        .with(fmt_layer.with_filter(targets))
        .try_init();
}
