// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging setup based on [`logforth`].
//!
//! The filter defaults to `layercast=debug,info` and can be overridden
//! through the `RUST_LOG` environment variable.

use logforth::color::LevelColor;
use logforth::filter::EnvFilter;
use logforth::{Layout, append};

/// Default directives if `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "layercast=debug,info";

/// Prints only the colored level and the message.
#[derive(Clone, Copy, Debug)]
struct MinimalLayout;

impl Layout for MinimalLayout {
    fn format(
        &self,
        record: &log::Record,
        _: &[Box<dyn logforth::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let colors = LevelColor::default();
        let level = colors.colorize_record_level(false, record.level());
        let message = record.args();
        Ok(format!("{level:>5} {message}").into_bytes())
    }
}

/// Logs to stderr with a minimal layout.
pub fn enable_logforth() {
    install(append::Stderr::default().with_layout(MinimalLayout));
}

/// Logs to stderr with the default `logforth` layout, including timestamps.
pub fn enable_logforth_stderr() {
    install(append::Stderr::default());
}

fn install<A: logforth::Append>(to_append: A) {
    let filter = EnvFilter::from_default_env_or(DEFAULT_FILTER);
    logforth::builder()
        .dispatch(|d| d.filter(filter).append(to_append))
        .apply();
}
