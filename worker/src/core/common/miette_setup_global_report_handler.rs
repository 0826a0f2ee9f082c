// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Global [miette](https://docs.rs/miette/latest/miette/index.html) report handler for
//! binaries built on this crate.
//!
//! The hook is only consulted when a [`miette::Report`] is rendered (for example when
//! `main() -> miette::Result<_>` returns an error), so the output width is resolved
//! lazily at that time. A worker usually runs with its stderr redirected to a file, so
//! the width comes from the `COLUMNS` environment variable when the supervisor sets it,
//! falling back to [`DEFAULT_REPORT_WIDTH`].

use miette::MietteHandlerOpts;

/// Width used to wrap rendered reports when `COLUMNS` is unset or invalid.
pub const DEFAULT_REPORT_WIDTH: usize = 100;

/// Installs the default report handler. Safe to call more than once; only the first call
/// wins.
pub fn setup_default_miette_global_report_handler(footer: &'static str) {
    miette::set_hook(Box::new(move |_report| {
        let width = report_width(std::env::var("COLUMNS").ok().as_deref());
        tracing::debug!(message = "miette::set_hook", width);
        Box::new(
            MietteHandlerOpts::new()
                .width(width)
                .wrap_lines(true)
                .context_lines(3)
                .tab_width(4)
                .break_words(true)
                .with_cause_chain()
                .footer(footer.to_string())
                .build(),
        )
    }))
    .ok();
}

fn report_width(columns: Option<&str>) -> usize {
    columns
        .and_then(|it| it.trim().parse::<usize>().ok())
        .filter(|it| *it > 0)
        .unwrap_or(DEFAULT_REPORT_WIDTH)
}
