//! Logger bootstrap

use env_logger::Env;

use crate::resolver::truncate_chars;

/// Characters of a payload shown in log lines
pub const PREVIEW_CHARS: usize = 100;

/// Install `env_logger`, defaulting to `info` unless `RUST_LOG` says
/// otherwise. Safe to call more than once.
pub fn init()
{   let _ = env_logger::Builder::from_env(
      Env::default().default_filter_or("info")
    )
    .try_init();
}

/// Logger for test binaries; output is captured per test
pub fn init_for_tests()
{   let _ = env_logger::builder().is_test(true).try_init();
}

pub fn preview(text: &str) -> &str
{   truncate_chars(text, PREVIEW_CHARS)
}
