//! Small macros shared across the crate.

/// Lazily parses an environment variable into a specified type. If the
/// environment variable is not set, or parsing fails, falls back to the
/// given default.
macro_rules! lazy_env_parse {
	($key:expr, $t:ty, $default:expr) => {
		once_cell::sync::Lazy::new(|| {
			std::env::var($key)
				.ok()
				.and_then(|s| s.parse::<$t>().ok())
				.unwrap_or($default)
		})
	};
}

pub(crate) use lazy_env_parse;
