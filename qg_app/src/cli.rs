/// Provider name from the first positional argument, lowercased
pub fn get_provider(default: &str) -> String {
    std::env::args().skip(1).find(|arg| !arg.starts_with("--")).map_or_else(|| default.to_string(), |provider| provider.to_lowercase())
}

/// Whether `--flag` was passed anywhere on the command line
pub fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg.strip_prefix("--") == Some(flag))
}
