//! Tracing subscriber setup for the experiment binary.

use tracing::Level;

/// Maps a `-v` count to a max level: 0 → info, 1 → debug, 2+ → trace.
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs a compact fmt subscriber as the global default.
///
/// Returns `false` if a global subscriber was already set (tests, embedding
/// applications); the existing one is kept.
pub fn init_tracing(verbosity: u8) -> bool {
    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_max_level(level_for_verbosity(verbosity))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for_verbosity(0), Level::INFO);
        assert_eq!(level_for_verbosity(1), Level::DEBUG);
        assert_eq!(level_for_verbosity(5), Level::TRACE);
    }
}
