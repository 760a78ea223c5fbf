pub mod nav;

// ============================================================================
// Profiling Macros
// ============================================================================

/// Log a message every 100 navigation ticks when the `perf_stats` feature is enabled.
///
/// Takes anything with a `tick: u64` field (normally `Res<NavClock>`).
/// Without the feature this expands to an empty block and the arguments are
/// never evaluated.
///
/// # Example
/// ```ignore
/// profile_log!(clock, "Planned {} agents", planned);
/// ```
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($clock:expr, $($arg:tt)*) => {
        if $clock.tick % 100 == 0 {
            bevy::prelude::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($clock:expr, $($arg:tt)*) => {};
}
