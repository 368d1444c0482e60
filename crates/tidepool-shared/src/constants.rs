/// Path segment of the shared message collection.
pub const MESSAGES_PATH: &str = "chatroom/messages";

/// Path segment of the shared image collection.
pub const IMAGES_PATH: &str = "chatroom/images";

/// Reserved node written and read back by liveness probing.
/// Never rendered; the leading underscore keeps it out of user paths.
pub const PROBE_PATH: &str = "chatroom/_probe";

/// Peer id asserted into the reachable set by a successful probe.
pub const PROBE_PEER_ID: &str = "#probe";

/// Raw upload cap before encoding (5 MiB).
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Encoded image budget after compression, in KiB.
pub const MAX_ENCODED_KB: usize = 200;

/// Longest edge of an encoded image, in pixels.
pub const MAX_IMAGE_DIMENSION: u32 = 500;

/// Trailing window for coalescing snapshot rebuilds.
pub const DEBOUNCE_WINDOW_MS: u64 = 50;

/// How long the initial load may sit in the loading phase with no data
/// before the empty state is shown anyway.
pub const LOADING_GRACE_MS: u64 = 4_000;

/// Interval between liveness probe round-trips.
pub const PROBE_INTERVAL_MS: u64 = 2_000;

/// Total probe attempts before probing stops for the session.
pub const PROBE_ATTEMPTS: u32 = 5;

/// Timeout for a single probe write or read.
pub const PROBE_TIMEOUT_MS: u64 = 1_000;

/// Delay before an emptied peer set demotes the status to local-only.
pub const DEMOTE_GRACE_MS: u64 = 500;

/// How long a transient user-facing notice stays active.
pub const NOTICE_TTL_MS: u64 = 3_000;

/// Build the full node path for one record inside a collection.
pub fn record_path(collection: &str, id: &str) -> String {
    format!("{collection}/{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_path_joins_segments() {
        assert_eq!(record_path(MESSAGES_PATH, "m1"), "chatroom/messages/m1");
    }
}
