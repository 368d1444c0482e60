//! Session tuning knobs.
//!
//! Defaults match production values; tests dial everything down to keep
//! paused-clock runs short.

use std::time::Duration;

use tidepool_media::EncodeOptions;
use tidepool_shared::constants;
use tidepool_sync::LivenessConfig;

/// Tuning for one chatroom session.
#[derive(Debug, Clone)]
pub struct ChatroomConfig {
    /// Quiet window for coalescing feed snapshots after a burst of
    /// updates.  Default 50ms.
    pub debounce_window: Duration,

    /// How long an empty feed may stay in its loading phase before
    /// conceding the room really is empty.  Default 4s.
    pub loading_grace: Duration,

    /// How long a posted notice stays active.  Default 3s.
    pub notice_ttl: Duration,

    /// Liveness tracker tuning.
    pub liveness: LivenessConfig,

    /// Image encode tuning.
    pub encode: EncodeOptions,
}

impl Default for ChatroomConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(constants::DEBOUNCE_WINDOW_MS),
            loading_grace: Duration::from_millis(constants::LOADING_GRACE_MS),
            notice_ttl: Duration::from_millis(constants::NOTICE_TTL_MS),
            liveness: LivenessConfig::default(),
            encode: EncodeOptions::default(),
        }
    }
}
