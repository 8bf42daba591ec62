// Codec configuration (ambient stack): the few env-tunable knobs this core
// exposes, loaded the way the teacher's `RtmpServerConfiguration` loads --
// one `get_env_*` call per field, validated, logged and rejected on an
// invalid value. See SPEC_FULL.md §10.

use crate::constants::{DEFAULT_FRAME_SIZE, DEFAULT_MAX_BODY_LENGTH, MAX_FRAME_SIZE, MIN_FRAME_SIZE};
use crate::log::Logger;
use crate::log_error;
use crate::utils::get_env_u32;

const PING_TIMEOUT_DEFAULT_SECS: u32 = 60;
const MAX_PENDING_CALLS_DEFAULT: u32 = 1000;
const MAX_BODY_LENGTH_CEILING: u32 = u32::MAX;

/// The knobs the codec actually exposes, independent of anything
/// application-level (auth, stream naming, GOP caching) that sits above it.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecConfig {
    /// Chunk size applied to outbound frames and assumed for inbound frames
    /// until a `FrameSize` control message changes it.
    pub default_frame_size: usize,

    /// Cap on a single message's reassembled body (SPEC_FULL.md §5).
    pub max_body_length: usize,

    /// How many inbound bytes between automatic `BytesRead` acks. `0`
    /// disables acking until the peer sends a bandwidth message that sets it.
    pub bytes_read_interval: u32,

    /// Seconds of read silence the session controller tolerates before
    /// treating the connection as dead (teacher's `RTMP_PING_TIMEOUT`).
    pub ping_timeout_secs: u32,

    /// Bound on outstanding `PendingCall`s; protects against a peer that
    /// never replies to outbound invocations.
    pub max_pending_calls: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            default_frame_size: DEFAULT_FRAME_SIZE,
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
            bytes_read_interval: 0,
            ping_timeout_secs: PING_TIMEOUT_DEFAULT_SECS,
            max_pending_calls: MAX_PENDING_CALLS_DEFAULT as usize,
        }
    }
}

impl CodecConfig {
    /// Loads configuration from environment variables, falling back to
    /// `CodecConfig::default()` field-by-field. Logs and fails closed on an
    /// out-of-range value instead of silently clamping it.
    pub fn load_from_env(logger: &Logger) -> Result<CodecConfig, ()> {
        let defaults = CodecConfig::default();

        let default_frame_size =
            get_env_u32("RTMP_DEFAULT_FRAME_SIZE", defaults.default_frame_size as u32);
        if (default_frame_size as usize) < MIN_FRAME_SIZE
            || (default_frame_size as usize) > MAX_FRAME_SIZE
        {
            log_error!(
                logger,
                format!("RTMP_DEFAULT_FRAME_SIZE has an invalid value: {default_frame_size}")
            );
            return Err(());
        }

        let max_body_length_mb = get_env_u32(
            "RTMP_MAX_BODY_LENGTH_MB",
            (defaults.max_body_length / (1024 * 1024)) as u32,
        );
        let max_body_length = max_body_length_mb as usize * 1024 * 1024;
        if max_body_length == 0 || max_body_length_mb > MAX_BODY_LENGTH_CEILING / (1024 * 1024) {
            log_error!(
                logger,
                format!("RTMP_MAX_BODY_LENGTH_MB has an invalid value: {max_body_length_mb}")
            );
            return Err(());
        }

        let bytes_read_interval =
            get_env_u32("RTMP_BYTES_READ_INTERVAL", defaults.bytes_read_interval);

        let ping_timeout_secs = get_env_u32("RTMP_PING_TIMEOUT", defaults.ping_timeout_secs);
        if ping_timeout_secs == 0 {
            log_error!(logger, "RTMP_PING_TIMEOUT has an invalid value: 0");
            return Err(());
        }

        let max_pending_calls = get_env_u32(
            "RTMP_MAX_PENDING_CALLS",
            defaults.max_pending_calls as u32,
        );
        if max_pending_calls == 0 {
            log_error!(logger, "RTMP_MAX_PENDING_CALLS has an invalid value: 0");
            return Err(());
        }

        Ok(CodecConfig {
            default_frame_size: default_frame_size as usize,
            max_body_length,
            bytes_read_interval,
            ping_timeout_secs,
            max_pending_calls: max_pending_calls as usize,
        })
    }
}
