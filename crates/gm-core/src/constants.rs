//! Defaults and well-known names shared across modules.

/// Upstream relays the bot listens on and publishes to
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://wot.swarmstr.com",
    "wss://nos.lol",
    "wss://nostr.mom",
    "wss://nostr.wine",
    "wss://relay.damus.io",
    "wss://wot.utxo.one",
];

/// Public URL of the GM relay itself, quoted when a user has no history
pub const RELAY_URL: &str = "wss://gm.swarmstr.com";

/// Browsable listing of every stored note
pub const VIEW_URL: &str = "https://nostrrr.com/relay/gm.swarmstr.com";

pub const ADMISSION_KEYWORD: &str = "gm";

// Environment
pub const ENV_PRIVATE_KEY: &str = "GM_BOT_PRIVATE_KEY";
pub const ENV_KEY_PASSWORD: &str = "GM_BOT_KEY_PASSWORD";
pub const ENV_LOG_FILE: &str = "GM_LOG_FILE";

// Timeouts (seconds)
pub const QUERY_TIMEOUT_SECS: u64 = 5;
pub const DEDUP_TIMEOUT_SECS: u64 = 10;
pub const PUBLISH_TIMEOUT_SECS: u64 = 10;
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
pub const RESUBSCRIBE_DELAY_SECS: u64 = 5;

/// How far back the live mention subscription starts
pub const LOOKBACK_SECS: u64 = 24 * 60 * 60;

pub const WORKERS: usize = 4;
pub const ANSWERED_CACHE_SIZE: usize = 10_000;

// Nostr event kinds
pub mod kinds {
    /// Text note: the monitored kind, and the kind of every reply
    pub const TEXT_NOTE: u16 = 1;
    /// Follow list (NIP-02)
    pub const CONTACT_LIST: u16 = 3;
}
