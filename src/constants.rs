/// Centralized constants for findstream
pub mod constants {
    /// Directory name for project-local findstream settings
    pub const FINDSTREAM_DIR_NAME: &str = ".findstream";

    /// Configuration filename
    pub const CONFIG_FILENAME: &str = "config.toml";

    /// Global config directory name (in user config directory)
    pub const GLOBAL_CONFIG_DIR_NAME: &str = "findstream";

    /// Server used when no configuration names one
    pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

    /// Endpoint receiving streaming search requests
    pub const DEFAULT_SEARCH_PATH: &str = "/api/find-replace/search";

    /// Endpoint receiving CSV export requests
    pub const DEFAULT_EXPORT_PATH: &str = "/api/find-replace/export";

    /// Overall lifetime of one stream session, connect included
    pub const SEARCH_TIMEOUT_MS: u64 = 300_000;

    /// Status reported for a session that ran out of time
    pub const TIMEOUT_STATUS: u16 = 408;

    /// Status reported for connectivity failures (no response at all)
    pub const NETWORK_STATUS: u16 = 0;

    /// Result cap applied to interactive searches
    pub const INTERACTIVE_MAX_RESULTS: u32 = 10_000;

    /// Events buffered between the reader task and the consumer
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

    /// Suffix of the problem `type` the server uses for oversized result sets
    pub const RESULT_SET_TOO_LARGE: &str = "RESULT_SET_TOO_LARGE";

    /// Prefix of the suggested export filename
    pub const CSV_FILENAME_PREFIX: &str = "find-results";

    /// Environment variable overriding the configured server
    pub const SERVER_URL_ENV: &str = "FINDSTREAM_SERVER_URL";

    /// Environment variable overriding the configured bearer token
    pub const TOKEN_ENV: &str = "FINDSTREAM_TOKEN";

    /// Accept header for the streaming search
    pub const EVENT_STREAM_MIME: &str = "text/event-stream";

    /// Accept header for the export
    pub const CSV_MIME: &str = "text/csv";
}
