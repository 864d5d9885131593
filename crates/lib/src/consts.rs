/// Application name used for state directories and lock metadata.
pub const APP_NAME: &str = "converge";

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "CONVERGE_STATE_DIR";

/// File name of the persisted report from the most recent run.
pub const LAST_REPORT_FILENAME: &str = "last-run.json";

/// Detail recorded for resources that never started because the run deadline passed.
pub const TIMEOUT_DETAIL: &str = "run timeout exceeded";
