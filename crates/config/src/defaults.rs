pub fn default_environment() -> super::Environment {
    super::Environment::Prod
}

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_http_port() -> u16 {
    8087
}

pub fn default_quote_field() -> String {
    "PX_LAST".to_string()
}

pub fn default_timeout_ms() -> u64 {
    5000
}

pub fn default_max_batch_size() -> usize {
    25
}

pub fn default_max_concurrency() -> usize {
    8
}

pub fn default_retry_backoff_ms() -> u64 {
    250
}

pub fn default_ttl_seconds() -> u64 {
    60
}

pub fn default_sweep_interval_seconds() -> u64 {
    30
}

pub fn default_deltas() -> Vec<u8> {
    vec![25, 10]
}

pub fn default_tenors() -> Vec<String> {
    ["1W", "1M", "2M", "3M", "6M", "1Y"]
        .iter()
        .map(|t| t.to_string())
        .collect()
}

pub fn default_max_age_seconds() -> u64 {
    60
}

/// 0 disables the server-side deadline; callers can still pass `deadline_ms`
pub fn default_request_deadline_ms() -> u64 {
    0
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_metrics_port() -> u16 {
    9187
}
