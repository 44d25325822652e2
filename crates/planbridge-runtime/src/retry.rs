use std::time::Duration;

use chrono::{DateTime, Utc};

pub fn should_retry_status(status: u16) -> bool {
    status == 408 || status == 409 || status == 425 || status == 429 || status >= 500
}

pub fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// Exponential backoff from `base_delay_ms`, capped at 2^6 times the base.
pub fn next_backoff_ms(base_delay_ms: u64, attempt: usize) -> u64 {
    let shift = attempt.saturating_sub(1).min(6);
    base_delay_ms.max(1).saturating_mul(1_u64 << shift)
}

pub fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at
        .signed_duration_since(Utc::now())
        .num_milliseconds();
    if delay_ms <= 0 {
        return Some(0);
    }
    u64::try_from(delay_ms).ok()
}

/// Backoff for `attempt`, never shorter than a server-provided `Retry-After`.
pub fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after_ms: Option<u64>) -> Duration {
    let backoff_ms = next_backoff_ms(base_delay_ms, attempt);
    let delay_ms = match retry_after_ms {
        Some(retry_after_ms) => backoff_ms.max(retry_after_ms),
        None => backoff_ms,
    };
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use reqwest::header::{HeaderMap, HeaderValue};

    use super::{next_backoff_ms, parse_retry_after_ms, retry_delay, should_retry_status};

    #[test]
    fn unit_retry_status_selection_is_correct() {
        assert!(should_retry_status(429));
        assert!(should_retry_status(503));
        assert!(should_retry_status(408));
        assert!(!should_retry_status(400));
        assert!(!should_retry_status(401));
        assert!(!should_retry_status(404));
    }

    #[test]
    fn unit_backoff_doubles_per_attempt_and_caps() {
        assert_eq!(next_backoff_ms(200, 1), 200);
        assert_eq!(next_backoff_ms(200, 2), 400);
        assert_eq!(next_backoff_ms(200, 3), 800);
        assert_eq!(next_backoff_ms(200, 50), 200 * 64);
        assert_eq!(next_backoff_ms(0, 1), 1);
    }

    #[test]
    fn functional_parse_retry_after_accepts_seconds_and_dates() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        assert_eq!(parse_retry_after_ms(&headers), Some(3_000));

        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after_ms(&headers), None);

        let raw = (Utc::now() + chrono::Duration::seconds(2))
            .to_rfc2822()
            .replace("+0000", "GMT");
        headers.insert(
            "retry-after",
            HeaderValue::from_str(raw.as_str()).expect("retry-after date"),
        );
        let delay = parse_retry_after_ms(&headers).expect("delay from date");
        assert!(delay <= 2_500, "delay should be close to 2s, got {delay}");
    }

    #[test]
    fn regression_retry_delay_honors_retry_after_floor() {
        assert_eq!(retry_delay(200, 1, None), Duration::from_millis(200));
        assert_eq!(retry_delay(200, 3, Some(100)), Duration::from_millis(800));
        assert_eq!(retry_delay(200, 1, Some(1_500)), Duration::from_millis(1_500));
    }
}
