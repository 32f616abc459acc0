use std::{env, str::FromStr, time::Duration};

use anyhow::Context;
use rust_decimal::Decimal;

/// Longest a signed-in session may live: one year.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub session_ttl_hours: i64,
    pub shipping_fee: Decimal,
    pub low_stock_threshold: i32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", env::var("APP_PORT").ok(), 3000)?;
        let session_ttl_hours = check_session_ttl(parse_or(
            "SESSION_TTL_HOURS",
            env::var("SESSION_TTL_HOURS").ok(),
            24,
        )?)?;
        let shipping_fee = parse_or(
            "SHIPPING_FEE",
            env::var("SHIPPING_FEE").ok(),
            Decimal::new(499, 2),
        )?;
        let low_stock_threshold = parse_or(
            "LOW_STOCK_THRESHOLD",
            env::var("LOW_STOCK_THRESHOLD").ok(),
            5,
        )?;

        if shipping_fee.is_sign_negative() {
            anyhow::bail!("SHIPPING_FEE must not be negative");
        }

        Ok(Self {
            database_url,
            jwt_secret,
            host,
            port,
            session_ttl_hours,
            shipping_fee,
            low_stock_threshold,
        })
    }

    /// Session lifetime as a std duration, for in-memory expiry sweeps.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours.unsigned_abs().saturating_mul(3600))
    }
}

fn check_session_ttl(hours: i64) -> anyhow::Result<i64> {
    if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        anyhow::bail!("SESSION_TTL_HOURS must be between 1 and {MAX_SESSION_TTL_HOURS}, got {hours}");
    }
    Ok(hours)
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key} {value:?}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_values_use_default() {
        assert_eq!(parse_or::<u16>("APP_PORT", None, 3000).unwrap(), 3000);
        assert_eq!(
            parse_or::<u16>("APP_PORT", Some("  ".into()), 3000).unwrap(),
            3000
        );
    }

    #[test]
    fn parses_decimal_fee() {
        let fee = parse_or("SHIPPING_FEE", Some("6.50".into()), Decimal::ZERO).unwrap();
        assert_eq!(fee, Decimal::new(650, 2));
    }

    #[test]
    fn rejects_garbage_instead_of_defaulting() {
        let err = parse_or::<u16>("APP_PORT", Some("eighty".into()), 3000).unwrap_err();
        assert!(err.to_string().contains("APP_PORT"));
    }

    #[test]
    fn session_ttl_must_be_positive_and_bounded() {
        assert_eq!(check_session_ttl(24).unwrap(), 24);
        assert_eq!(check_session_ttl(MAX_SESSION_TTL_HOURS).unwrap(), MAX_SESSION_TTL_HOURS);
        for bad in [0, -5, MAX_SESSION_TTL_HOURS + 1, i64::MAX] {
            let err = check_session_ttl(bad).unwrap_err();
            assert!(err.to_string().contains("SESSION_TTL_HOURS"));
        }
    }
}
