use anyhow::{bail, Context};
use serde::Deserialize;

/// One year. Keeps `now + ttl` well inside `OffsetDateTime`'s range.
const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

impl JwtConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_secret == self.refresh_secret {
            bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }
        for (key, minutes) in [
            ("JWT_TTL_MINUTES", self.ttl_minutes),
            ("JWT_REFRESH_TTL_MINUTES", self.refresh_ttl_minutes),
        ] {
            if !(1..=MAX_TTL_MINUTES).contains(&minutes) {
                bail!("{key} must be between 1 and {MAX_TTL_MINUTES}, got {minutes}");
            }
        }
        Ok(())
    }
}

/// Argon2 work factor.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub webhook_secret: String,
    pub tolerance_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub stripe: StripeConfig,
}

/// Unset means `default`; set but unparsable is an error.
fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {v:?}")),
        None => Ok(default),
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_or(key, std::env::var(key).ok(), default)
}

impl AppConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            access_secret: std::env::var("JWT_ACCESS_SECRET")
                .context("JWT_ACCESS_SECRET is not set")?,
            refresh_secret: std::env::var("JWT_REFRESH_SECRET")
                .context("JWT_REFRESH_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "authgate".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authgate-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 15)?,
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 30)?,
        };
        jwt.validate()?;

        // Defaults follow the OWASP argon2id baseline.
        let password = PasswordConfig {
            memory_kib: env_or("ARGON2_MEMORY_KIB", 19_456)?,
            iterations: env_or("ARGON2_ITERATIONS", 2)?,
            parallelism: env_or("ARGON2_PARALLELISM", 1)?,
        };

        let stripe = StripeConfig {
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .context("STRIPE_WEBHOOK_SECRET is not set")?,
            tolerance_secs: env_or("STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?,
        };
        if stripe.tolerance_secs < 0 {
            bail!("STRIPE_WEBHOOK_TOLERANCE_SECS must not be negative");
        }

        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080)?,
            database_url,
            jwt,
            password,
            stripe,
        })
    }
}
