use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Runtime settings, read from the environment (and `.env` if present)
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub bcrypt_cost: u32,
    pub admin: Option<AdminAccount>,
}

/// Staff account created at startup when it does not exist yet
#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Self {
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            log::warn!("JWT_SECRET not set, using default (not secure for production!)");
            "default_jwt_secret_change_me".to_string()
        });

        let admin = match (
            env::var("ADMIN_USERNAME").ok(),
            env::var("ADMIN_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => {
                let email = env::var("ADMIN_EMAIL")
                    .unwrap_or_else(|_| format!("{}@photofeed.local", username));
                Some(AdminAccount {
                    username,
                    email,
                    password,
                })
            }
            _ => None,
        };

        Self {
            port: try_load("PORT", 8000),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "photofeed.db".to_string()),
            jwt_secret,
            access_token_minutes: try_load("ACCESS_TOKEN_MINUTES", 60),
            refresh_token_days: try_load("REFRESH_TOKEN_DAYS", 1),
            bcrypt_cost: bcrypt_cost(try_load("BCRYPT_COST", bcrypt::DEFAULT_COST)),
            admin,
        }
    }
}

const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// bcrypt rejects costs outside 4..=31 at hash time
fn bcrypt_cost(cost: u32) -> u32 {
    if BCRYPT_COST_RANGE.contains(&cost) {
        return cost;
    }
    let clamped = cost.clamp(*BCRYPT_COST_RANGE.start(), *BCRYPT_COST_RANGE.end());
    log::warn!("BCRYPT_COST {} out of range, using {}", cost, clamped);
    clamped
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            log::warn!("Invalid {} value {:?}: {}, using default {}", key, raw, e, default);
            default
        }),
        Err(_) => default,
    }
}
