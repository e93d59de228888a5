use std::env;
use std::fmt;
use std::time::Duration;

use crate::cli::Cli;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATABASE_URL: &str = "sqlite://weather_subscriptions.db";
const DEFAULT_WEATHER_API_URL: &str = "https://api.weatherapi.com/v1";
const DEFAULT_WEATHER_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub weather: WeatherConfig,
    pub smtp: SmtpConfig,
    /// Public base URL used to build confirm/unsubscribe links.
    pub website_url: String,
}

#[derive(Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    pub api_url: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `from_env` passes `std::env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, String> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| format!("{} is required", key))
        };

        let server_port = parse_or(&lookup, "SERVER_PORT", DEFAULT_PORT)?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let weather = WeatherConfig {
            api_key: required("WEATHER_API_KEY")?,
            api_url: lookup("WEATHER_API_URL")
                .unwrap_or_else(|| DEFAULT_WEATHER_API_URL.to_string()),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "WEATHER_TIMEOUT_SECONDS",
                DEFAULT_WEATHER_TIMEOUT_SECONDS,
            )?),
        };

        if weather.timeout.is_zero() {
            return Err("WEATHER_TIMEOUT_SECONDS must be greater than zero".to_string());
        }

        let smtp = SmtpConfig {
            host: required("SMTP_HOST")?,
            port: parse_or(&lookup, "SMTP_PORT", DEFAULT_SMTP_PORT)?,
            username: required("SMTP_USERNAME")?,
            password: required("SMTP_PASSWORD")?,
            from_email: required("SMTP_FROM_EMAIL")?,
        };

        let website_url = required("WEBSITE_URL")?;
        if !website_url.starts_with("http://") && !website_url.starts_with("https://") {
            return Err(format!("Invalid WEBSITE_URL: {}", website_url));
        }

        Ok(Self {
            server_port,
            database_url,
            weather,
            smtp,
            website_url,
        })
    }

    /// Apply command-line overrides on top of the environment.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(port) = cli.port {
            self.server_port = port;
        }
        if let Some(database_url) = &cli.database_url {
            self.database_url = database_url.clone();
        }
        self
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, String>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

// Secrets stay out of the startup log line.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_port", &self.server_port)
            .field("database_url", &self.database_url)
            .field("weather_api_url", &self.weather.api_url)
            .field("weather_api_key", &"<redacted>")
            .field("weather_timeout", &self.weather.timeout)
            .field("smtp_host", &self.smtp.host)
            .field("smtp_port", &self.smtp.port)
            .field("smtp_username", &self.smtp.username)
            .field("smtp_password", &"<redacted>")
            .field("smtp_from_email", &self.smtp.from_email)
            .field("website_url", &self.website_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("WEATHER_API_KEY", "weather-key"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "mailer"),
            ("SMTP_PASSWORD", "s3cret"),
            ("SMTP_FROM_EMAIL", "noreply@example.com"),
            ("WEBSITE_URL", "https://weather.example.com"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, String> {
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_are_applied() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.weather.api_url, DEFAULT_WEATHER_API_URL);
        assert_eq!(config.weather.timeout, Duration::from_secs(10));
        assert_eq!(config.smtp.port, 587);
    }

    #[test]
    fn missing_required_key_is_reported_by_name() {
        let mut vars = base_env();
        vars.remove("WEATHER_API_KEY");
        assert_eq!(load(&vars).unwrap_err(), "WEATHER_API_KEY is required");
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let mut vars = base_env();
        vars.insert("SERVER_PORT", "eighty");
        assert_eq!(load(&vars).unwrap_err(), "SERVER_PORT must be a valid number");
    }

    #[test]
    fn website_url_must_be_http() {
        let mut vars = base_env();
        vars.insert("WEBSITE_URL", "weather.example.com");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", load(&base_env()).unwrap());
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("weather-key"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn cli_overrides_env() {
        let cli = Cli {
            port: Some(9000),
            database_url: Some("sqlite::memory:".to_string()),
        };
        let config = load(&base_env()).unwrap().with_cli(&cli);
        assert_eq!(config.server_port, 9000);
        assert_eq!(config.database_url, "sqlite::memory:");
    }
}
