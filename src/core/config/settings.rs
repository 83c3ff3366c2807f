use std::time::Duration;

use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_drain_policy,
    parse_environment, parse_final_tasks, parse_positive_i32, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, CheckerSettings, ConfigError, CorsSettings, DatabaseSettings, DispatcherSettings,
    ExamSettings, RuntimeSettings, ServerHost, ServerPort, ServerSettings, Settings,
    TelemetrySettings,
};

pub(crate) const DEFAULT_API_TOKEN: &str = "CHANGE_ME";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("DTA_HOST", "0.0.0.0");
        let port = env_or_default("DTA_PORT", "5000");

        let environment =
            parse_environment(env_optional("DTA_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("DTA_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "DTA Grader");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");
        let api_token = env_or_default("API_TOKEN", DEFAULT_API_TOKEN);
        let readonly = env_optional("READONLY").map(|value| parse_bool(&value)).unwrap_or(false);

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "dta");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "dta_db");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "20"),
        )?;

        let checker_url = env_or_default("CHECKER_URL", "");
        let checker_timeout_seconds =
            parse_u64("CHECKER_TIMEOUT_SECONDS", env_or_default("CHECKER_TIMEOUT_SECONDS", "0"))?;
        let analyzer_url = env_optional("ANALYZER_URL");
        let analyzer_timeout_seconds = parse_u64(
            "ANALYZER_TIMEOUT_SECONDS",
            env_or_default("ANALYZER_TIMEOUT_SECONDS", "60"),
        )?;

        let dispatcher_enabled = !env_optional("DISABLE_BACKGROUND_WORKER")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let poll_interval_seconds = parse_u64(
            "DISPATCHER_POLL_INTERVAL_SECONDS",
            env_or_default("DISPATCHER_POLL_INTERVAL_SECONDS", "10"),
        )?;
        let drain_policy = parse_drain_policy(env_optional("DISPATCHER_DRAIN_POLICY"))?;

        let final_tasks = parse_final_tasks(env_optional("FINAL_TASKS"))?;
        let final_variants =
            parse_positive_i32("FINAL_VARIANTS", env_or_default("FINAL_VARIANTS", "40"))?;

        let log_level = env_or_default("DTA_LOG_LEVEL", "info");
        let json = env_optional("DTA_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str, api_token, readonly },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            checker: CheckerSettings {
                checker_url,
                checker_timeout_seconds,
                analyzer_url,
                analyzer_timeout_seconds,
            },
            dispatcher: DispatcherSettings {
                enabled: dispatcher_enabled,
                poll_interval_seconds,
                drain_policy,
            },
            exam: ExamSettings { final_tasks, final_variants },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn checker(&self) -> &CheckerSettings {
        &self.checker
    }

    pub(crate) fn dispatcher(&self) -> &DispatcherSettings {
        &self.dispatcher
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DISPATCHER_POLL_INTERVAL_SECONDS",
                value: String::from("0"),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: String::from("0"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.api.api_token.is_empty() || self.api.api_token == DEFAULT_API_TOKEN {
            return Err(ConfigError::MissingSecret("API_TOKEN"));
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.checker.checker_url.is_empty() {
            return Err(ConfigError::MissingSecret("CHECKER_URL"));
        }

        Ok(())
    }
}

impl CheckerSettings {
    pub(crate) fn checker_timeout(&self) -> Option<Duration> {
        (self.checker_timeout_seconds > 0).then(|| Duration::from_secs(self.checker_timeout_seconds))
    }
}

impl DispatcherSettings {
    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pending_queue::DrainPolicy;
    use crate::test_support;

    #[tokio::test]
    async fn load_uses_defaults_in_test_env() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.api().api_v1_str, "/api/v1");
        assert_eq!(settings.dispatcher().poll_interval(), Duration::from_secs(10));
        assert_eq!(settings.dispatcher().drain_policy, DrainPolicy::Full);
        assert_eq!(settings.exam().final_variants, 40);
        assert!(settings.checker().checker_timeout().is_none());
    }

    #[tokio::test]
    async fn strict_mode_rejects_default_token() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("DTA_STRICT_CONFIG", "1");
        std::env::set_var("API_TOKEN", DEFAULT_API_TOKEN);

        let err = Settings::load().expect_err("default token must be rejected");
        assert!(matches!(err, ConfigError::MissingSecret("API_TOKEN")));

        std::env::set_var("DTA_STRICT_CONFIG", "0");
        std::env::set_var("API_TOKEN", test_support::TEST_API_TOKEN);
    }

    #[tokio::test]
    async fn zero_poll_interval_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("DISPATCHER_POLL_INTERVAL_SECONDS", "0");

        let err = Settings::load().expect_err("zero interval");
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "DISPATCHER_POLL_INTERVAL_SECONDS", .. }
        ));

        std::env::remove_var("DISPATCHER_POLL_INTERVAL_SECONDS");
    }
}
