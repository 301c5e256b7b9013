//! Server configuration via CLI args and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use speech_gateway_service::ServiceConfig;

/// HTTP gateway for speech synthesis and recognition.
#[derive(Parser, Debug, Clone)]
#[command(name = "speech-gateway", version, about)]
pub struct Config {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0", env = "SPEECH_GATEWAY_HOST")]
    pub host: String,

    /// Bind port.
    #[arg(long, default_value_t = 8000, env = "SPEECH_GATEWAY_PORT")]
    pub port: u16,

    /// CORS allowed origins (comma-separated). Empty for no CORS.
    #[arg(long, env = "SPEECH_GATEWAY_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Header carrying the client IP, set by a trusted reverse proxy.
    #[arg(long, default_value = "x-real-ip", env = "SPEECH_GATEWAY_IP_HEADER")]
    pub ip_header: String,

    /// Header carrying the caller's access key.
    #[arg(long, default_value = "x-api-key", env = "SPEECH_GATEWAY_KEY_HEADER")]
    pub key_header: String,

    /// Access keys exempt from quotas (comma-separated). When non-empty,
    /// callers without a listed key are rejected.
    #[arg(long, env = "SPEECH_GATEWAY_ALLOW_LIST", value_delimiter = ',')]
    pub allow_list: Vec<String>,

    /// Admissions per caller per route per minute (0 = unlimited).
    #[arg(long, default_value_t = 5, env = "SPEECH_GATEWAY_ROUTE_LIMIT")]
    pub route_limit_per_minute: u64,

    /// Admissions per caller per day across all routes (0 = unlimited).
    #[arg(long, default_value_t = 100, env = "SPEECH_GATEWAY_DAILY_LIMIT")]
    pub daily_limit: u64,

    /// Interval between stale quota counter sweeps, in seconds.
    #[arg(long, default_value_t = 60, env = "SPEECH_GATEWAY_QUOTA_SWEEP_INTERVAL")]
    pub quota_sweep_interval: u64,

    /// Maximum text length for synthesis, in characters.
    #[arg(long, default_value_t = 2000, env = "SPEECH_GATEWAY_TEXT_LIMIT")]
    pub text_length_limit: usize,

    /// Maximum request body size for uploads, in bytes.
    #[arg(long, default_value_t = 314_572_800, env = "SPEECH_GATEWAY_UPLOAD_LIMIT")]
    pub upload_size_limit: usize,

    /// Directory for request-scoped temp files. Defaults to a
    /// `speech-gateway` directory under the OS temp dir.
    #[arg(long, env = "SPEECH_GATEWAY_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Path to the ffmpeg binary.
    #[arg(long, default_value = "ffmpeg", env = "SPEECH_GATEWAY_FFMPEG")]
    pub ffmpeg_path: String,

    /// Timeout for each external call (ffmpeg, Azure), in seconds.
    #[arg(long, default_value_t = 30, env = "SPEECH_GATEWAY_COLLABORATOR_TIMEOUT")]
    pub collaborator_timeout: u64,

    /// Azure Speech subscription key.
    #[arg(long, env = "SPEECH_GATEWAY_AZURE_KEY", hide_env_values = true)]
    pub azure_key: String,

    /// Azure Speech region (e.g. "eastasia").
    #[arg(long, env = "SPEECH_GATEWAY_AZURE_REGION")]
    pub azure_region: String,

    /// Voice used when a synthesis request names none.
    #[arg(long, default_value = "zh-CN-XiaoyiNeural", env = "SPEECH_GATEWAY_VOICE")]
    pub default_voice: String,

    /// Recognition language.
    #[arg(long, default_value = "zh-CN", env = "SPEECH_GATEWAY_LANGUAGE")]
    pub recognition_language: String,

    /// Log level.
    #[arg(long, default_value = "info", env = "SPEECH_GATEWAY_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: "text" or "json".
    #[arg(long, default_value = "text", env = "SPEECH_GATEWAY_LOG_FORMAT")]
    pub log_format: String,
}

impl Config {
    /// Parses configuration from CLI args and env vars.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("speech-gateway"))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.quota_sweep_interval.max(1))
    }

    /// The subset handed to the service layer.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            ip_header: self.ip_header.clone(),
            key_header: self.key_header.clone(),
            allow_list: self.allow_list.clone(),
            route_limit_per_minute: self.route_limit_per_minute,
            daily_limit: self.daily_limit,
            text_length_limit: self.text_length_limit,
            temp_dir: self.temp_dir(),
            collaborator_timeout: Duration::from_secs(self.collaborator_timeout),
            default_voice: self.default_voice.clone(),
            recognition_language: self.recognition_language.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 5] = [
        "speech-gateway",
        "--azure-key",
        "secret",
        "--azure-region",
        "eastasia",
    ];

    #[test]
    fn defaults_apply() {
        let config = Config::try_parse_from(REQUIRED).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.route_limit_per_minute, 5);
        assert_eq!(config.daily_limit, 100);
        assert_eq!(config.text_length_limit, 2000);
        assert!(config.allow_list.is_empty());

        let service = config.service_config();
        assert_eq!(service.ip_header, "x-real-ip");
        assert_eq!(service.default_voice, "zh-CN-XiaoyiNeural");
        assert_eq!(service.collaborator_timeout, Duration::from_secs(30));
        assert!(service.temp_dir.ends_with("speech-gateway"));
    }

    #[test]
    fn lists_are_comma_separated() {
        let args = REQUIRED
            .into_iter()
            .chain(["--allow-list", "k1,k2", "--cors-origins", "https://a.example"]);
        let config = Config::try_parse_from(args).unwrap();
        assert_eq!(config.allow_list, vec!["k1", "k2"]);
        assert_eq!(config.cors_origins, vec!["https://a.example"]);
    }

    #[test]
    fn sweep_interval_is_never_zero() {
        let args = REQUIRED
            .into_iter()
            .chain(["--quota-sweep-interval", "0"]);
        let config = Config::try_parse_from(args).unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }
}
