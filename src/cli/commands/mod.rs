use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        PossibleValuesParser, ValueParser,
    },
    Arg, ColorChoice, Command,
};
use url::Url;

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn validator_url() -> ValueParser {
    ValueParser::from(move |url: &str| -> std::result::Result<Url, String> {
        let parsed = Url::parse(url).map_err(|e| e.to_string())?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(format!("unsupported scheme: {scheme}")),
        }
    })
}

pub fn validator_path() -> ValueParser {
    ValueParser::from(move |path: &str| -> std::result::Result<String, String> {
        if path.starts_with('/') {
            Ok(path.to_string())
        } else {
            Err("path must start with '/'".to_string())
        }
    })
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    Command::new("garita")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("GARITA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("users-file")
                .short('u')
                .long("users-file")
                .help("JSON file with the user directory")
                .env("GARITA_USERS_FILE")
                .required(true),
        )
        .arg(
            Arg::new("clients-file")
                .short('c')
                .long("clients-file")
                .help("JSON file with the registered clients")
                .env("GARITA_CLIENTS_FILE"),
        )
        .arg(
            Arg::new("sms-webhook-url")
                .long("sms-webhook-url")
                .help("SMS gateway webhook, codes are only logged when unset")
                .env("GARITA_SMS_WEBHOOK_URL")
                .value_parser(validator_url()),
        )
        .arg(
            Arg::new("login-path")
                .long("login-path")
                .help("Path of the form login endpoint")
                .default_value("/login")
                .env("GARITA_LOGIN_PATH")
                .value_parser(validator_path()),
        )
        .arg(
            Arg::new("image-code-length")
                .long("image-code-length")
                .help("Digits in an image code")
                .default_value("4")
                .env("GARITA_IMAGE_CODE_LENGTH")
                .value_parser(clap::value_parser!(u8).range(1..=10)),
        )
        .arg(
            Arg::new("image-code-ttl")
                .long("image-code-ttl")
                .help("Image code lifetime in seconds")
                .default_value("60")
                .env("GARITA_IMAGE_CODE_TTL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("sms-code-length")
                .long("sms-code-length")
                .help("Digits in an SMS code")
                .default_value("6")
                .env("GARITA_SMS_CODE_LENGTH")
                .value_parser(clap::value_parser!(u8).range(1..=10)),
        )
        .arg(
            Arg::new("sms-code-ttl")
                .long("sms-code-ttl")
                .help("SMS code lifetime in seconds")
                .default_value("60")
                .env("GARITA_SMS_CODE_TTL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("max-sessions")
                .long("max-sessions")
                .help("Concurrent sessions allowed per account")
                .default_value("1")
                .env("GARITA_MAX_SESSIONS")
                .value_parser(clap::value_parser!(u16).range(1..)),
        )
        .arg(
            Arg::new("session-policy")
                .long("session-policy")
                .help("What a login over the session limit does: reject it, or evict the oldest session")
                .default_value("reject")
                .env("GARITA_SESSION_POLICY")
                .value_parser(PossibleValuesParser::new(["reject", "evict"])),
        )
        .arg(
            Arg::new("session-ttl")
                .long("session-ttl")
                .help("Idle session lifetime in seconds")
                .default_value("1800")
                .env("GARITA_SESSION_TTL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("session-invalid-url")
                .long("session-invalid-url")
                .help("Where requests with an ended session are redirected")
                .default_value("/session/invalid")
                .env("GARITA_SESSION_INVALID_URL"),
        )
        .arg(
            Arg::new("client-credentials")
                .long("client-credentials")
                .help("Whether logins must present Basic client credentials")
                .default_value("optional")
                .env("GARITA_CLIENT_CREDENTIALS")
                .value_parser(PossibleValuesParser::new(["optional", "required"])),
        )
        .arg(
            Arg::new("token-ttl")
                .long("token-ttl")
                .help("Access token lifetime in seconds")
                .default_value("3600")
                .env("GARITA_TOKEN_TTL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("GARITA_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
