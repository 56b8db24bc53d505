use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

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

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("custode")
        .about("Union portal session agent")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("CUSTODE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("portal-url")
                .long("portal-url")
                .help("Base URL of the union portal")
                .default_value("https://union.clubgg.com")
                .env("CUSTODE_PORTAL_URL"),
        )
        .arg(
            Arg::new("login-id")
                .long("login-id")
                .help("Portal login id")
                .env("CUSTODE_LOGIN_ID")
                .required(true),
        )
        .arg(
            Arg::new("login-pwd")
                .long("login-pwd")
                .help("Portal login password")
                .env("CUSTODE_LOGIN_PWD")
                .required(true),
        )
        .arg(
            Arg::new("token-queue-url")
                .long("token-queue-url")
                .help("URL of the shared challenge-token queue, example: https://tokens.tld/next")
                .env("CUSTODE_TOKEN_QUEUE_URL")
                .required_unless_present("solver-api-key"),
        )
        .arg(
            Arg::new("solver-url")
                .long("solver-url")
                .help("Base URL of the paid challenge-solving service")
                .default_value("https://api.capsolver.com")
                .env("CUSTODE_SOLVER_URL"),
        )
        .arg(
            Arg::new("solver-api-key")
                .long("solver-api-key")
                .help("API key for the challenge-solving service")
                .env("CUSTODE_SOLVER_API_KEY")
                .required_unless_present("token-queue-url"),
        )
        .arg(
            Arg::new("solver-site-key")
                .long("solver-site-key")
                .help("Site key the portal embeds in its login page")
                .default_value("6LfGLOwpAAAAAB_yx0Fp06dwDxYIsQ3WD5dSXKbQ")
                .env("CUSTODE_SOLVER_SITE_KEY"),
        )
        .arg(
            Arg::new("inbox-relay-url")
                .long("inbox-relay-url")
                .help("URL of the inbox relay that exposes verification-code emails")
                .env("CUSTODE_INBOX_RELAY_URL")
                .required(true),
        )
        .arg(
            Arg::new("refresh-interval")
                .long("refresh-interval")
                .help("Seconds between session refresh cycles")
                .default_value("600")
                .env("CUSTODE_REFRESH_INTERVAL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("otp-timeout")
                .long("otp-timeout")
                .help("Seconds to wait for a verification code before failing the login run")
                .default_value("120")
                .env("CUSTODE_OTP_TIMEOUT")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("CUSTODE_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
