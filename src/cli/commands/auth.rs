use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_reset_args(command);
    with_outbox_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for password reset links")
                .env("CHIAVI_FRONTEND_BASE_URL")
                .default_value("https://chiavi.dev"),
        )
        .arg(
            Arg::new("access-token-secret")
                .long("access-token-secret")
                .help("Signing secret for access and identity tokens")
                .env("CHIAVI_ACCESS_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("refresh-token-secret")
                .long("refresh-token-secret")
                .help("Signing secret for refresh tokens")
                .env("CHIAVI_REFRESH_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("access-token-ttl-seconds")
                .long("access-token-ttl-seconds")
                .help("Access and identity token TTL in seconds")
                .env("CHIAVI_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-token-ttl-seconds")
                .long("refresh-token-ttl-seconds")
                .help("Refresh token TTL in seconds")
                .env("CHIAVI_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_reset_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password reset token TTL in seconds")
                .env("CHIAVI_RESET_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-floor-ms")
                .long("reset-floor-ms")
                .help("Minimum wall-clock duration for reset requests in milliseconds")
                .env("CHIAVI_RESET_FLOOR_MS")
                .default_value("500")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("CHIAVI_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("CHIAVI_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("CHIAVI_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("CHIAVI_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("CHIAVI_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}
