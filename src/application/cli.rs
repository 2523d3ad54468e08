use std::io;
use std::path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Password;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use yansi::Paint;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::EndpointName;
use crate::domain::models::LoginRequest;
use crate::domain::models::Notification;
use crate::domain::models::RegisterRequest;
use crate::domain::models::TransportBox;
use crate::domain::models::VerifyOtpRequest;
use crate::domain::services::Api;
use crate::domain::services::CacheOptions;
use crate::domain::services::CredentialStore;
use crate::domain::services::EndpointRegistry;
use crate::domain::services::QueryCache;
use crate::domain::services::QuerySubscription;
use crate::domain::services::SessionContainer;
use crate::infrastructure::http::ExecutorConfig;
use crate::infrastructure::http::OfflineTransport;
use crate::infrastructure::http::RequestExecutor;
use crate::infrastructure::http::RetryPolicy;
use crate::infrastructure::notifiers::channel::ChannelNotifier;
use crate::infrastructure::storage::file::FileStorage;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

/// Commands that only read or clear the stored session.
fn is_local_command(name: &str, matches: &ArgMatches) -> bool {
    return match name {
        "logout" => true,
        "whoami" => !matches.get_flag("refresh"),
        _ => false,
    };
}

/// Wires storage, session, transport and cache together from the loaded
/// config. Local commands fall back to an offline transport when no API URL
/// is configured.
fn build_api(notification_tx: mpsc::UnboundedSender<Notification>, local: bool) -> Result<Api> {
    let storage = FileStorage::new(path::PathBuf::from(Config::get(ConfigKey::StorageDir)));
    let session = Arc::new(SessionContainer::new(CredentialStore::new(Arc::new(
        storage,
    ))));

    let transport: TransportBox = if local && Config::get(ConfigKey::ApiURL).trim().is_empty() {
        tracing::debug!("No API URL configured, running offline");
        Arc::new(OfflineTransport::default())
    } else {
        Arc::new(RequestExecutor::new(
            ExecutorConfig {
                base_url: Config::require(ConfigKey::ApiURL)?,
                prefix: Config::get(ConfigKey::ApiPrefix),
                timeout: Config::get_millis(ConfigKey::RequestTimeout)?,
                retry: RetryPolicy::new(
                    u32::try_from(Config::get_u64(ConfigKey::RetryCount)?)?,
                    Config::get_millis(ConfigKey::RetryBackoff)?,
                ),
            },
            session.subscribe(),
        )?)
    };

    let cache = QueryCache::new(
        transport,
        CacheOptions {
            grace_period: Config::get_millis(ConfigKey::CacheGracePeriod)?,
            refetch_on_subscribe: false,
        },
    );

    return Ok(Api::new(
        EndpointRegistry::default(),
        cache,
        session,
        Arc::new(ChannelNotifier::new(notification_tx)),
    ));
}

fn read_password(matches: &ArgMatches, confirm: bool) -> Result<String> {
    if let Some(password) = matches.get_one::<String>("password") {
        return Ok(password.to_string());
    }

    let theme = ColorfulTheme::default();
    let mut prompt = Password::with_theme(&theme).with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }

    return Ok(prompt.interact()?);
}

fn required_arg(matches: &ArgMatches, name: &str) -> Result<String> {
    return match matches.get_one::<String>(name) {
        Some(val) => Ok(val.to_string()),
        None => bail!(format!("Missing required argument '--{name}'")),
    };
}

fn print_json(data: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    return Ok(());
}

async fn settle_query(mut subscription: QuerySubscription) -> Result<Value> {
    let state = subscription.settled().await;
    if let Some(err) = state.error {
        bail!(format!("{} failed: {err}", subscription.key()));
    }

    return Ok(state.data.unwrap_or(Value::Null));
}

/// Prints the query result, then refetches it on an interval until the
/// process is interrupted. Failed refreshes keep the last data on screen.
async fn watch_query(mut subscription: QuerySubscription, interval: Duration) -> Result<()> {
    loop {
        let state = subscription.settled().await;
        match state.error {
            Some(err) => eprintln!("{} {err}", Paint::red(format!("[{}]", subscription.key()))),
            None => print_json(&state.data.unwrap_or(Value::Null))?,
        }

        tokio::time::sleep(interval).await;
        subscription.refetch();
        if subscription.state().is_loading() {
            tracing::debug!(key = %subscription.key(), "Refreshing watched query");
        }
    }
}

async fn read_json_object(matches: &ArgMatches, what: &str) -> Result<Value> {
    let raw = if let Some(file) = matches.get_one::<String>("file") {
        fs::read_to_string(file).await?
    } else {
        required_arg(matches, "data")?
    };

    let value = serde_json::from_str::<Value>(&raw)?;
    if !value.is_object() {
        bail!(format!("{what} must be a JSON object"));
    }

    return Ok(value);
}

async fn run_reports(api: &Api, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("list", _)) => {
            print_json(&settle_query(api.get_reports()?).await?)?;
        }
        Some(("get", get_matches)) => {
            let ids = get_matches
                .get_many::<String>("id")
                .map(|ids| return ids.cloned().collect::<Vec<String>>())
                .unwrap_or_default();

            let mut subscriptions = vec![];
            for id in &ids {
                subscriptions.push(api.get_report(id)?);
            }

            let results =
                futures::future::join_all(subscriptions.into_iter().map(settle_query)).await;
            for res in results {
                print_json(&res?)?;
            }
        }
        Some(("submit", submit_matches)) => {
            let report = read_json_object(submit_matches, "A report").await?;
            let handle = api.mutation(EndpointName::SubmitReport);
            handle.trigger(report).await?;
            print_json(&handle.state().data.unwrap_or(Value::Null))?;
        }
        _ => {
            subcommand_reports().print_long_help()?;
        }
    }

    return Ok(());
}

/// Runs a subcommand that talks to the portal API.
async fn run_api_command(
    name: &str,
    matches: &ArgMatches,
    notification_tx: mpsc::UnboundedSender<Notification>,
) -> Result<()> {
    let api = build_api(notification_tx, is_local_command(name, matches))?;

    match name {
        "login" => {
            let credentials = LoginRequest {
                email: required_arg(matches, "email")?,
                password: read_password(matches, false)?,
            };
            api.login(&credentials).await?;
        }
        "register" => {
            let password = read_password(matches, true)?;
            let registration = RegisterRequest {
                email: required_arg(matches, "email")?,
                confirm: password.to_string(),
                password,
                name: matches.get_one::<String>("name").cloned(),
            };
            api.register(&registration).await?;
        }
        "verify-otp" => {
            let verification = VerifyOtpRequest {
                email: required_arg(matches, "email")?,
                code: required_arg(matches, "code")?,
            };
            api.verify_otp(&verification).await?;
        }
        "logout" => {
            api.logout();
        }
        "whoami" => {
            if matches.get_flag("refresh") {
                print_json(&settle_query(api.get_profile()?).await?)?;
            } else {
                let session = api.session().current();
                match session.display_name() {
                    Some(name) if session.is_authenticated() => {
                        println!("Signed in as {}", Paint::green(name));
                    }
                    _ => {
                        println!("Not signed in");
                    }
                }
            }
        }
        "cases" => {
            let cases = api.get_cases()?;
            match matches.get_one::<u64>("watch") {
                Some(secs) => watch_query(cases, Duration::from_secs(*secs)).await?,
                None => print_json(&settle_query(cases).await?)?,
            }
        }
        "reports" => {
            run_reports(&api, matches).await?;
        }
        "profile" => match matches.subcommand() {
            Some(("update", update_matches)) => {
                let fields = read_json_object(update_matches, "Profile fields").await?;
                let handle = api.mutation(EndpointName::UpdateProfile);
                handle.trigger(fields).await?;
                print_json(&handle.state().data.unwrap_or(Value::Null))?;
            }
            _ => {
                subcommand_profile().print_long_help()?;
            }
        },
        _ => {
            build().print_long_help()?;
        }
    }

    return Ok(());
}

fn arg_email() -> Arg {
    return Arg::new("email")
        .short('e')
        .long("email")
        .num_args(1)
        .help("Account email address.")
        .required(true);
}

fn arg_password() -> Arg {
    return Arg::new("password")
        .short('p')
        .long("password")
        .env("DENGUEWATCH_PASSWORD")
        .hide_env_values(true)
        .num_args(1)
        .help("Account password. Prompted for when omitted.");
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_reports() -> Command {
    return Command::new("reports")
        .about("Browse and submit case reports.")
        .arg_required_else_help(true)
        .subcommand(Command::new("list").about("List reports visible to the signed in account."))
        .subcommand(
            Command::new("get").about("Fetch one or more reports by ID.").arg(
                Arg::new("id")
                    .help("Report ID")
                    .num_args(1..)
                    .required(true),
            ),
        )
        .subcommand(
            Command::new("submit")
                .about("Submit a new report as a JSON object.")
                .arg(arg_json_data("Report body"))
                .arg(arg_json_file("report body")),
        );
}

fn arg_json_data(about: &'static str) -> Arg {
    return Arg::new("data")
        .short('d')
        .long("data")
        .num_args(1)
        .conflicts_with("file")
        .help(format!("{about} as inline JSON."));
}

fn arg_json_file(about: &'static str) -> Arg {
    return Arg::new("file")
        .short('f')
        .long("file")
        .num_args(1)
        .help(format!("Path to a JSON file holding the {about}."));
}

fn subcommand_profile() -> Command {
    return Command::new("profile")
        .about("Manage the signed in account's profile.")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("update")
                .about("Update profile fields from a JSON object.")
                .arg(arg_json_data("Profile fields"))
                .arg(arg_json_file("profile fields")),
        );
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("denguewatch")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .subcommand(
            Command::new("login")
                .about("Sign in and store the session for later commands.")
                .arg(arg_email())
                .arg(arg_password()),
        )
        .subcommand(
            Command::new("register")
                .about("Create a new account.")
                .arg(arg_email())
                .arg(arg_password())
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .num_args(1)
                        .help("Display name for the account."),
                ),
        )
        .subcommand(
            Command::new("verify-otp")
                .about("Confirm an account with the one time code sent by email.")
                .arg(arg_email())
                .arg(
                    Arg::new("code")
                        .long("code")
                        .num_args(1)
                        .help("One time code.")
                        .required(true),
                ),
        )
        .subcommand(Command::new("logout").about("Forget the stored session."))
        .subcommand(
            Command::new("whoami")
                .about("Show the signed in account.")
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .action(ArgAction::SetTrue)
                        .help("Fetch the profile from the server instead of the local session."),
                ),
        )
        .subcommand(
            Command::new("cases")
                .about("List reported dengue cases.")
                .arg(
                    Arg::new("watch")
                        .short('w')
                        .long("watch")
                        .num_args(1)
                        .value_parser(value_parser!(u64).range(1..))
                        .help("Refetch every given number of seconds until interrupted."),
                ),
        )
        .subcommand(subcommand_reports())
        .subcommand(subcommand_profile())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("DENGUEWATCH_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(
            Arg::new(ConfigKey::ApiURL.to_string())
                .long(ConfigKey::ApiURL.to_string())
                .env("DENGUEWATCH_API_URL")
                .num_args(1)
                .help("Base URL of the portal API, e.g. https://portal.example.org")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::ApiPrefix.to_string())
                .long(ConfigKey::ApiPrefix.to_string())
                .env("DENGUEWATCH_API_PREFIX")
                .num_args(1)
                .help(format!("Path prefix joined onto the API URL for every endpoint. [default: {}]", Config::default(ConfigKey::ApiPrefix)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::CacheGracePeriod.to_string())
                .long(ConfigKey::CacheGracePeriod.to_string())
                .env("DENGUEWATCH_CACHE_GRACE_PERIOD")
                .num_args(1)
                .help(format!("Milliseconds an unused query result is kept before it is evicted. [default: {}]", Config::default(ConfigKey::CacheGracePeriod)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::RequestTimeout.to_string())
                .long(ConfigKey::RequestTimeout.to_string())
                .env("DENGUEWATCH_REQUEST_TIMEOUT")
                .num_args(1)
                .help(format!("Milliseconds before a request to the API times out. [default: {}]", Config::default(ConfigKey::RequestTimeout)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::RetryBackoff.to_string())
                .long(ConfigKey::RetryBackoff.to_string())
                .env("DENGUEWATCH_RETRY_BACKOFF")
                .num_args(1)
                .help(format!("Milliseconds to wait between retries of a request that failed to reach the API. [default: {}]", Config::default(ConfigKey::RetryBackoff)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::RetryCount.to_string())
                .long(ConfigKey::RetryCount.to_string())
                .env("DENGUEWATCH_RETRY_COUNT")
                .num_args(1)
                .help(format!("How many times a request that failed to reach the API is retried. [default: {}]", Config::default(ConfigKey::RetryCount)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::StorageDir.to_string())
                .long(ConfigKey::StorageDir.to_string())
                .env("DENGUEWATCH_STORAGE_DIR")
                .num_args(1)
                .help(format!("Directory the signed in session is stored in. [default: {}]", Config::default(ConfigKey::StorageDir)))
                .global(true),
        );
}

pub async fn parse(notification_tx: mpsc::UnboundedSender<Notification>) -> Result<()> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
            }
            _ => {
                subcommand_config().print_long_help()?;
            }
        },
        Some((name, subcmd_matches)) => {
            let mut arg_matches = vec![&matches, subcmd_matches];
            if let Some((_, nested_matches)) = subcmd_matches.subcommand() {
                arg_matches.push(nested_matches);
            }
            Config::load(build(), arg_matches).await?;
            run_api_command(name, subcmd_matches, notification_tx).await?;
        }
        None => {
            build().print_long_help()?;
        }
    }

    return Ok(());
}
