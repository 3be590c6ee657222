//! Practice Admin CLI: issue and verify API tokens, generate and import
//! payment data, inspect months, build report decks and edit settings.

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use practice_analytics::engine;
use practice_analytics::slides::{self, Slide};
use practice_analytics::{ChurnClassifier, MetricsSource, MetricsState, RecordStore, RemoteMetricsClient};
use practice_auth::{issue_token, TokenSecret, TokenVerifier};
use practice_core::types::{validate_churn_window, Consultation, DemoData, MonthKey};
use practice_core::{NamedPeriod, PracticeSettings, SettingsStore};
use practice_generator::{DemoGenerator, PracticeConfig};
use std::path::Path;

const SECRET_ENV: &str = "PRACTICE_DASHBOARD__AUTH__TOKEN_SECRET";

#[derive(Parser)]
#[command(name = "practice-admin")]
#[command(about = "Practice Dashboard administration tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a random token secret
    GenerateSecret {
        /// Output file path for the secret (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Issue a bearer token for the metrics endpoint
    IssueToken {
        /// HMAC token secret
        #[arg(short, long, env = SECRET_ENV)]
        secret: String,

        /// Username embedded in the token
        #[arg(short, long, default_value = "admin")]
        username: String,
    },

    /// Verify a bearer token and display its claims
    VerifyToken {
        /// HMAC token secret
        #[arg(short, long, env = SECRET_ENV)]
        secret: String,

        /// Maximum token age in hours
        #[arg(long, default_value = "24")]
        max_age_hours: i64,

        token: String,
    },

    /// Generate a synthetic practice
    Generate {
        /// Practice configuration JSON (defaults when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Seed (overrides the config)
        #[arg(long)]
        seed: Option<u64>,

        /// Write only the payment records instead of the whole bundle
        #[arg(long, default_value_t = false)]
        payments_only: bool,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Convert a CSV payments export to JSON records
    ImportCsv {
        /// CSV export
        input: String,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List the months present in a records file
    Months {
        /// Payment records (JSON, CSV or a generated bundle)
        records: String,
    },

    /// Totals over a named period such as `this-quarter` or `last-6-months`
    Summary {
        records: String,

        #[arg(short, long, default_value = "this-month")]
        period: NamedPeriod,

        /// Resolve the period against this date instead of today
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Clients whose last session is older than the churn window
    Churned {
        records: String,

        /// Evaluate as of this date instead of today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Churn window in days (default: from settings)
        #[arg(long)]
        window_days: Option<i64>,

        #[arg(long)]
        settings: Option<String>,
    },

    /// Build the report deck for a month
    Report {
        records: String,

        /// Month as YYYY-MM (default: latest month in the records)
        #[arg(short, long)]
        month: Option<MonthKey>,

        #[arg(long)]
        settings: Option<String>,

        /// Base URL of a metrics endpoint to try before computing locally
        #[arg(long)]
        remote: Option<String>,

        /// Bearer token for the remote endpoint
        #[arg(long)]
        token: Option<String>,

        /// Issue a token with this secret when `--token` is absent
        #[arg(long, env = SECRET_ENV)]
        secret: Option<String>,

        /// Print the deck as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show or change practice settings
    Settings {
        /// Settings file
        #[arg(short, long, default_value = "settings.json")]
        path: String,

        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Show,

    /// Set one value, e.g. `set weeklyCapacity 140`
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::GenerateSecret { output } => cmd_generate_secret(output),
        Commands::IssueToken { secret, username } => cmd_issue_token(&secret, &username),
        Commands::VerifyToken {
            secret,
            max_age_hours,
            token,
        } => cmd_verify_token(&secret, max_age_hours, &token),
        Commands::Generate {
            config,
            seed,
            payments_only,
            output,
        } => cmd_generate(config, seed, payments_only, output),
        Commands::ImportCsv { input, output } => cmd_import_csv(&input, output),
        Commands::Months { records } => cmd_months(&records),
        Commands::Summary {
            records,
            period,
            today,
        } => cmd_summary(&records, period, today),
        Commands::Churned {
            records,
            as_of,
            window_days,
            settings,
        } => cmd_churned(&records, as_of, window_days, settings),
        Commands::Report {
            records,
            month,
            settings,
            remote,
            token,
            secret,
            json,
        } => cmd_report(&records, month, settings, remote, token, secret, json).await,
        Commands::Settings { path, action } => cmd_settings(&path, action),
    }
}

// ---------------------------------------------------------------------------
// Token commands
// ---------------------------------------------------------------------------

fn cmd_generate_secret(output: Option<String>) -> anyhow::Result<()> {
    let secret = TokenSecret::generate();
    write_output(output, &secret, "Token secret")
}

fn cmd_issue_token(secret: &str, username: &str) -> anyhow::Result<()> {
    let token = issue_token(username, &TokenSecret::new(secret), Utc::now())?;
    println!("{token}");
    Ok(())
}

fn cmd_verify_token(secret: &str, max_age_hours: i64, token: &str) -> anyhow::Result<()> {
    let verifier = TokenVerifier::with_max_age_hours(TokenSecret::new(secret), max_age_hours)?;
    let now = Utc::now();
    match verifier.verify(token, now) {
        Ok(claims) => {
            let expires = claims.issued_at + verifier.max_age();
            println!("Token is VALID");
            println!();
            println!("  Username:    {}", claims.username);
            println!("  Issued at:   {}", claims.issued_at.format("%Y-%m-%d %H:%M UTC"));
            println!("  Expires at:  {}", expires.format("%Y-%m-%d %H:%M UTC"));
            println!("  Remaining:   {}m", (expires - now).num_minutes());
            Ok(())
        }
        Err(e) => bail!("Token is INVALID: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Data commands
// ---------------------------------------------------------------------------

fn cmd_generate(
    config: Option<String>,
    seed: Option<u64>,
    payments_only: bool,
    output: Option<String>,
) -> anyhow::Result<()> {
    let mut practice = match config {
        Some(path) => PracticeConfig::load_json(&path).with_context(|| format!("loading {path}"))?,
        None => PracticeConfig::default(),
    };
    if let Some(seed) = seed {
        practice.seed = seed;
    }
    let demo = DemoGenerator::new(practice)?.generate();
    eprintln!(
        "Generated {} clinicians, {} clients, {} payments over {} months",
        demo.clinicians.len(),
        demo.clients.len(),
        demo.payments.len(),
        demo.monthly.len()
    );

    let json = if payments_only {
        serde_json::to_string_pretty(&demo.payments)?
    } else {
        serde_json::to_string_pretty(&demo)?
    };
    write_output(output, &json, "Practice data")
}

fn cmd_import_csv(input: &str, output: Option<String>) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(input).with_context(|| format!("reading {input}"))?;
    let store = RecordStore::from_csv_str(&contents)?;
    eprintln!("Imported {} payment records", store.len());
    write_output(output, &serde_json::to_string_pretty(store.records())?, "Records")
}

fn cmd_months(records: &str) -> anyhow::Result<()> {
    let (store, _) = load_input(records)?;
    let months = store.engine().available_months();
    for key in &months {
        let in_month = store.engine().records_for_month(key.month0 as i32, key.year);
        println!(
            "{key}  {:<9} {:>5} sessions  ${:>10.2}",
            key.label(),
            engine::session_count(&in_month),
            engine::revenue(&in_month)
        );
    }
    println!();
    println!("{} months", months.len());
    Ok(())
}

fn cmd_summary(records: &str, period: NamedPeriod, today: Option<NaiveDate>) -> anyhow::Result<()> {
    let (store, _) = load_input(records)?;
    let interval = match today {
        Some(today) => period.resolve(today),
        None => period.resolve_now(),
    };
    let in_period = store.engine().records_in(&interval);
    let active = engine::active_client_ids(&in_period);
    let new = store.engine().new_clients_in(&interval);
    let returning = active.iter().filter(|id| new.binary_search(*id).is_err()).count();

    println!("{period}: {} to {}", interval.first_day(), interval.last_day());
    println!();
    println!("  Revenue:           ${:.2}", engine::revenue(&in_period));
    println!("  Sessions:          {}", engine::session_count(&in_period));
    println!("  Active clients:    {}", active.len());
    println!("  New clients:       {}", new.len());
    println!("  Returning clients: {returning}");
    for (clinician, revenue) in engine::revenue_by_clinician(&in_period) {
        println!("    {clinician:<12} ${revenue:.2}");
    }
    Ok(())
}

fn cmd_churned(
    records: &str,
    as_of: Option<NaiveDate>,
    window_days: Option<i64>,
    settings: Option<String>,
) -> anyhow::Result<()> {
    let (store, _) = load_input(records)?;
    let window = match window_days {
        Some(days) => validate_churn_window(days)?,
        None => load_settings(settings.as_deref())?.churn_window_days,
    };
    let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let churned = ChurnClassifier::new(window).churned_as_of(store.records(), as_of);

    for client in &churned {
        println!(
            "{:<14} last session {}  ({} days)",
            client.client_id, client.last_session_date, client.days_since_last_session
        );
    }
    println!();
    println!("{} clients churned as of {as_of} ({window}-day window)", churned.len());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_report(
    records: &str,
    month: Option<MonthKey>,
    settings: Option<String>,
    remote: Option<String>,
    token: Option<String>,
    secret: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let (store, consultations) = load_input(records)?;
    let settings = load_settings(settings.as_deref())?;
    let key = match month {
        Some(key) => key,
        None => match store.engine().available_months().last() {
            Some(key) => *key,
            None => bail!("{records} contains no payment records"),
        },
    };

    let mut source = MetricsSource::local(&store, &settings);
    if let Some(base_url) = remote {
        let token = match (token, secret) {
            (Some(token), _) => token,
            (None, Some(secret)) => issue_token("practice-admin", &TokenSecret::new(secret), Utc::now())?,
            (None, None) => bail!("--remote needs --token or a token secret"),
        };
        let client = RemoteMetricsClient::new(base_url, token, std::time::Duration::from_secs(10))?;
        source = source.with_remote(client);
    }

    let metrics = match source.load_month(key).await {
        MetricsState::Ready { metrics, origin } => {
            eprintln!("Metrics for {key} from {origin:?} source");
            metrics
        }
        MetricsState::Failed { error } => bail!("Could not load metrics for {key}: {error}"),
        MetricsState::Loading => bail!("Metrics for {key} are still loading"),
    };

    let deck: Vec<Slide> = slides::build_deck_from(&metrics, store.records(), &consultations, &settings, key);
    if json {
        println!("{}", serde_json::to_string_pretty(&deck)?);
    } else {
        println!("{}: {}", settings.practice_name, metrics.label);
        for slide in &deck {
            println!();
            println!("{}", slide.render());
        }
    }
    Ok(())
}

fn cmd_settings(path: &str, action: SettingsAction) -> anyhow::Result<()> {
    let mut store = SettingsStore::load(path)?;
    match action {
        SettingsAction::Show => {}
        SettingsAction::Set { key, value } => {
            store.set(&key, &value)?;
            store.save()?;
            eprintln!("Updated {key} in {path}");
        }
    }
    println!("{}", serde_json::to_string_pretty(store.settings())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read payment records from a CSV export, a JSON array of records, or a
/// generated bundle. Only bundles carry consultations.
fn load_input(path: &str) -> anyhow::Result<(RecordStore, Vec<Consultation>)> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let is_csv = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        return Ok((RecordStore::from_csv_str(&contents)?, Vec::new()));
    }
    if contents.trim_start().starts_with('{') {
        let demo: DemoData =
            serde_json::from_str(&contents).with_context(|| format!("parsing bundle {path}"))?;
        return Ok((RecordStore::new(demo.payments)?, demo.consultations));
    }
    Ok((RecordStore::from_json_str(&contents)?, Vec::new()))
}

fn load_settings(path: Option<&str>) -> anyhow::Result<PracticeSettings> {
    Ok(match path {
        Some(path) => SettingsStore::load(path)?.into_settings(),
        None => PracticeSettings::default(),
    })
}

fn write_output(output: Option<String>, contents: &str, what: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, contents).with_context(|| format!("writing {path}"))?;
            eprintln!("{what} written to: {path}");
        }
        None => println!("{contents}"),
    }
    Ok(())
}
