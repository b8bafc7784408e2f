use anyhow::{bail, Context};
use chrono::{Duration, TimeZone, Utc};
use clap::{Parser, Subcommand};
use dialer_auth::{AuthError, NewAccount};
use dialer_config::{load as load_config, AppConfig};
use dialer_database::{
    CalendarSettingValues, CreateEventRequest, EventStatus, User, Visibility, Window,
};
use dialer_gateway::create_router;
use dialer_runtime::{telemetry, DialerServices};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "dialer-server")]
#[command(about = "Appointment REST API for the dialer (serves by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Create a login account
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// See and edit every record
        #[arg(long)]
        superuser: bool,
        /// Username of the manager administering this calendar user
        #[arg(long)]
        manager: Option<String>,
    },
    /// Seed the database with a demo manager, references and events
    SeedData,
    /// Print every event with its status
    DumpEvents,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(&config).await,
        Commands::CreateUser {
            username,
            password,
            superuser,
            manager,
        } => {
            let services = initialise(&config).await?;
            let user = create_user(&services, &username, &password, superuser, manager.as_deref())
                .await?;
            println!("created user {} (id {})", user.username, user.id);
            Ok(())
        }
        Commands::SeedData => {
            let services = initialise(&config).await?;
            let summary = seed_data(&services).await?;
            println!("Database seeded with demo data:");
            println!("- manager login: {SEED_MANAGER} / {SEED_PASSWORD}");
            println!("- calendar user login: {SEED_AGENT} / {SEED_PASSWORD}");
            println!("- {} events created", summary.events);
            println!("Run 'dump-events' to see them");
            Ok(())
        }
        Commands::DumpEvents => {
            let services = initialise(&config).await?;
            print!("{}", dump_events(&services).await?);
            Ok(())
        }
    }
}

async fn initialise(config: &AppConfig) -> anyhow::Result<DialerServices> {
    DialerServices::initialise(config)
        .await
        .context("failed to initialise dialer services")
}

async fn run_server(config: &AppConfig) -> anyhow::Result<()> {
    info!("starting dialer appointment API");

    let services = initialise(config).await?;
    let app = create_router(services.state.clone());

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(dialer_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    info!("server shut down");
    Ok(())
}

async fn create_user(
    services: &DialerServices,
    username: &str,
    password: &str,
    is_superuser: bool,
    manager: Option<&str>,
) -> anyhow::Result<User> {
    let manager_id = match manager {
        Some(name) => {
            let Some(manager) = services.state.users.find_by_username(name).await? else {
                bail!("manager {name} does not exist");
            };
            Some(manager.id)
        }
        None => None,
    };

    let user = services
        .authenticator
        .register_user(&NewAccount {
            username: username.to_string(),
            email: None,
            password: password.to_string(),
            is_superuser,
            manager_id,
        })
        .await
        .with_context(|| format!("failed to create user {username}"))?;

    info!(user_id = user.id, username = %user.username, "user created");
    Ok(user)
}

const SEED_MANAGER: &str = "manager";
const SEED_AGENT: &str = "agent";
const SEED_PASSWORD: &str = "dialer";

#[derive(Debug)]
struct SeedSummary {
    events: usize,
}

/// Register the account unless its username is taken
async fn ensure_account(services: &DialerServices, account: NewAccount) -> anyhow::Result<User> {
    match services.authenticator.register_user(&account).await {
        Ok(user) => Ok(user),
        Err(AuthError::UserExists) => services
            .state
            .users
            .find_by_username(&account.username)
            .await?
            .with_context(|| format!("user {} vanished", account.username)),
        Err(error) => Err(error).context("failed to register seed account"),
    }
}

async fn seed_data(services: &DialerServices) -> anyhow::Result<SeedSummary> {
    let manager = ensure_account(
        services,
        NewAccount {
            username: SEED_MANAGER.to_string(),
            password: SEED_PASSWORD.to_string(),
            ..NewAccount::default()
        },
    )
    .await?;
    let agent = ensure_account(
        services,
        NewAccount {
            username: SEED_AGENT.to_string(),
            password: SEED_PASSWORD.to_string(),
            manager_id: Some(manager.id),
            ..NewAccount::default()
        },
    )
    .await?;

    let references = &services.state.references;
    let survey = references.create_survey(manager.id, "Appointment reminder").await?;
    let gateway = references.create_gateway("Main trunk").await?;
    references.attach_gateway(manager.id, gateway.id).await?;
    let sms_gateway = references.create_sms_gateway("SMS relay").await?;
    let audio = references.create_audio_file(manager.id, "Voicemail greeting").await?;

    services
        .state
        .calendar_settings
        .create(
            manager.id,
            &CalendarSettingValues {
                label: "Reminder calls".to_string(),
                callerid: "123456789".to_string(),
                caller_name: "Clinic".to_string(),
                survey_id: Some(survey.id),
                aleg_gateway_id: Some(gateway.id),
                sms_gateway_id: Some(sms_gateway.id),
                voicemail_audiofile_id: Some(audio.id),
                ..CalendarSettingValues::default()
            },
        )
        .await?;

    let events = &services.state.events;
    let start = Utc
        .with_ymd_and_hms(2013, 12, 2, 9, 0, 0)
        .single()
        .context("invalid seed timestamp")?;
    let event = |title: &str, offset_days: i64, parent_event_id: Option<i64>| CreateEventRequest {
        title: title.to_string(),
        description: format!("{title} (seeded)"),
        start: start + Duration::days(offset_days),
        end: start + Duration::days(offset_days) + Duration::minutes(30),
        creator_id: agent.id,
        calendar_id: None,
        status: EventStatus::Pending.to_string(),
        parent_event_id,
    };

    let parent = events.create(&event("Dental checkup", 0, None)).await?;
    events
        .create(&event("Dental checkup follow-up", 7, Some(parent.id)))
        .await?;
    events
        .create(&event(r#"Call "Bob" about {x-ray}"#, 14, Some(parent.id)))
        .await?;

    info!(manager_id = manager.id, agent_id = agent.id, "seed data inserted");
    Ok(SeedSummary { events: 3 })
}

async fn dump_events(services: &DialerServices) -> anyhow::Result<String> {
    let events = &services.state.events;
    let rows = events
        .list(Visibility::All, Window::unbounded())
        .await
        .context("failed to fetch events")?;

    let mut output = String::from("=== EVENTS ===\n");
    if rows.is_empty() {
        output.push_str("No events found in database\n");
        return Ok(output);
    }

    output.push_str(&format!("Found {} events:\n", rows.len()));
    output.push_str(&format!(
        "{:<5} {:<40} {:<12} {:<8} {:<8} {:<27}\n",
        "ID", "Title", "Creator", "Status", "Parent", "Start"
    ));
    output.push_str(&"-".repeat(105));
    output.push('\n');

    for event in rows {
        output.push_str(&format!(
            "{:<5} {:<40} {:<12} {:<8} {:<8} {:<27}\n",
            event.id,
            event.title,
            event.creator,
            event.status,
            event
                .parent_event_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "NULL".to_string()),
            event.start.to_rfc3339(),
        ));
    }

    Ok(output)
}
