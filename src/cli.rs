use crate::config::{merge_settings, save_settings};
use crate::delivery::{ContactDelivery, HttpRelay};
use crate::export::{export_file_name, export_messages_csv, search_messages};
use crate::models::{ClientMeta, Language, MessageStatus, NewMessage};
use crate::{default_data_dir, init_tracing, SiteProfile};
use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "site-analytics", version, about = "Local visit and contact-message tracker")]
pub struct Cli {
    #[arg(long, global = true, help = "Profile directory holding the database, settings and logs")]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Settings file (default: settings.json in the data dir)")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Record a page load, inferring its traffic source")]
    Visit {
        #[arg(long)]
        location: String,
        #[arg(long)]
        referrer: Option<String>,
    },
    #[command(about = "Submit the contact form: record locally, then deliver")]
    Message {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
        #[arg(long, help = "Only record the message; skip the relay chain")]
        offline: bool,
    },
    #[command(about = "Print dashboard statistics")]
    Stats {
        #[arg(long)]
        lang: Option<Language>,
    },
    #[command(about = "List stored messages, most recent first")]
    Messages {
        #[arg(long)]
        search: Option<String>,
    },
    #[command(about = "Change a message's status")]
    Mark { id: String, status: MessageStatus },
    #[command(about = "Write the message list as CSV")]
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    #[command(about = "Show settings, or merge a JSON patch into them and save")]
    Config {
        #[arg(long, value_name = "JSON")]
        set: Option<String>,
    },
    #[command(about = "Clear stored analytics, messages and the visitor sentinel")]
    Reset,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VisitResponse {
    source: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BooleanResponse {
    ok: bool,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    if let Err(error) = init_tracing(&data_dir) {
        eprintln!("logging disabled: {}", error);
    }

    let profile = SiteProfile::open(&data_dir, cli.config.as_deref())
        .with_context(|| format!("opening profile at {}", data_dir.display()))?;
    execute(&profile, cli.command)
}

fn execute(profile: &SiteProfile, command: Command) -> anyhow::Result<()> {
    let tracker = &profile.tracker;
    match command {
        Command::Visit { location, referrer } => {
            let source = tracker.track_page_load(&location, referrer.as_deref());
            print_json(&VisitResponse { source })
        }
        Command::Message {
            name,
            email,
            subject,
            body,
            offline,
        } => {
            let submission = NewMessage {
                name,
                email,
                subject,
                message: body,
            };
            let client_meta = ClientMeta {
                user_agent: Some(format!("site-analytics/{}", env!("CARGO_PKG_VERSION"))),
                origin: None,
            };
            if offline {
                let id = tracker.record_message(submission, client_meta);
                return print_json(&serde_json::json!({ "messageId": id }));
            }
            let relay = HttpRelay::new(profile.settings.relay.timeout_ms)?;
            let delivery = ContactDelivery::new(tracker, relay, profile.settings.relay.clone(), profile.settings.language);
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            let report = runtime.block_on(delivery.submit(submission, client_meta))?;
            print_json(&report)
        }
        Command::Stats { lang } => {
            let language = lang.unwrap_or(profile.settings.language);
            print_json(&tracker.stats_in(language))
        }
        Command::Messages { search } => {
            let messages = tracker.messages();
            let matches = search_messages(&messages, search.as_deref().unwrap_or(""));
            print_json(&matches)
        }
        Command::Mark { id, status } => print_json(&BooleanResponse {
            ok: tracker.set_message_status(&id, status),
        }),
        Command::Export { out } => {
            let path = out.unwrap_or_else(|| profile.data_dir.join(export_file_name(Utc::now())));
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            export_messages_csv(&tracker.messages(), file)?;
            print_json(&serde_json::json!({ "path": path }))
        }
        Command::Config { set: None } => print_json(&profile.settings),
        Command::Config { set: Some(patch) } => {
            let update: serde_json::Value = serde_json::from_str(&patch).context("parsing settings patch")?;
            let merged = merge_settings(&profile.settings, update)?;
            save_settings(&profile.settings_path, &merged)?;
            tracing::info!(path = %profile.settings_path.display(), "settings updated");
            print_json(&merged)
        }
        Command::Reset => {
            tracker.reset();
            print_json(&BooleanResponse { ok: true })
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
