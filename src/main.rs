use clap::{Arg, Command};
use log::LevelFilter;
use signature_guard::compose::{ComposeOutcome, ComposeSession};
use signature_guard::config::Config;
use signature_guard::context::SignatureContext;
use signature_guard::extractor::{SignatureExtractor, Variant};
use signature_guard::file_host::FileHost;
use signature_guard::normalization::Normalizer;
use signature_guard::signatures::SignatureKey;
use signature_guard::store::{FileStore, SignatureStore};
use signature_guard::templates::TemplateClient;
use signature_guard::validation::{Decision, SendCompletion};
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("signature-guard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Corporate e-mail signature insertion and send-time validation")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("signature-guard.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("variant")
                .long("variant")
                .value_name("LAYOUT")
                .help("Body layout: classic or modern (overrides configuration)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("normalize")
                .long("normalize")
                .value_name("FILE")
                .help("Print the normalized text of an HTML fragment")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("extract")
                .long("extract")
                .value_name("FILE")
                .help("Print the signature found in an HTML body")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("list-signatures")
                .long("list-signatures")
                .help("List signatures offered by the template service")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("records")
                .long("records")
                .help("List stored thread signature records")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("message")
                .short('m')
                .long("message")
                .value_name("FILE")
                .help("JSON message file used by --compose, --apply and --validate")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("compose")
                .long("compose")
                .help("Run compose start-up signature resolution on the message")
                .requires("message")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("apply")
                .long("apply")
                .value_name("SIGNATURE")
                .help("Apply a signature: corporate, corporate-short, executive, marketing, support")
                .requires("message")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("validate")
                .long("validate")
                .help("Validate the message's signature as if it were being sent")
                .requires("message")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("signature-guard.yaml");

    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if let Some(variant) = matches.get_one::<String>("variant") {
        match variant.parse::<Variant>() {
            Ok(variant) => config.signature.variant = variant,
            Err(e) => {
                eprintln!("{e}");
                process::exit(2);
            }
        }
    }

    if let Some(file) = matches.get_one::<String>("normalize") {
        let content = read_or_exit(file);
        println!("{}", Normalizer::new().normalize_html(&content));
        return;
    }

    if let Some(file) = matches.get_one::<String>("extract") {
        extract_file(&config, file);
        return;
    }

    if matches.get_flag("list-signatures") {
        list_signatures(&config).await;
        return;
    }

    if matches.get_flag("records") {
        list_records(&config);
        return;
    }

    let Some(message_path) = matches.get_one::<String>("message") else {
        eprintln!("Nothing to do. See --help.");
        process::exit(2);
    };

    let mut session = match open_session(&config, message_path) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error preparing compose session: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("compose") {
        match session.on_compose_started().await {
            Ok(ComposeOutcome::Inserted { key: Some(key) }) => {
                println!("✅ Inserted the thread's {key} signature")
            }
            Ok(ComposeOutcome::Inserted { key: None }) => {
                println!("✅ Inserted the last applied signature")
            }
            Ok(ComposeOutcome::AwaitingSelection) => {
                println!("No earlier signature for this conversation; select one with --apply")
            }
            Ok(ComposeOutcome::HostUnavailable) => process::exit(1),
            Err(e) => {
                eprintln!("Compose start-up failed: {e}");
                process::exit(1);
            }
        }
    }

    if let Some(signature) = matches.get_one::<String>("apply") {
        let key = match signature.parse::<SignatureKey>() {
            Ok(key) => key,
            Err(e) => {
                eprintln!("{e}");
                process::exit(2);
            }
        };
        if let Err(e) = session.apply_signature(key).await {
            eprintln!("Could not apply signature: {e}");
            process::exit(1);
        }
        println!("✅ Applied {key} signature to {message_path}");
    }

    if matches.get_flag("validate") {
        let (completion, receiver) = SendCompletion::channel();
        session.on_send(completion).await;
        match receiver.await {
            Ok(Decision::Allow { healed }) => {
                if healed {
                    println!("✅ Send allowed (signature inserted)");
                } else {
                    println!("✅ Send allowed");
                }
            }
            Ok(Decision::Block { reason, message }) => {
                println!("🚫 Send blocked ({reason:?}): {message}");
                process::exit(1);
            }
            Err(e) => {
                eprintln!("No decision received: {e}");
                process::exit(1);
            }
        }
    }
}

type CliSession = ComposeSession<FileHost, TemplateClient, FileStore>;

fn open_session(config: &Config, message_path: &str) -> anyhow::Result<CliSession> {
    let store = FileStore::open(config.store_path())?;
    let context = SignatureContext::new(store, config)?;
    let host = FileHost::open(message_path, config)?;
    let templates = TemplateClient::new(&config.template_service)?;
    Ok(ComposeSession::new(host, templates, context, &config.compose))
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file {path} not found, using defaults");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => println!("Default configuration written to: {path}"),
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn read_or_exit(path: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading {path}: {e}");
            process::exit(1);
        }
    }
}

fn extract_file(config: &Config, path: &str) {
    let body = read_or_exit(path);
    let extractor = match SignatureExtractor::from_config(config) {
        Ok(extractor) => extractor,
        Err(e) => {
            eprintln!("Invalid signature marker: {e}");
            process::exit(1);
        }
    };

    match extractor.extract(&body, config.signature.variant) {
        Some(signature) => {
            println!("{signature}");
            println!();
            println!("Normalized: {}", Normalizer::new().normalize_html(&signature));
        }
        None => {
            println!("No signature found ({} layout)", config.signature.variant);
            process::exit(1);
        }
    }
}

async fn list_signatures(config: &Config) {
    let client = match TemplateClient::new(&config.template_service) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error creating template client: {e}");
            process::exit(1);
        }
    };

    match client.list_signatures().await {
        Ok(listing) => {
            println!("Signatures offered by {}:", config.template_service.base_url);
            for entry in listing {
                let known = if entry.id.parse::<SignatureKey>().is_ok() {
                    ""
                } else {
                    " (not selectable)"
                };
                println!("  {} -> {}{}", entry.id, entry.template_url, known);
            }
        }
        Err(e) => {
            eprintln!("Template service unavailable: {e}");
            process::exit(1);
        }
    }
}

fn list_records(config: &Config) {
    let store = match FileStore::open(config.store_path()) {
        Ok(store) => SignatureStore::new(store),
        Err(e) => {
            eprintln!("Error opening store: {e}");
            process::exit(1);
        }
    };

    let mut records = store.records();
    records.sort_by_key(|record| std::cmp::Reverse(record.timestamp));

    println!("Thread signature records: {}", records.len());
    for record in records {
        let recipients: Vec<&str> = record.recipients.iter().map(String::as_str).collect();
        println!(
            "  {} [{}] thread={} subject=\"{}\" to={}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            String::from(record.applied_signature),
            record.thread_id.as_deref().unwrap_or("-"),
            record.subject,
            recipients.join(",")
        );
    }
    if store.last_applied().is_some() {
        println!("Last applied signature: present");
    } else {
        println!("Last applied signature: none");
    }
}
