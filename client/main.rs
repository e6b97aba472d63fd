use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use simplelog::{Config, LevelFilter, SimpleLogger};

use pushq_lib::delivery::PushClient;
use pushq_lib::message::Message;
use pushq_lib::network::feedback::read_feedback;
use pushq_lib::network::socket::{Connector, GatewayConnector};
use pushq_lib::settings::{Environment, Settings};

pub mod cli;
pub mod display;

use crate::cli::{CliArguments, SubCommand};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse commandline options.
    let opt = CliArguments::parse();

    // Set the verbosity level of the logger.
    let level = match opt.verbose {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    SimpleLogger::init(level, Config::default()).unwrap();

    // Try to read settings from the configuration file.
    let (mut settings, _) = Settings::read(&opt.config)?;
    if opt.sandbox {
        settings.shared.environment = Environment::Sandbox;
    }

    match opt.cmd {
        SubCommand::Send {
            tokens,
            alert,
            badge,
            sound,
            expiry,
            properties,
            no_trim,
            max_attempts,
            json,
        } => {
            let mut message = Message::new(alert);
            for token in &tokens {
                message.add_recipient(token)?;
            }
            if let Some(badge) = badge {
                message.set_badge(badge);
            }
            if let Some(sound) = sound {
                message.set_sound(sound);
            }
            if let Some(expiry) = expiry {
                message.set_expiry(expiry);
            }
            if no_trim {
                message.set_auto_trim(false);
            }
            for property in &properties {
                let Some((key, raw)) = property.split_once('=') else {
                    bail!("Property '{property}' isn't in key=value form.");
                };
                // Values that don't parse as JSON are taken as plain strings.
                let value = serde_json::from_str(raw)
                    .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
                message.set_custom_property(key, value)?;
            }

            let max_attempts = max_attempts.unwrap_or(settings.shared.max_attempts);
            send(&settings, message, max_attempts, json).await
        }
        SubCommand::Feedback { json } => feedback(&settings, json).await,
    }
}

/// Run a full send cycle for a single message and print its outcome.
/// The summary and report are printed even when the run aborts early.
async fn send(settings: &Settings, message: Message, max_attempts: u32, json: bool) -> Result<()> {
    info!(
        "Targeting the {} gateway at {}",
        settings.shared.environment,
        settings.shared.host()
    );

    let mut client = PushClient::with_settings(&settings.shared);
    client.connect().await?;
    let result = client.send_all(std::slice::from_ref(&message), max_attempts).await;
    client.disconnect().await;

    if json {
        let report = serde_json::json!({
            "summary": client.summary(),
            "errors": client.report().entries().collect::<Vec<_>>(),
        });
        println!("{report}");
    } else {
        display::print_summary(client.summary());
        if !client.report().is_empty() {
            display::print_report(client.report().entries());
        }
    }

    result.context("The send cycle was aborted")?;
    Ok(())
}

/// Fetch and print the feedback service's stale-token report.
async fn feedback(settings: &Settings, json: bool) -> Result<()> {
    info!(
        "Fetching the feedback report from {}",
        settings.shared.feedback_host()
    );

    let connector = GatewayConnector::feedback(&settings.shared);
    let mut stream = connector.connect().await?;
    let entries = read_feedback(&mut stream).await?;

    if json {
        println!("{}", serde_json::to_string(&entries)?);
    } else {
        display::print_feedback(&entries);
    }

    Ok(())
}
