use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pushq", about = "Send push notifications over the legacy binary gateway protocol.", author, version)]
pub struct CliArguments {
    /// Verbose mode (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Path to a specific pushq config file.
    /// This ignores all other config files.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Talk to the sandbox gateway, regardless of the configured
    /// environment. Use this with a development certificate.
    #[arg(short, long)]
    pub sandbox: bool,

    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Send a notification to one or more devices.
    Send {
        /// The recipient device tokens (64 hex characters each).
        #[arg(required = true)]
        tokens: Vec<String>,

        /// The alert text to display to the user.
        #[arg(short, long)]
        alert: String,

        /// Number to badge the application icon with.
        #[arg(short, long)]
        badge: Option<u32>,

        /// Name of the sound to play when the notification arrives.
        #[arg(long)]
        sound: Option<String>,

        /// Drop the notification if it couldn't be delivered after this
        /// many seconds. 0 disables redelivery entirely.
        #[arg(short, long)]
        expiry: Option<u32>,

        /// A custom top-level payload entry as `key=value`.
        /// The value is parsed as JSON where possible and falls back to a
        /// plain string. Can be used multiple times.
        #[arg(short, long = "property", value_name = "KEY=VALUE")]
        properties: Vec<String>,

        /// Fail instead of trimming the alert text when the payload
        /// exceeds the protocol's size limit.
        #[arg(long)]
        no_trim: bool,

        /// Maximum send attempts per recipient before giving up.
        /// Defaults to the configured value.
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Print the summary and error report as json.
        #[arg(short, long)]
        json: bool,
    },

    /// Fetch the stale-token report from the feedback service.
    /// Tokens in this report belong to devices the gateway couldn't reach
    /// and should be dropped from your recipient lists.
    Feedback {
        /// Print the report as json.
        #[arg(short, long)]
        json: bool,
    },
}
