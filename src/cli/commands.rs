use clap::{ArgGroup, Parser, Subcommand};

/// `Sentinel` - bounded, auditable auto-remediation for a small service fleet.
#[derive(Parser, Debug)]
#[command(name = "sentinel")]
#[command(version)]
#[command(about = "Detects failing services, plans a fix, gates it and verifies the result.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one remediation cycle now
    Run,

    /// Run a remediation cycle on an interval until Ctrl+C
    Watch {
        /// Seconds between cycles (default: workflow.monitor_interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Resume a run that is waiting for approval
    #[command(group(ArgGroup::new("decision").required(true).args(["approve", "reject"])))]
    Resume {
        /// Approve the held plan and execute it
        #[arg(long)]
        approve: bool,

        /// Reject the held plan and escalate
        #[arg(long)]
        reject: bool,
    },

    /// Check every monitored service once
    Status,

    /// Show recorded remediation episodes
    Episodes {
        /// Show only the most recent N episodes
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Manage monitored service definitions
    Services {
        #[command(subcommand)]
        services_command: ServicesCommands,
    },

    /// Classify a command with the security policy gate
    Check {
        /// The shell command to classify
        command: String,
    },

    /// Ask the knowledge base a question
    Ask {
        /// Free-text question about the monitored services
        question: String,
    },

    /// Start the HTTP + WebSocket gateway
    Gateway {
        /// Port to listen on (use 0 for random available port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServicesCommands {
    /// List monitored services in monitoring order
    List,

    /// Add or replace a service definition
    Add {
        name: String,

        /// Command whose output shows the service state
        #[arg(long)]
        check: String,

        /// Substring of healthy check output
        #[arg(long)]
        indicator: String,

        /// Category label (web_server, database, ...)
        #[arg(long = "type", default_value = "custom")]
        kind: String,
    },

    /// Remove a service definition
    Remove { name: String },
}
