//! Command-line interface definition.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Command-line client for JIRA and Confluence.
#[derive(Debug, Parser)]
#[command(name = "atlas")]
#[command(about = "Command-line client for JIRA and Confluence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
#[command(subcommand_required(true))]
#[command(disable_help_subcommand = true)]
#[command(max_term_width = 120)]
pub struct Cli {
    /// Profile from the configuration file
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// JIRA base URL, overriding the profile
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Login name, overriding the profile
    #[arg(long, short = 'u', global = true)]
    pub user: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Comma-separated issue columns, e.g. "key,status,summary"
    #[arg(long, global = true)]
    pub columns: Option<String>,

    /// Keep session cookies in memory only
    #[arg(long, global = true)]
    pub no_cookies: bool,

    /// Sets the level of verbosity (can be used multiple times)
    #[arg(
        short = 'v',
        long = "verbose",
        global = true,
        action = ArgAction::Count,
        long_help = "Sets the level of verbosity for stderr logging.\n\n\
                 -v: Show info level messages\n\
                 -vv: Show debug level messages\n\
                 -vvv: Show trace level messages"
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search issues with a JQL query
    Jql {
        query: String,
    },

    /// Show one issue
    Show {
        /// Issue key or numeric id
        key: String,
    },

    /// List the comments of an issue
    Comments {
        key: String,
    },

    /// Add a comment to an issue
    Comment {
        key: String,
        text: String,
    },

    /// Move an issue through its workflow
    #[command(long_about = "Move an issue through its workflow.\n\n\
            STATE is matched case-insensitively against the names of the available\n\
            transitions and against the states they lead to.")]
    Transition {
        key: String,
        state: String,
        #[arg(long)]
        comment: Option<String>,
        /// Resolution to set, e.g. "Fixed"
        #[arg(long)]
        resolution: Option<String>,
    },

    /// Change fields of an issue
    Edit(EditArgs),

    /// Create an issue
    Create(CreateArgs),

    /// Delete an issue
    Delete {
        key: String,
    },

    /// Create or remove issue links
    #[command(subcommand)]
    Link(LinkCommand),

    /// Manage attachments
    #[command(subcommand)]
    Attach(AttachCommand),

    /// List the components of a project
    Components {
        project: String,
    },

    /// Show a Confluence page
    Wiki {
        page_id: String,
    },

    /// Store a password in the system keyring
    #[command(long_about = "Store a password in the system keyring.\n\n\
            With --endpoint the profile is also created or updated in the\n\
            configuration file.")]
    Login,

    /// Remove the stored password of a profile
    Logout,
}

/// Arguments of `atlas edit`.
///
/// Multi-value flags take a `+name` (add), `-name` (remove) or bare `name` (add);
/// names are regular expressions matched case-insensitively.
#[derive(Debug, Args)]
pub struct EditArgs {
    pub key: String,

    /// Set a field, e.g. summary="New title" or customfield_10010=42
    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,

    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long = "component", allow_hyphen_values = true)]
    pub components: Vec<String>,

    #[arg(long = "fix-version", allow_hyphen_values = true)]
    pub fix_versions: Vec<String>,

    #[arg(long = "affects-version", allow_hyphen_values = true)]
    pub affects_versions: Vec<String>,

    /// Issue type; an empty value picks the project default
    #[arg(long)]
    pub issue_type: Option<String>,

    /// Parent issue key, for sub-tasks
    #[arg(long)]
    pub parent: Option<String>,

    #[arg(long)]
    pub assignee: Option<String>,

    #[arg(long)]
    pub resolution: Option<String>,

    #[arg(long)]
    pub comment: Option<String>,
}

/// Arguments of `atlas create`.
#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub project: String,

    #[arg(long)]
    pub summary: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub issue_type: Option<String>,

    #[arg(long)]
    pub parent: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long = "component", allow_hyphen_values = true)]
    pub components: Vec<String>,

    #[arg(long = "fix-version", allow_hyphen_values = true)]
    pub fix_versions: Vec<String>,

    #[arg(long)]
    pub assignee: Option<String>,

    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct LinkArgs {
    /// Issue the link points from
    pub outward: String,
    /// Link type name pattern, e.g. "blocks"
    pub link_type: String,
    /// Issue the link points to
    pub inward: String,
}

#[derive(Debug, Subcommand)]
pub enum LinkCommand {
    /// Link two issues
    Add {
        #[command(flatten)]
        link: LinkArgs,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Remove a link between two issues
    Rm {
        #[command(flatten)]
        link: LinkArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum AttachCommand {
    /// Upload a file to an issue
    Add {
        key: String,
        file: PathBuf,
    },
    /// Delete attachments by id, or every attachment of an issue matching a filename pattern
    Rm {
        /// Attachment id, or issue key when --name is given
        target: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// List the attachments of an issue
    Get {
        key: String,
    },
    /// Download an attachment by id, or the first one of an issue matching a filename pattern
    Download {
        /// Attachment id, or issue key when --name is given
        target: String,
        #[arg(long)]
        name: Option<String>,
        /// Destination file or directory
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

/// Split `field=value` at the first `=`.
fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected FIELD=VALUE, got '{}'", raw)),
    }
}
