//! Subcommand handlers.
//!
//! Each handler builds the client it needs from the selected profile, performs one
//! operation and prints the result as a table or, with `--json`, as JSON.

use std::collections::BTreeMap;
use std::path::Path;

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{
    ApiError, Auth, AuthState, ConfluenceClient, CookieJar, CreateRequest, EditRequest,
    JiraClient, LinkRequest, Session, TransitionRequest, TransportOptions,
};
use crate::cli::{AttachCommand, Cli, Command, CreateArgs, EditArgs, LinkCommand};
use crate::config::{Config, ConfigError, Profile};
use crate::credentials::{self, CredentialQuery, CredentialSource};
use crate::error::{AppError, Result};
use crate::output::{self, Column};

/// Profile name used when the server comes from `--endpoint` alone.
const DEFAULT_PROFILE_NAME: &str = "default";

/// The server and identity a command runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    profile: String,
    url: String,
    username: Option<String>,
    wiki_url: Option<String>,
}

impl Target {
    /// Combine the selected profile with `--endpoint` and `--user`.
    fn select(config: &Config, cli: &Cli) -> Result<Self> {
        let profile = match config.select_profile(cli.profile.as_deref()) {
            Ok(profile) => profile,
            Err(ConfigError::ProfileNotFound(_)) if cli.endpoint.is_some() => None,
            Err(e) => return Err(e.into()),
        };
        let name = cli
            .profile
            .clone()
            .or_else(|| profile.map(|p| p.name.clone()))
            .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string());
        let url = cli
            .endpoint
            .clone()
            .or_else(|| profile.map(|p| p.url.clone()))
            .ok_or_else(|| {
                AppError::usage(
                    "No server configured. Pass --endpoint or add a profile to the configuration file.",
                )
            })?;
        Ok(Self {
            profile: name,
            url,
            username: cli
                .user
                .clone()
                .or_else(|| profile.and_then(|p| p.username.clone())),
            wiki_url: profile.and_then(|p| p.wiki_url.clone()),
        })
    }

    fn query_for(&self, url: &str) -> Result<CredentialQuery> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| AppError::usage(format!("'{}' is not a valid server URL", url)))?;
        Ok(CredentialQuery {
            host,
            profile: self.profile.clone(),
            username: self.username.clone(),
        })
    }
}

/// The parts of a client the authentication step needs.
trait Authenticate {
    fn session(&self) -> &Session;
    fn set_credentials(&mut self, auth: Auth);
    async fn ensure_authenticated(&mut self) -> crate::api::Result<()>;
}

impl Authenticate for JiraClient {
    fn session(&self) -> &Session {
        JiraClient::session(self)
    }

    fn set_credentials(&mut self, auth: Auth) {
        JiraClient::set_credentials(self, auth);
    }

    async fn ensure_authenticated(&mut self) -> crate::api::Result<()> {
        JiraClient::ensure_authenticated(self).await
    }
}

impl Authenticate for ConfluenceClient {
    fn session(&self) -> &Session {
        ConfluenceClient::session(self)
    }

    fn set_credentials(&mut self, auth: Auth) {
        ConfluenceClient::set_credentials(self, auth);
    }

    async fn ensure_authenticated(&mut self) -> crate::api::Result<()> {
        ConfluenceClient::ensure_authenticated(self).await
    }
}

/// Shared state for one invocation.
struct Context<'a> {
    cli: &'a Cli,
    config: &'a Config,
    target: Target,
    /// Consulted before any request.
    sources: Vec<Box<dyn CredentialSource>>,
    /// Consulted only when the server rejects the stored session.
    prompt: Option<Box<dyn CredentialSource>>,
}

impl Context<'_> {
    fn options(&self) -> TransportOptions {
        TransportOptions {
            timeout: self.config.settings.timeout(),
            ca_cert: self.config.settings.cacert.clone(),
        }
    }

    fn cookie_jar(&self) -> Result<CookieJar> {
        if self.cli.no_cookies {
            return Ok(CookieJar::in_memory());
        }
        match self.config.settings.cookie_path() {
            Some(path) => Ok(CookieJar::load(path)?),
            None => Ok(CookieJar::in_memory()),
        }
    }

    fn auth_for(&self, url: &str) -> Result<Auth> {
        let query = self.target.query_for(url)?;
        Ok(credentials::resolve(&self.sources, &query))
    }

    async fn jira(&self) -> Result<JiraClient> {
        let auth = self.auth_for(&self.target.url)?;
        let mut client = JiraClient::new(
            &self.target.url,
            auth,
            self.cookie_jar()?,
            &self.options(),
        )?;
        self.authenticate(&mut client, &self.target.url).await?;
        Ok(client)
    }

    async fn confluence(&self) -> Result<ConfluenceClient> {
        let url = self.target.wiki_url.as_deref().ok_or_else(|| {
            AppError::usage(format!(
                "Profile '{}' has no wiki_url configured",
                self.target.profile
            ))
        })?;
        let auth = self.auth_for(url)?;
        let mut client = ConfluenceClient::new(url, auth, self.cookie_jar()?, &self.options())?;
        self.authenticate(&mut client, url).await?;
        Ok(client)
    }

    /// Check the stored session, asking the prompt for credentials only if the
    /// server turned it down. A rejected retry is final.
    async fn authenticate<C: Authenticate>(&self, client: &mut C, url: &str) -> Result<()> {
        let rejected = match client.ensure_authenticated().await {
            Ok(()) if client.session().state() == AuthState::Authenticated => return Ok(()),
            Ok(()) => None,
            Err(e @ ApiError::AuthenticationFailed(_)) => Some(e),
            Err(e) => return Err(e.into()),
        };
        let give_up = |rejected: Option<ApiError>| -> Result<()> {
            rejected.map_or(Ok(()), |e| Err(e.into()))
        };

        let Some(prompt) = &self.prompt else {
            return give_up(rejected);
        };
        match prompt.lookup(&self.target.query_for(url)?) {
            Ok(Some(credentials)) => {
                debug!("Retrying with credentials from {}", prompt.name());
                client.set_credentials(credentials.into_auth());
                client.ensure_authenticated().await?;
                Ok(())
            }
            Ok(None) => give_up(rejected),
            Err(e) => {
                warn!("Skipping credential source {}: {}", prompt.name(), e);
                give_up(rejected)
            }
        }
    }

    fn columns(&self) -> Vec<Column> {
        output::choose_columns(self.cli.columns.as_deref(), &self.config.settings.columns)
    }
}

/// Run the parsed command line against the configuration file.
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    run_with(
        &cli,
        &config,
        credentials::stored_sources(),
        Some(credentials::interactive_source()),
    )
    .await
}

/// Run with an explicit configuration and credential sources.
///
/// `prompt` is asked only after the server rejects the stored session.
pub async fn run_with(
    cli: &Cli,
    config: &Config,
    sources: Vec<Box<dyn CredentialSource>>,
    prompt: Option<Box<dyn CredentialSource>>,
) -> Result<()> {
    let target = Target::select(config, cli)?;
    debug!("Using profile {} at {}", target.profile, target.url);
    let ctx = Context {
        cli,
        config,
        target,
        sources,
        prompt,
    };

    match &cli.command {
        Command::Jql { query } => {
            let issues = ctx.jira().await?.search(query).await?;
            let columns = ctx.columns();
            if cli.json {
                let rows: Vec<Value> = issues
                    .iter()
                    .map(|issue| output::flatten_json(issue, &columns))
                    .collect();
                print_json(&rows)?;
            } else {
                println!("{}", output::issue_table(&issues, &columns));
            }
        }
        Command::Show { key } => {
            let issue = ctx.jira().await?.get_issue(key).await?;
            if cli.json {
                print_json(&output::flatten_json(&issue, &Column::KNOWN))?;
            } else {
                println!("{}", output::issue_details(&issue));
            }
        }
        Command::Comments { key } => {
            let comments = ctx.jira().await?.comments(key).await?;
            if cli.json {
                print_json(&comments)?;
            } else {
                println!("{}", output::comments_table(&comments));
            }
        }
        Command::Comment { key, text } => {
            let comment = ctx.jira().await?.add_comment(key, text).await?;
            report(cli, &comment, format!("Added comment to {}", key))?;
        }
        Command::Transition {
            key,
            state,
            comment,
            resolution,
        } => {
            let request = TransitionRequest {
                target: state.clone(),
                comment: comment.clone(),
                resolution: resolution.clone(),
            };
            let warnings = ctx.jira().await?.transition(key, &request).await?;
            print_warnings(&warnings);
            println!("Transitioned {} to {}", key, state);
        }
        Command::Edit(args) => {
            let request = edit_request(args);
            let warnings = ctx.jira().await?.update(&args.key, &request).await?;
            print_warnings(&warnings);
            println!("Updated {}", args.key);
        }
        Command::Create(args) => {
            let request = create_request(args);
            let (created, warnings) = ctx.jira().await?.create(&request).await?;
            print_warnings(&warnings);
            let key = created.get("key").and_then(Value::as_str).unwrap_or("?");
            report(cli, &created, format!("Created {}", key))?;
        }
        Command::Delete { key } => {
            ctx.jira().await?.delete_issue(key).await?;
            println!("Deleted {}", key);
        }
        Command::Link(link) => run_link(&ctx, link).await?,
        Command::Attach(attach) => run_attach(&ctx, attach).await?,
        Command::Components { project } => {
            let components = ctx.jira().await?.components(project).await?;
            if cli.json {
                print_json(&components)?;
            } else {
                println!("{}", output::components_table(&components));
            }
        }
        Command::Wiki { page_id } => {
            let page = ctx.confluence().await?.get_page(page_id).await?;
            if cli.json {
                print_json(&page)?;
            } else {
                println!("{}", output::page_text(&page));
            }
        }
        Command::Login => login(&ctx).await?,
        Command::Logout => logout(&ctx)?,
    }
    Ok(())
}

async fn run_link(ctx: &Context<'_>, command: &LinkCommand) -> Result<()> {
    match command {
        LinkCommand::Add { link, comment } => {
            let request = LinkRequest {
                outward_key: link.outward.clone(),
                inward_key: link.inward.clone(),
                link_type: link.link_type.clone(),
                comment: comment.clone(),
            };
            let link_type = ctx.jira().await?.link_issues(&request).await?;
            println!(
                "{} {} {}",
                request.outward_key, link_type.outward, request.inward_key
            );
        }
        LinkCommand::Rm { link } => {
            let request = LinkRequest {
                outward_key: link.outward.clone(),
                inward_key: link.inward.clone(),
                link_type: link.link_type.clone(),
                comment: None,
            };
            ctx.jira().await?.unlink_issues(&request).await?;
            println!("Removed link {} -> {}", request.outward_key, request.inward_key);
        }
    }
    Ok(())
}

async fn run_attach(ctx: &Context<'_>, command: &AttachCommand) -> Result<()> {
    let json = ctx.cli.json;
    match command {
        AttachCommand::Add { key, file } => {
            let attachment = ctx.jira().await?.attach_file(key, file).await?;
            report(
                ctx.cli,
                &attachment,
                format!("Attached {} ({}) to {}", attachment.filename, attachment.id, key),
            )?;
        }
        AttachCommand::Rm { target, name } => match name {
            Some(pattern) => {
                let deleted = ctx
                    .jira()
                    .await?
                    .delete_attachments_matching(target, pattern)
                    .await?;
                if json {
                    print_json(&deleted)?;
                } else {
                    for attachment in &deleted {
                        println!("Deleted {} ({})", attachment.filename, attachment.id);
                    }
                }
            }
            None => {
                ctx.jira().await?.delete_attachment(target).await?;
                println!("Deleted attachment {}", target);
            }
        },
        AttachCommand::Get { key } => {
            let attachments = ctx.jira().await?.attachments(key).await?;
            if json {
                print_json(&attachments)?;
            } else {
                println!("{}", output::attachments_table(&attachments));
            }
        }
        AttachCommand::Download {
            target,
            name,
            output,
        } => {
            let mut client = ctx.jira().await?;
            let dest = output.as_deref();
            let path = match name {
                Some(pattern) => {
                    client
                        .download_attachment_matching(target, pattern, dest)
                        .await?
                }
                None => client.download_attachment(target, dest).await?,
            };
            println!("Saved {}", path.display());
        }
    }
    Ok(())
}

/// Store a password for the selected profile, checking it against the server first.
async fn login(ctx: &Context<'_>) -> Result<()> {
    let target = &ctx.target;
    let username = target.username.clone().ok_or_else(|| {
        AppError::usage("A username is needed to log in. Pass --user or set one in the profile.")
    })?;
    let host = ctx.target.query_for(&target.url)?.host;
    let password = credentials::prompt_password(&format!("Password for {}@{}", username, host))?;

    let mut client = JiraClient::new(
        &target.url,
        Auth::new(&username, &password),
        ctx.cookie_jar()?,
        &ctx.options(),
    )?;
    client.ensure_authenticated().await?;

    credentials::store_password(&target.profile, &password)?;
    info!("Stored password for profile {}", target.profile);

    if ctx.cli.endpoint.is_some() {
        save_profile(ctx.config, target)?;
    }
    println!("Logged in to {} as {}", target.url, username);
    Ok(())
}

/// Record a profile given on the command line in the configuration file.
fn save_profile(config: &Config, target: &Target) -> Result<()> {
    let mut config = config.clone();
    let mut profile = Profile::new(
        target.profile.clone(),
        target.url.clone(),
        target.username.clone(),
    );
    profile.wiki_url = config
        .profile(&target.profile)
        .and_then(|p| p.wiki_url.clone());
    config.upsert_profile(profile)?;
    if config.settings.default_profile.is_none() {
        config.settings.default_profile = Some(target.profile.clone());
    }
    let path = Config::default_path()?;
    config.save_to(&path)?;
    println!("Saved profile '{}' to {}", target.profile, path.display());
    Ok(())
}

/// Forget the stored password and session cookies.
fn logout(ctx: &Context<'_>) -> Result<()> {
    let profile = &ctx.target.profile;
    if credentials::delete_password(profile)? {
        println!("Removed stored password for profile '{}'", profile);
    } else {
        println!("No stored password for profile '{}'", profile);
    }
    if let Some(path) = ctx.config.settings.cookie_path() {
        remove_if_exists(&path)?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Standard fields are sent as strings; custom field values may be JSON.
fn split_assignments(set: &[(String, String)]) -> (BTreeMap<String, Value>, BTreeMap<String, Value>) {
    let mut fields = BTreeMap::new();
    let mut custom = BTreeMap::new();
    for (field, value) in set {
        if field.starts_with("customfield_") {
            let parsed =
                serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.clone()));
            custom.insert(field.clone(), parsed);
        } else {
            fields.insert(field.clone(), Value::String(value.clone()));
        }
    }
    (fields, custom)
}

fn edit_request(args: &EditArgs) -> EditRequest {
    let (fields, custom_fields) = split_assignments(&args.set);
    EditRequest {
        fields,
        custom_fields,
        comment: args.comment.clone(),
        priority: args.priority.clone(),
        resolution: args.resolution.clone(),
        components: args.components.clone(),
        fix_versions: args.fix_versions.clone(),
        affects_versions: args.affects_versions.clone(),
        issue_type: args.issue_type.clone(),
        parent: args.parent.clone(),
        assignee: args.assignee.clone(),
    }
}

fn create_request(args: &CreateArgs) -> CreateRequest {
    let (mut fields, custom_fields) = split_assignments(&args.set);
    fields.insert("summary".to_string(), Value::String(args.summary.clone()));
    if let Some(description) = &args.description {
        fields.insert(
            "description".to_string(),
            Value::String(description.clone()),
        );
    }
    CreateRequest {
        project_key: args.project.clone(),
        fields,
        custom_fields,
        issue_type: args.issue_type.clone(),
        parent: args.parent.clone(),
        priority: args.priority.clone(),
        components: args.components.clone(),
        fix_versions: args.fix_versions.clone(),
        assignee: args.assignee.clone(),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::other(format!("could not render JSON: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Print `value` as JSON, or `message` otherwise.
fn report<T: Serialize>(cli: &Cli, value: &T, message: String) -> Result<()> {
    if cli.json {
        print_json(value)
    } else {
        println!("{}", message);
        Ok(())
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        warn!("{}", warning);
    }
}
