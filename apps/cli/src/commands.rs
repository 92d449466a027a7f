//! CLI command definitions, routing, and tracing setup.

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use voicebolt_core::{
    AssociationOutcome, CreateAgentOutcome, PipelineOptions, ProgressReporter, Services,
};
use voicebolt_crawler::{CrawlOptions, ExtractionMethod, FirecrawlClient, SiteContent};
use voicebolt_platform::{CallStats, ConversationSummary, PlatformClient, widget_snippet};
use voicebolt_shared::{
    AgentCreationData, AgentId, AppConfig, CreateAgentForm, DocumentId, KnowledgeDocument,
    init_config, ledger_path, load_config, normalize_website_url,
};
use voicebolt_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Voice Bolt: voice agents that know your website.
#[derive(Parser)]
#[command(
    name = "voicebolt",
    version,
    about = "Create voice agents grounded in a company's website.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create an agent from a company website.
    Create {
        /// Contact email the agent hands out.
        #[arg(long)]
        email: Option<String>,

        /// Company name.
        #[arg(long)]
        company: Option<String>,

        /// Company website (scheme optional).
        #[arg(long)]
        website: Option<String>,

        /// Agent name.
        #[arg(long)]
        name: Option<String>,

        /// Crawl several pages instead of only the landing page.
        #[arg(long)]
        deep: bool,

        /// Creation form as JSON, inline or a path to a file. Flags override its fields.
        #[arg(long)]
        form: Option<String>,
    },

    /// Scrape one page and print its Markdown.
    Scrape {
        /// Page URL.
        url: String,
    },

    /// Crawl a site and print the flattened knowledge document.
    Crawl {
        /// Root URL.
        url: String,

        /// Maximum pages (overrides config).
        #[arg(long)]
        limit: Option<u32>,

        /// Maximum link depth (overrides config).
        #[arg(long)]
        depth: Option<u32>,
    },

    /// Manage agents on the platform.
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },

    /// Manage knowledge-base documents on the platform.
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Inspect call history.
    Calls {
        #[command(subcommand)]
        action: CallsAction,
    },

    /// Show agents recorded in the local ledger.
    History,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Agent subcommands.
#[derive(Subcommand)]
pub(crate) enum AgentsAction {
    /// List agents on the account.
    List,
    /// Print an agent's full configuration.
    Show { agent_id: String },
    /// Delete an agent.
    Delete { agent_id: String },
    /// Link an existing knowledge document to an agent.
    Link {
        agent_id: String,
        document_id: String,
        /// Document name used in the knowledge-base entry.
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the HTML widget embed for an agent.
    Widget { agent_id: String },
}

/// Knowledge-base subcommands.
#[derive(Subcommand)]
pub(crate) enum KbAction {
    /// List knowledge-base documents.
    List,
    /// Delete a knowledge-base document.
    Delete { document_id: String },
    /// Let the platform ingest a URL directly as a document.
    AddUrl {
        url: String,
        /// Document name (defaults to the URL host).
        #[arg(long)]
        name: Option<String>,
    },
}

/// Call-history subcommands.
#[derive(Subcommand)]
pub(crate) enum CallsAction {
    /// List recent calls.
    List {
        /// Only calls to this agent.
        #[arg(long)]
        agent: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Print one call with transcript and analysis.
    Show { conversation_id: String },
    /// Summary statistics over recent calls.
    Stats {
        #[arg(long)]
        agent: Option<String>,
        #[arg(long, default_value = "100")]
        limit: usize,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "voicebolt=info",
        1 => "voicebolt=debug",
        _ => "voicebolt=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command. `config` subcommands run without loading the config file.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Config { action } => cmd_config(action),
        command => {
            let config = load_config()?;
            dispatch(command, &config).await
        }
    }
}

async fn dispatch(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Create {
            email,
            company,
            website,
            name,
            deep,
            form,
        } => {
            let form = build_form(form.as_deref(), email, company, website, name, deep)?;
            cmd_create(config, &form).await
        }
        Command::Scrape { url } => cmd_scrape(config, &url).await,
        Command::Crawl { url, limit, depth } => cmd_crawl(config, &url, limit, depth).await,
        Command::Agents { action } => match action {
            AgentsAction::List => cmd_agents_list(config).await,
            AgentsAction::Show { agent_id } => cmd_agents_show(config, &agent_id).await,
            AgentsAction::Delete { agent_id } => cmd_agents_delete(config, &agent_id).await,
            AgentsAction::Link {
                agent_id,
                document_id,
                name,
            } => cmd_agents_link(config, &agent_id, &document_id, name).await,
            AgentsAction::Widget { agent_id } => {
                println!("{}", widget_snippet(&AgentId::from(agent_id.as_str())));
                Ok(())
            }
        },
        Command::Kb { action } => match action {
            KbAction::List => cmd_kb_list(config).await,
            KbAction::Delete { document_id } => cmd_kb_delete(config, &document_id).await,
            KbAction::AddUrl { url, name } => cmd_kb_add_url(config, &url, name).await,
        },
        Command::Calls { action } => match action {
            CallsAction::List { agent, limit } => {
                cmd_calls_list(config, agent.as_deref(), limit).await
            }
            CallsAction::Show { conversation_id } => cmd_calls_show(config, &conversation_id).await,
            CallsAction::Stats { agent, limit } => {
                cmd_calls_stats(config, agent.as_deref(), limit).await
            }
        },
        Command::History => cmd_history(config).await,
        Command::Config { action } => cmd_config(action),
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

fn platform_client(config: &AppConfig) -> Result<PlatformClient> {
    let keys = Arc::new(config.platform.key_source());
    Ok(PlatformClient::new(&config.platform, keys)?)
}

fn firecrawl_client(config: &AppConfig) -> Result<FirecrawlClient> {
    let keys = Arc::new(config.firecrawl.key_source());
    Ok(FirecrawlClient::new(&config.firecrawl, keys)?)
}

/// Open the ledger if enabled. Failures only disable it.
async fn open_ledger(config: &AppConfig) -> Option<Storage> {
    if !config.pipeline.ledger {
        return None;
    }

    let path = match ledger_path(config) {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "ledger disabled");
            return None;
        }
    };

    match Storage::open(&path).await {
        Ok(storage) => Some(storage),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ledger disabled");
            None
        }
    }
}

/// Token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping");
            child.cancel();
        }
    });
    token
}

/// Merge `--form` JSON with individual flags; flags win.
fn build_form(
    form: Option<&str>,
    email: Option<String>,
    company: Option<String>,
    website: Option<String>,
    name: Option<String>,
    deep: bool,
) -> Result<CreateAgentForm> {
    let mut base = match form {
        Some(raw) => {
            let json = if raw.trim_start().starts_with('{') {
                raw.to_string()
            } else {
                std::fs::read_to_string(Path::new(raw))
                    .map_err(|e| eyre!("cannot read form file '{raw}': {e}"))?
            };
            serde_json::from_str::<CreateAgentForm>(&json)
                .map_err(|e| eyre!("invalid creation form: {e}"))?
        }
        None => CreateAgentForm {
            data: AgentCreationData {
                email: String::new(),
                company_name: String::new(),
                website_url: String::new(),
                agent_name: String::new(),
            },
            use_deep_extraction: false,
        },
    };

    if let Some(email) = email {
        base.data.email = email;
    }
    if let Some(company) = company {
        base.data.company_name = company;
    }
    if let Some(website) = website {
        base.data.website_url = website;
    }
    if let Some(name) = name {
        base.data.agent_name = name;
    }
    base.use_deep_extraction |= deep;

    Ok(base)
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

async fn cmd_create(config: &AppConfig, form: &CreateAgentForm) -> Result<()> {
    let firecrawl = firecrawl_client(config)?;
    let platform = platform_client(config)?;
    let ledger = open_ledger(config).await;
    let services = Services {
        firecrawl: &firecrawl,
        platform: &platform,
        ledger: ledger.as_ref(),
    };
    let opts = PipelineOptions::from_config(config);
    let cancel = cancel_on_ctrl_c();

    info!(
        company = %form.data.company_name,
        website = %form.data.website_url,
        deep = form.use_deep_extraction,
        "creating agent"
    );

    let reporter = CliProgress::new();
    let result = voicebolt_core::create_agent(form, &services, &opts, &reporter, &cancel).await;
    reporter.spinner.finish_and_clear();
    let outcome = result?;

    print_create_summary(&outcome);
    Ok(())
}

fn print_create_summary(outcome: &CreateAgentOutcome) {
    println!();
    println!("  Agent created successfully!");
    println!("  Agent ID:   {}", outcome.agent_id);
    match &outcome.document {
        Some(doc) => println!("  Document:   {} ({})", doc.id, doc.name),
        None => println!(
            "  Document:   none ({})",
            outcome.knowledge_error.as_deref().unwrap_or("not uploaded")
        ),
    }
    match &outcome.association {
        Some(association) => println!("  Knowledge:  {association}"),
        None => println!("  Knowledge:  not attached"),
    }
    println!(
        "  Source:     {} page(s) via {}",
        outcome.pages, outcome.extraction
    );
    println!("  Time:       {:.1}s", outcome.elapsed.as_secs_f64());
    println!();
    println!("  Embed the agent on your site:");
    println!("  {}", outcome.widget_snippet());
    println!();

    if !outcome.knowledge_linked() {
        println!("  Warning: the agent has no verified knowledge base.");
        println!("  Attach it from the platform dashboard, or run `voicebolt agents link`.");
        println!();
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn warn(&self, message: &str) {
        self.spinner.println(format!("  ! {message}"));
    }

    fn done(&self, _outcome: &CreateAgentOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// scrape / crawl
// ---------------------------------------------------------------------------

async fn cmd_scrape(config: &AppConfig, url: &str) -> Result<()> {
    let url = normalize_website_url(url)?;
    let page = firecrawl_client(config)?.scrape(&url).await?;

    if let Some(title) = &page.title {
        println!("# {title}\n");
    }
    println!("{}", page.markdown);
    Ok(())
}

async fn cmd_crawl(
    config: &AppConfig,
    url: &str,
    limit: Option<u32>,
    depth: Option<u32>,
) -> Result<()> {
    let url: Url = normalize_website_url(url)?;
    let mut opts = CrawlOptions::from(&config.crawl);
    if let Some(limit) = limit {
        opts.limit = limit;
    }
    if let Some(depth) = depth {
        opts.max_depth = depth;
    }

    let cancel = cancel_on_ctrl_c();
    let pages = firecrawl_client(config)?
        .crawl(&url, &opts, &cancel)
        .await?;

    info!(pages = pages.len(), "crawl finished");
    let site = SiteContent {
        root_url: url,
        method: ExtractionMethod::Crawl,
        pages,
    };
    println!("{}", site.to_document_text()?);
    Ok(())
}

// ---------------------------------------------------------------------------
// agents
// ---------------------------------------------------------------------------

async fn cmd_agents_list(config: &AppConfig) -> Result<()> {
    let agents = platform_client(config)?.list_agents().await?;

    if agents.is_empty() {
        println!("No agents found.");
        return Ok(());
    }

    println!("{:<32}  {:<24}  CREATED", "AGENT ID", "NAME");
    for agent in agents {
        let created = agent
            .created_at_unix_secs
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!("{:<32}  {:<24}  {created}", agent.agent_id, agent.name);
    }
    Ok(())
}

async fn cmd_agents_show(config: &AppConfig, agent_id: &str) -> Result<()> {
    let agent = platform_client(config)?
        .get_agent(&AgentId::from(agent_id))
        .await?;
    println!("{}", serde_json::to_string_pretty(&agent)?);
    Ok(())
}

async fn cmd_agents_delete(config: &AppConfig, agent_id: &str) -> Result<()> {
    platform_client(config)?
        .delete_agent(&AgentId::from(agent_id))
        .await?;

    if let Some(ledger) = open_ledger(config).await {
        if let Err(e) = ledger.forget_agent(agent_id).await {
            warn!(error = %e, "could not remove agent from the local ledger");
        }
    }

    println!("Deleted agent {agent_id}");
    Ok(())
}

async fn cmd_agents_link(
    config: &AppConfig,
    agent_id: &str,
    document_id: &str,
    name: Option<String>,
) -> Result<()> {
    let firecrawl = firecrawl_client(config)?;
    let platform = platform_client(config)?;
    let ledger = open_ledger(config).await;
    let services = Services {
        firecrawl: &firecrawl,
        platform: &platform,
        ledger: ledger.as_ref(),
    };
    let document = KnowledgeDocument {
        id: DocumentId::from(document_id),
        name: name.unwrap_or_else(|| document_id.to_string()),
    };
    let cancel = cancel_on_ctrl_c();

    let outcome = voicebolt_core::link_document(
        &services,
        config.association.settle.clone(),
        &AgentId::from(agent_id),
        &document,
        &cancel,
    )
    .await;

    println!("{outcome}");
    match outcome {
        AssociationOutcome::ManualActionRequired { .. } => {
            Err(eyre!("knowledge document {document_id} is not linked to agent {agent_id}"))
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// kb
// ---------------------------------------------------------------------------

async fn cmd_kb_list(config: &AppConfig) -> Result<()> {
    let documents = platform_client(config)?.list_documents().await?;

    if documents.is_empty() {
        println!("No knowledge-base documents found.");
        return Ok(());
    }

    println!("{:<32}  {:<6}  NAME", "DOCUMENT ID", "TYPE");
    for doc in documents {
        println!(
            "{:<32}  {:<6}  {}",
            doc.id,
            doc.kind.as_deref().unwrap_or("-"),
            doc.name
        );
    }
    Ok(())
}

async fn cmd_kb_delete(config: &AppConfig, document_id: &str) -> Result<()> {
    platform_client(config)?
        .delete_document(&DocumentId::from(document_id))
        .await?;
    println!("Deleted document {document_id}");
    Ok(())
}

async fn cmd_kb_add_url(config: &AppConfig, url: &str, name: Option<String>) -> Result<()> {
    let url = normalize_website_url(url)?;
    let name = name.unwrap_or_else(|| url.host_str().unwrap_or("website").to_string());
    let id = platform_client(config)?
        .create_url_document(&name, &url)
        .await?;
    println!("Created document {id} ({name})");
    Ok(())
}

// ---------------------------------------------------------------------------
// calls
// ---------------------------------------------------------------------------

async fn cmd_calls_list(config: &AppConfig, agent: Option<&str>, limit: usize) -> Result<()> {
    let calls = platform_client(config)?
        .collect_conversations(agent, limit)
        .await?;

    if calls.is_empty() {
        println!("No calls found.");
        return Ok(());
    }

    println!(
        "{:<32}  {:<16}  {:>8}  {:>5}  RESULT",
        "CONVERSATION ID", "STARTED", "DURATION", "MSGS"
    );
    for call in &calls {
        print_call_row(call);
    }
    Ok(())
}

fn print_call_row(call: &ConversationSummary) {
    let started = call
        .started_at()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into());
    let duration = format!(
        "{}:{:02}",
        call.call_duration_secs / 60,
        call.call_duration_secs % 60
    );
    println!(
        "{:<32}  {:<16}  {:>8}  {:>5}  {}",
        call.conversation_id, started, duration, call.message_count, call.call_successful
    );
}

async fn cmd_calls_show(config: &AppConfig, conversation_id: &str) -> Result<()> {
    let call = platform_client(config)?
        .get_conversation(conversation_id)
        .await?;
    println!("{}", serde_json::to_string_pretty(&call)?);
    Ok(())
}

async fn cmd_calls_stats(config: &AppConfig, agent: Option<&str>, limit: usize) -> Result<()> {
    let calls = platform_client(config)?
        .collect_conversations(agent, limit)
        .await?;
    let stats = CallStats::from_conversations(&calls);

    println!();
    println!("  Calls:            {}", stats.total_calls);
    println!(
        "  Total duration:   {}m {}s",
        stats.total_duration_secs / 60,
        stats.total_duration_secs % 60
    );
    println!("  Average duration: {:.0}s", stats.average_duration_secs);
    println!(
        "  Outcomes:         {} successful, {} failed, {} unknown",
        stats.successful, stats.failed, stats.unknown
    );
    println!("  Success rate:     {:.0}%", stats.success_rate * 100.0);
    println!("  Messages:         {}", stats.total_messages);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// history / config
// ---------------------------------------------------------------------------

async fn cmd_history(config: &AppConfig) -> Result<()> {
    let path = ledger_path(config)?;
    let ledger = Storage::open(&path).await?;
    let records = ledger.list_agents().await?;

    if records.is_empty() {
        println!("No agents recorded in {}", path.display());
        return Ok(());
    }

    println!(
        "{:<16}  {:<28}  {:<16}  {:<14}  WEBSITE",
        "CREATED", "AGENT ID", "COMPANY", "KNOWLEDGE"
    );
    for record in records {
        println!(
            "{:<16}  {:<28}  {:<16}  {:<14}  {}",
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.agent_id,
            record.company_name,
            record.association,
            record.website_url
        );
    }
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => cmd_config_init(),
        ConfigAction::Show => cmd_config_show(),
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
