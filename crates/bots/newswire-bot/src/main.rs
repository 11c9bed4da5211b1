use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use newswire_bot::bot::{Bot, BotError};
use newswire_bot::composer::compose;
use newswire_bot::lifecycle::{BatchOutcome, ModeOverride, RunState};
use newswire_bot::notifier::{ChatInfo, NoopNotifier, Notifier, NotifyError, TelegramNotifier};
use newswire_bot::publisher::{PublishError, XPublisher};
use newswire_bot::scorer::{self, Evaluator, LlmScorer, ScorerError};
use newswire_bot::source::{
    ArticleSource, AtomFeedSource, FallbackSource, SourceError, TechCrunchSource,
};
use newswire_bot::{LOG_TARGET, PROJECT_NAME};
use newswire_core::{
    Article, ArticleError, AutomationConfig, ClockTime, ConfigFieldError, PendingId, ScoreResult,
    Timestamp,
};
use newswire_db::{Database, DbError, LEDGER_RETENTION_DAYS};
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use snafu::{ResultExt as _, Snafu};
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Logging initialization failed"))]
    Logging,
    #[snafu(display("Failed to create data dir {}", path.display()))]
    DataDir { path: PathBuf, source: io::Error },
    #[snafu(display("Database error"))]
    Database { source: DbError },
    #[snafu(display("Bot error"))]
    Bot { source: BotError },
    #[snafu(display("Article source error"))]
    Source { source: SourceError },
    #[snafu(display("Scorer error"))]
    Scorer { source: ScorerError },
    #[snafu(display("Publisher error"))]
    Publisher { source: PublishError },
    #[snafu(display("Notification error"))]
    Notify { source: NotifyError },
    #[snafu(display("Invalid article"))]
    Article { source: ArticleError },
    #[snafu(display("JSON output failed"))]
    Json { source: serde_json::Error },
    #[snafu(display("Invalid settings: {}", format_field_errors(errors)))]
    InvalidSettings { errors: Vec<ConfigFieldError> },
    #[snafu(display("--{flag} is required for this command"))]
    MissingOption { flag: &'static str },
    #[snafu(display("Refusing to reset without --yes"))]
    ResetNotConfirmed,
}

pub type CliResult<T> = std::result::Result<T, CliError>;

fn format_field_errors(errors: &[ConfigFieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Newswire Bot - turns tech news into short social posts
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    #[command(subcommand)]
    pub command: Command,

    /// Data dir to store the database in
    #[arg(long, env = "NEWSWIRE_DATA_DIR", default_value = ".newswire")]
    pub data_dir: PathBuf,

    /// API key of the OpenAI-compatible model endpoint
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible model endpoint
    #[arg(long, env = "NEWSWIRE_LLM_BASE_URL", default_value = scorer::DEFAULT_BASE_URL)]
    pub llm_base_url: String,

    /// Model used for scoring and summaries
    #[arg(long, env = "NEWSWIRE_LLM_MODEL", default_value = scorer::DEFAULT_MODEL)]
    pub llm_model: String,

    /// User-context access token for the X API
    #[arg(long, env = "X_ACCESS_TOKEN", hide_env_values = true)]
    pub x_access_token: Option<String>,

    /// Telegram bot token for publish notifications
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: Option<String>,

    /// Extra Atom feeds, tried when TechCrunch yields nothing
    #[arg(long = "atom-feed", env = "NEWSWIRE_ATOM_FEEDS", value_delimiter = ',')]
    pub atom_feeds: Vec<Url>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler, or a single batch
    Run {
        /// Run one batch now and exit, ignoring `auto_mode`
        #[arg(long)]
        once: bool,

        /// Override the stored posting mode for this process
        #[arg(long, value_enum)]
        mode: Option<ModeOverride>,
    },
    /// Inspect and decide on queued posts
    Pending {
        #[command(subcommand)]
        pending_command: PendingCommand,
    },
    /// Inspect the record of published articles
    Ledger {
        #[command(subcommand)]
        ledger_command: LedgerCommand,
    },
    /// Show or change automation settings
    Config {
        #[command(subcommand)]
        config_command: ConfigCommand,
    },
    /// Show counts of stored data
    Stats,
    /// Delete the ledger and the pending queue; settings are kept
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Development commands
    Dev {
        #[command(subcommand)]
        dev_command: DevCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum PendingCommand {
    /// List queued posts
    List {
        /// Include posted and rejected entries
        #[arg(long)]
        all: bool,
    },
    /// Publish a queued post
    Approve { id: PendingId },
    /// Reject a queued post
    Reject { id: PendingId },
    /// Remove every entry that was not posted
    Clear,
}

#[derive(Debug, Subcommand)]
pub enum LedgerCommand {
    /// List the newest published articles
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Drop old and duplicate entries
    Compact {
        #[arg(long, default_value_t = LEDGER_RETENTION_DAYS)]
        retention_days: u64,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the settings as JSON
    Show,
    /// Change some settings; all of them are validated before saving
    Set(ConfigUpdate),
}

#[derive(Debug, Clone, Args)]
pub struct ConfigUpdate {
    #[arg(long)]
    pub auto_mode: Option<bool>,
    #[arg(long)]
    pub min_score: Option<u8>,
    #[arg(long)]
    pub check_interval_hours: Option<f64>,
    #[arg(long)]
    pub max_articles_per_run: Option<u32>,
    #[arg(long)]
    pub auto_post_enabled: Option<bool>,
    #[arg(long)]
    pub require_manual_approval: Option<bool>,
    #[arg(long)]
    pub rate_limit_secs: Option<f64>,
    #[arg(long)]
    pub working_hours_only: Option<bool>,
    #[arg(long)]
    pub working_hours_start: Option<ClockTime>,
    #[arg(long)]
    pub working_hours_end: Option<ClockTime>,
    #[arg(long)]
    pub weekend_enabled: Option<bool>,
    #[arg(long, allow_negative_numbers = true)]
    pub utc_offset_minutes: Option<i16>,
    #[arg(long)]
    pub telegram_notifications: Option<bool>,
    #[arg(long)]
    pub telegram_chat_id: Option<String>,
}

impl ConfigUpdate {
    fn apply(self, config: &mut AutomationConfig) {
        macro_rules! set {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = self.$field { config.$field = v; })*
            };
        }
        set!(
            auto_mode,
            min_score,
            check_interval_hours,
            max_articles_per_run,
            auto_post_enabled,
            require_manual_approval,
            rate_limit_secs,
            working_hours_only,
            working_hours_start,
            working_hours_end,
            weekend_enabled,
            utc_offset_minutes,
            telegram_notifications,
        );
        if let Some(chat_id) = self.telegram_chat_id {
            config.telegram_chat_id = Some(chat_id).filter(|id| !id.is_empty());
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum DevCommand {
    /// Fetch and print candidate articles
    Scrape,
    /// Score and compose a post for an article without publishing it
    Compose {
        #[arg(long)]
        title: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "")]
        content: String,
        /// Skip the model and compose from fallback tiers
        #[arg(long)]
        offline: bool,
        /// Seed for the composer's random choices
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List chats that recently messaged the Telegram bot
    TelegramChatId {
        /// Store the first chat found as the notification target
        #[arg(long)]
        save: bool,
    },
    /// Send a test notification
    Notify {
        #[arg(long, default_value = "Test notification")]
        message: String,
    },
}

#[snafu::report]
#[tokio::main]
async fn main() -> CliResult<()> {
    init_logging()?;

    let opts = Opts::parse();

    match opts.command {
        Command::Run { once, mode } => run(&opts, once, mode).await,
        Command::Pending { ref pending_command } => handle_pending(&opts, pending_command).await,
        Command::Ledger { ref ledger_command } => handle_ledger(&opts, ledger_command).await,
        Command::Config { ref config_command } => handle_config(&opts, config_command).await,
        Command::Stats => handle_stats(&opts).await,
        Command::Reset { yes } => handle_reset(&opts, yes).await,
        Command::Dev { ref dev_command } => handle_dev(&opts, dev_command).await,
    }
}

async fn open_db(data_dir: &Path) -> CliResult<Arc<Database>> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context(DataDirSnafu { path: data_dir })?;
    let db = Database::open(data_dir.join("newswire.redb"))
        .await
        .context(DatabaseSnafu)?;
    Ok(Arc::new(db))
}

fn build_source(opts: &Opts) -> CliResult<Box<dyn ArticleSource>> {
    let mut sources: Vec<Box<dyn ArticleSource>> =
        vec![Box::new(TechCrunchSource::new().context(SourceSnafu)?)];
    for feed in &opts.atom_feeds {
        sources.push(Box::new(
            AtomFeedSource::new(feed.clone()).context(SourceSnafu)?,
        ));
    }
    Ok(Box::new(FallbackSource::new(sources)))
}

fn build_scorer(opts: &Opts) -> CliResult<Arc<LlmScorer>> {
    if opts.llm_api_key.is_none() {
        warn!(target: LOG_TARGET, "No model API key, every article gets the neutral score");
    }
    let scorer = LlmScorer::builder()
        .maybe_api_key(opts.llm_api_key.clone())
        .base_url(opts.llm_base_url.clone())
        .model(opts.llm_model.clone())
        .build()
        .context(ScorerSnafu)?;
    Ok(Arc::new(scorer))
}

fn build_notifier(opts: &Opts, config: &AutomationConfig) -> CliResult<Arc<dyn Notifier>> {
    match (&opts.telegram_bot_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Ok(Arc::new(
            TelegramNotifier::new(token.clone(), chat_id.clone()).context(NotifySnafu)?,
        )),
        _ => {
            if config.telegram_notifications {
                info!(target: LOG_TARGET, "Telegram token or chat id missing, notifications off");
            }
            Ok(Arc::new(NoopNotifier))
        }
    }
}

async fn build_bot(opts: &Opts, mode: Option<ModeOverride>) -> CliResult<Bot> {
    let db = open_db(&opts.data_dir).await?;
    let config = db.load_config().await.context(DatabaseSnafu)?;

    if opts.x_access_token.is_none() {
        warn!(target: LOG_TARGET, "No X access token, publishing will fail");
    }
    let publisher = XPublisher::new(opts.x_access_token.clone()).context(PublisherSnafu)?;

    Ok(Bot::builder()
        .db(db)
        .source(build_source(opts)?)
        .scorer(build_scorer(opts)?)
        .publisher(Arc::new(publisher))
        .notifier(build_notifier(opts, &config)?)
        .maybe_mode(mode)
        .build())
}

async fn run(opts: &Opts, once: bool, mode: Option<ModeOverride>) -> CliResult<()> {
    let bot = build_bot(opts, mode).await?;
    let mut state = RunState::default();

    if once {
        match bot
            .run_batch(&mut state, Timestamp::now())
            .await
            .context(BotSnafu)?
        {
            BatchOutcome::Completed(summary) => println!("{summary}"),
            BatchOutcome::Skipped(reason) => println!("Skipped: {reason}"),
        }
        return Ok(());
    }

    info!(target: LOG_TARGET, "Starting {PROJECT_NAME}. Press Ctrl+C to stop.");
    tokio::select! {
        res = bot.run_scheduler(&mut state) => res.context(BotSnafu),
        _ = tokio::signal::ctrl_c() => {
            info!(target: LOG_TARGET, "Shutting down");
            Ok(())
        }
    }
}

async fn handle_pending(opts: &Opts, command: &PendingCommand) -> CliResult<()> {
    let now = Timestamp::now();
    match command {
        PendingCommand::List { all } => {
            let db = open_db(&opts.data_dir).await?;
            let entries = if *all {
                db.list_all_pending().await
            } else {
                db.list_pending().await
            }
            .context(DatabaseSnafu)?;

            for (id, entry) in entries {
                println!(
                    "#{id} [{}] score {} ({}, {})",
                    entry.status, entry.score, entry.post.tier, entry.created_at
                );
                println!("  {}", entry.article.title());
                for line in entry.post.final_text.lines() {
                    println!("  | {line}");
                }
                if let Some(receipt) = entry.receipt {
                    println!("  -> {}", receipt.url);
                }
                println!();
            }
        }
        PendingCommand::Approve { id } => {
            let bot = build_bot(opts, None).await?;
            let receipt = bot.approve(*id, now).await.context(BotSnafu)?;
            println!("Published #{id}: {}", receipt.url);
        }
        PendingCommand::Reject { id } => {
            let db = open_db(&opts.data_dir).await?;
            db.reject_pending(*id, now).await.context(DatabaseSnafu)?;
            println!("Rejected #{id}");
        }
        PendingCommand::Clear => {
            let db = open_db(&opts.data_dir).await?;
            let removed = db.clear_pending().await.context(DatabaseSnafu)?;
            println!("Removed {removed} entries");
        }
    }
    Ok(())
}

async fn handle_ledger(opts: &Opts, command: &LedgerCommand) -> CliResult<()> {
    let db = open_db(&opts.data_dir).await?;
    match command {
        LedgerCommand::List { limit } => {
            for entry in db.list_ledger(*limit).await.context(DatabaseSnafu)? {
                println!("{}  {}", entry.posted_at, entry.title);
                println!("  {}", entry.url);
                println!("  {}", entry.external_post_url);
            }
        }
        LedgerCommand::Compact { retention_days } => {
            let report = db
                .compact_ledger(*retention_days, Timestamp::now())
                .await
                .context(DatabaseSnafu)?;
            println!("Kept {}, removed {}", report.kept, report.removed);
        }
    }
    Ok(())
}

async fn handle_config(opts: &Opts, command: &ConfigCommand) -> CliResult<()> {
    let db = open_db(&opts.data_dir).await?;
    let config = match command {
        ConfigCommand::Show => db.load_config().await.context(DatabaseSnafu)?,
        ConfigCommand::Set(update) => {
            let mut config = db.load_config().await.context(DatabaseSnafu)?;
            update.clone().apply(&mut config);
            match db.save_config(config, Timestamp::now()).await {
                Ok(saved) => saved,
                Err(DbError::InvalidConfig { errors }) => {
                    return InvalidSettingsSnafu { errors }.fail();
                }
                Err(err) => return Err(err).context(DatabaseSnafu),
            }
        }
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context(JsonSnafu)?
    );
    Ok(())
}

async fn handle_stats(opts: &Opts) -> CliResult<()> {
    let db = open_db(&opts.data_dir).await?;
    let stats = db.stats(Timestamp::now()).await.context(DatabaseSnafu)?;
    let config = db.load_config().await.context(DatabaseSnafu)?;

    println!("Published (ledger):  {}", stats.ledger_entries);
    println!("Published (7 days):  {}", stats.posted_last_7_days);
    println!("Pending:             {}", stats.pending);
    println!("Approved:            {}", stats.posted);
    println!("Rejected:            {}", stats.rejected);
    println!(
        "Auto mode:           {}",
        if config.auto_mode { "on" } else { "off" }
    );
    println!(
        "Posting:             {}",
        if config.posts_automatically() {
            "automatic"
        } else {
            "manual approval"
        }
    );
    Ok(())
}

async fn handle_reset(opts: &Opts, yes: bool) -> CliResult<()> {
    if !yes {
        return ResetNotConfirmedSnafu.fail();
    }
    let db = open_db(&opts.data_dir).await?;
    let before = db.reset().await.context(DatabaseSnafu)?;
    println!(
        "Removed {} ledger entries and {} queue entries",
        before.ledger_entries,
        before.pending + before.posted + before.rejected
    );
    Ok(())
}

async fn handle_dev(opts: &Opts, command: &DevCommand) -> CliResult<()> {
    match command {
        DevCommand::Scrape => {
            let source = build_source(opts)?;
            let articles = source.fetch_candidates().await.context(SourceSnafu)?;
            println!("Fetched {} articles:", articles.len());
            println!();
            for (i, article) in articles.iter().enumerate() {
                println!("Article {}: ", i + 1);
                println!("  Title: {}", article.title());
                println!("  URL: {}", article.url());
                println!("  Source: {}", article.source());
                println!("  Hash: {}", article.content_hash());
                println!("  Content: {} chars", article.content().chars().count());
                println!();
            }
        }
        DevCommand::Compose {
            title,
            url,
            content,
            offline,
            seed,
        } => {
            let article = Article::new(
                title.as_str(),
                url.as_str(),
                content.as_str(),
                "cli",
                Timestamp::now(),
            )
            .context(ArticleSnafu)?;
            let score = if *offline {
                ScoreResult::fallback()
            } else {
                Evaluator::new(build_scorer(opts)?).evaluate(&article).await
            };
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(*seed),
                None => StdRng::from_os_rng(),
            };
            let post = compose(&article, &score, &mut rng);

            println!(
                "Score {} ({:?}, {}), tier {}, {} chars",
                score.importance,
                score.source,
                score.audience,
                post.tier,
                post.final_text.chars().count()
            );
            println!();
            println!("{}", post.final_text);
        }
        DevCommand::TelegramChatId { save } => {
            let token = opts
                .telegram_bot_token
                .as_deref()
                .ok_or(CliError::MissingOption {
                    flag: "telegram-bot-token",
                })?;
            let chats = TelegramNotifier::recent_chat_ids(token)
                .await
                .context(NotifySnafu)?;
            if chats.is_empty() {
                println!("No chats found. Send the bot a message first.");
                return Ok(());
            }
            for ChatInfo {
                chat_id,
                kind,
                title,
            } in &chats
            {
                println!("{chat_id}  {kind}  {title}");
            }

            if *save {
                let chat_id = chats[0].chat_id.to_string();
                let db = open_db(&opts.data_dir).await?;
                let mut config = db.load_config().await.context(DatabaseSnafu)?;
                config.telegram_chat_id = Some(chat_id.clone());
                db.save_config(config, Timestamp::now())
                    .await
                    .context(DatabaseSnafu)?;
                println!("Saved chat id {chat_id}");
            }
        }
        DevCommand::Notify { message } => {
            let db = open_db(&opts.data_dir).await?;
            let config = db.load_config().await.context(DatabaseSnafu)?;
            let token = opts
                .telegram_bot_token
                .clone()
                .ok_or_else(|| CliError::MissingOption {
                    flag: "telegram-bot-token",
                })?;
            let chat_id = config
                .telegram_chat_id
                .ok_or_else(|| CliError::MissingOption {
                    flag: "telegram-chat-id",
                })?;
            TelegramNotifier::new(token, chat_id)
                .context(NotifySnafu)?
                .notify(message, "https://example.com", "Test")
                .await
                .context(NotifySnafu)?;
            println!("Notification sent");
        }
    }
    Ok(())
}

pub fn init_logging() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| CliError::Logging)?;

    Ok(())
}
