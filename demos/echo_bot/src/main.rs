//! Echo Bot Example
//!
//! Runs a chatbridge runtime against a console gateway: every line typed on
//! stdin arrives as a message from one user in one channel, and every reply
//! is printed to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot
//! cargo run --package echo-bot -- --config demos/echo_bot/config.yaml.example --dm
//! ```
//!
//! Then type `!help`, `!hello`, `!echo some text`, `!repeat -n 3 hi`,
//! `!time` or `!info`.

use std::path::PathBuf;

use anyhow::Result;
use chatbridge::core::PLACEHOLDER_CREDENTIAL;
use chatbridge::prelude::*;
use chatbridge::runtime::ConfigLoader;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// User id the console gateway reports for the bot itself.
const CONSOLE_BOT_ID: u64 = 0;

#[derive(Parser, Debug)]
#[command(name = "echo-bot", about = "Console-backed chatbridge demo")]
struct Cli {
    /// Configuration file (defaults to searching for chatbridge.yaml / config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`
    #[arg(short, long)]
    profile: Option<String>,

    /// Author id of console messages
    #[arg(long, default_value_t = 1)]
    user_id: u64,

    /// Author name of console messages
    #[arg(long, default_value = "console")]
    user_name: String,

    /// Channel id of console messages
    #[arg(long, default_value_t = 100)]
    channel_id: u64,

    /// Mark console messages as direct messages
    #[arg(long)]
    dm: bool,
}

// ============================================================================
// Console Gateway
// ============================================================================

/// A gateway that reads messages from stdin and prints replies.
struct ConsoleGateway {
    user_id: u64,
    user_name: String,
    channel_id: u64,
    dm: bool,
    closed: CancellationToken,
}

impl ConsoleGateway {
    fn new(cli: &Cli) -> Self {
        Self {
            user_id: cli.user_id,
            user_name: cli.user_name.clone(),
            channel_id: cli.channel_id,
            dm: cli.dm,
            closed: CancellationToken::new(),
        }
    }

    fn raw_message(&self, line: String) -> RawMessage {
        let message = RawMessage::new(self.user_id, self.channel_id, line)
            .with_author_name(self.user_name.clone());
        if self.dm { message.direct() } else { message }
    }
}

#[async_trait]
impl Outbound for ConsoleGateway {
    async fn send_text(&self, channel_id: u64, text: &str) -> GatewayResult<()> {
        println!("[#{channel_id}] {text}");
        Ok(())
    }

    async fn send_embed(&self, channel_id: u64, embed: &Embed) -> GatewayResult<()> {
        let json = serde_json::to_string_pretty(&embed.to_json())
            .map_err(|e| GatewayError::send(None, e.to_string()))?;
        println!("[#{channel_id}] embed:\n{json}");
        Ok(())
    }

    async fn send_file(
        &self,
        channel_id: u64,
        content: Option<&str>,
        file: &FileAttachment,
    ) -> GatewayResult<()> {
        println!(
            "[#{channel_id}] {} <file {} as {}>",
            content.unwrap_or_default(),
            file.path.display(),
            file.filename
        );
        Ok(())
    }
}

#[async_trait]
impl Gateway for ConsoleGateway {
    async fn connect(&self, _credential: &str, events: Arc<dyn GatewayEvents>) -> GatewayResult<()> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        events.on_ready(CONSOLE_BOT_ID).await;
        info!(channel_id = self.channel_id, "Console session ready, type commands below");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = self.closed.cancelled() => return Ok(()),
                line = lines.next_line() => match line {
                    Ok(Some(line)) => events.on_message(self.raw_message(line)).await,
                    Ok(None) => {
                        info!("stdin closed, press Ctrl+C to exit");
                        self.closed.cancelled().await;
                        return Ok(());
                    }
                    Err(e) => return Err(GatewayError::connection(e.to_string())),
                },
            }
        }
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn hello(msg: Envelope, _args: String) -> HandlerResult {
    msg.reply(&format!("Hello, {}!", msg.author_name)).await?;
    Ok(())
}

async fn echo(msg: Envelope, args: String) -> HandlerResult {
    if args.is_empty() {
        return Err(CommandError::MissingArgument("text").into());
    }
    msg.reply(&args).await?;
    Ok(())
}

async fn now(msg: Envelope, _args: String) -> HandlerResult {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let formatted = now.format(time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))?;
    msg.reply(&format!("It is {formatted}")).await?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "repeat", about = "Repeat a message", no_binary_name = true)]
struct RepeatArgs {
    /// How many times to repeat
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=20))]
    times: u8,

    /// Text to repeat
    #[arg(required = true)]
    text: Vec<String>,
}

async fn repeat(msg: Envelope, args: String) -> HandlerResult {
    let parsed = match RepeatArgs::try_parse_from(args.split_whitespace()) {
        Ok(parsed) => parsed,
        Err(e) => {
            msg.reply(&format!("```\n{e}\n```")).await?;
            return Ok(());
        }
    };
    let line = parsed.text.join(" ");
    let text = vec![line; parsed.times as usize].join("\n");
    msg.reply(&text).await?;
    Ok(())
}

async fn info_card(msg: Envelope, _args: String) -> HandlerResult {
    let embed = Embed::new()
        .title("echo-bot")
        .description("A console-backed chatbridge demo")
        .field("Author", msg.author_name.clone(), true)
        .field("Channel", msg.channel_id.to_string(), true)
        .footer("chatbridge");
    msg.reply_with_embed(&embed).await?;
    Ok(())
}

fn register_commands(router: &mut CommandRouter, prefix: String) {
    router
        .register("hello", hello, "Say hello", "")
        .register("echo", echo, "Echo your text back", "<text>")
        .register("repeat", repeat, "Repeat text several times", "[-n <times>] <text>")
        .register("time", now, "Show the current time", "")
        .register("info", info_card, "Show an info card", "");

    router.set_default(move |msg: Envelope, _args: String| {
        let prefix = prefix.clone();
        async move {
            msg.reply(&format!("Unknown command. Type `{prefix}help` to see what I can do."))
                .await?;
            HandlerResult::Ok(())
        }
    });
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let gateway = Arc::new(ConsoleGateway::new(&cli));

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &cli.profile {
        loader = loader.profile(profile);
    }
    let mut config = loader.load()?;

    // The console gateway ignores the credential.
    if config.credential.is_empty() || config.credential == PLACEHOLDER_CREDENTIAL {
        config.credential = "console".into();
    }

    let mut runtime = BridgeRuntime::from_config(config, gateway)?;
    let prefix = runtime.config().command_prefix.clone();
    register_commands(runtime.router_mut(), prefix);

    let limiter = Arc::new(RateLimiter::default());
    runtime.middleware_mut().register(Arc::new(LoggingMiddleware));
    runtime
        .middleware_mut()
        .register(Arc::new(RateLimitMiddleware::new(limiter)));

    runtime.run().await?;
    Ok(())
}
