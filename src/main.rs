use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use chat_gate::agent::Agent;
use chat_gate::channels::CliChannel;
use chat_gate::config::AppConfig;
use chat_gate::gate::{ConversationGate, RuleSet};
use chat_gate::llm::create_client;
use chat_gate::mail::SmtpMailer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Refuse to start without the required settings
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("  export POE_API_KEY=... MAIL_FROM=... MAIL_PASSWORD=... MAIL_RECIPIENT=...");
            std::process::exit(1);
        }
    };

    let _log_guard = init_tracing(config.log_dir.as_deref())?;

    eprintln!("🤖 Chat Gate v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({})", config.model.model, config.model.url);
    eprintln!(
        "   Mail: {} via {}:{}",
        config.mail.from_address, config.mail.smtp_host, config.mail.smtp_port
    );
    eprintln!("   Recipient: {}", config.template.recipient);
    match &config.template.attachment {
        Some(path) => eprintln!("   Attachment: {}", path.display()),
        None => eprintln!("   Attachment: none (use /confirm <n> <path> to attach)"),
    }
    eprintln!("   Type a message and press Enter. /help for commands, /quit to exit.\n");

    let model = create_client(&config.model).context("creating model client")?;
    let mailer = Arc::new(SmtpMailer::new(config.mail.clone()));
    let rules = RuleSet::default_rules(&config.greeting_reply);

    tracing::info!(
        model = %config.model.model,
        pre_model_rules = rules.pre_model().len(),
        post_model_rules = rules.post_model().len(),
        "Gate configured"
    );

    let gate = ConversationGate::new(rules, model, mailer, config.template.clone());
    let agent = Agent::new(gate, Box::new(CliChannel::new()));

    agent.run().await?;

    Ok(())
}

/// Stderr logging always; a daily-rolling file too when a log directory is set.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "chat-gate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}
