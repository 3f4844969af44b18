use anyhow::{bail, Context};
use stormer::cli::output::Output;
use stormer::cli::{Cli, Commands, RunArgs};
use stormer::health::{check_all, checkers_from_config, ServiceStatus};
use stormer::research::ResearchCoordinator;
use stormer::utils::{Secrets, StormerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let config = StormerConfig::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config, cli.verbose);

    let secrets = Secrets::from_env();

    match cli.command {
        Commands::Run(args) => run(config, &secrets, args, &output).await,
        Commands::Check => check(&config, &secrets, &output).await,
        Commands::Config => {
            show_config(&config, &secrets, &output);
            Ok(())
        }
    }
}

fn init_tracing(config: &StormerConfig, verbose: bool) {
    let default_level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(mut config: StormerConfig, secrets: &Secrets, args: RunArgs, output: &Output) -> anyhow::Result<()> {
    if let Some(n) = args.perspectives {
        config.research.perspectives = n;
    }
    if let Some(m) = args.rounds {
        config.research.max_rounds = m;
    }
    if let Some(k) = args.top_k {
        config.research.top_k = k;
    }
    if let Some(secs) = args.timeout {
        config.research.run_timeout_secs = secs;
    }
    config.validate().context("Invalid run options")?;

    output.banner();

    if args.preflight {
        output.header("Preflight");
        let results = check_all(&checkers_from_config(&config, secrets)).await;
        output.health_table(&results);
        if let Some((name, _)) = results
            .iter()
            .find(|(_, r)| r.status == ServiceStatus::AuthenticationFailed)
        {
            bail!("{} rejected its credentials; aborting before the run", name);
        }
    }

    let coordinator = ResearchCoordinator::from_config(&config, secrets)?;

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing with what has been written so far");
            token.cancel();
        }
    });

    output.info(&format!("Researching \"{}\"", args.topic));
    let article = coordinator.run(&args.topic).await?;

    let markdown = article.to_markdown();
    match &args.output {
        Some(path) => {
            std::fs::write(path, &markdown)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            output.success(&format!("Article written to {}", path.display()));
        }
        None => print!("{}", markdown),
    }

    if let Some(path) = &args.json {
        let json = serde_json::to_string_pretty(&article)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        output.success(&format!("JSON written to {}", path.display()));
    }

    output.article_summary(&article);
    Ok(())
}

async fn check(config: &StormerConfig, secrets: &Secrets, output: &Output) -> anyhow::Result<()> {
    output.banner();
    output.header("Service connectivity");

    let results = check_all(&checkers_from_config(config, secrets)).await;
    output.health_table(&results);

    let failing: Vec<&str> = results
        .iter()
        .filter(|(_, r)| !r.status.is_usable())
        .map(|(name, _)| name.as_str())
        .collect();
    if failing.is_empty() {
        output.success("All services reachable");
        Ok(())
    } else {
        output.error(&format!("{} of {} services unusable", failing.len(), results.len()));
        bail!("Unavailable services: {}", failing.join(", "))
    }
}

fn show_config(config: &StormerConfig, secrets: &Secrets, output: &Output) {
    let redact = |key: &Option<String>| match key {
        Some(_) => "set (redacted)".to_string(),
        None => "not set".to_string(),
    };

    output.header("Language model");
    output.kv("model", &config.openrouter.model);
    output.kv("base_url", &config.openrouter.base_url);
    output.kv("timeout", &format!("{}s", config.openrouter.timeout));
    output.kv("OPENROUTER_API_KEY", &redact(&secrets.openrouter_api_key));

    output.header("Search");
    output.kv("provider", &config.search.provider.to_string());
    output.kv("max_results", &config.search.max_results.to_string());
    output.kv("tavily.base_url", &config.tavily.base_url);
    output.kv("TAVILY_API_KEY", &redact(&secrets.tavily_api_key));
    if !config.search.allow_domains.is_empty() {
        output.kv("allow_domains", &config.search.allow_domains.join(", "));
    }
    if !config.search.deny_domains.is_empty() {
        output.kv("deny_domains", &config.search.deny_domains.join(", "));
    }

    output.header("Research");
    output.kv("perspectives", &config.research.perspectives.to_string());
    output.kv("related_topics", &config.research.related_topics.to_string());
    output.kv("max_rounds", &config.research.max_rounds.to_string());
    output.kv("queries_per_question", &config.research.queries_per_question.to_string());
    output.kv("top_k", &config.research.top_k.to_string());
    output.kv("run_timeout_secs", &config.research.run_timeout_secs.to_string());

    output.header("Retry");
    output.kv("max_attempts", &config.retry.max_attempts.to_string());
    output.kv(
        "backoff",
        &format!(
            "{}ms x{} up to {}ms",
            config.retry.initial_backoff_ms, config.retry.multiplier, config.retry.max_backoff_ms
        ),
    );
}
