//! Dispatches a parsed [`crate::Commands`] to its collaborator: the REST
//! client, the raw gateway WS client, the server bootstrap, the offline
//! shell, or plain config/filesystem reads for verbs that need no running
//! server at all.

use crate::client::RestClient;
use crate::{
    AuthAction, ChannelsAction, Commands, CronAction, GatewayAction, MemoryAction, PairingAction, TailscaleAction, WebhooksAction,
};
use crate::{server, shell, ws};
use anyhow::{Context, Result, bail};
use prime_core::config::AppConfig;
use serde_json::{Value, json};
use std::path::Path;

pub async fn handle_command(command: Commands, workspace: &Path, config_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Onboard { auto, prod, doctor, repair, seed, validate } => {
            onboard(workspace, config_path, auto, prod, doctor, repair, seed, validate).await
        }
        Commands::Start { prod } => {
            let config = AppConfig::load(config_path).context("loading configuration")?;
            server::start(config, workspace, prod).await
        }
        Commands::Stop => server::stop(workspace).await,
        Commands::Status => status(config_path).await,
        Commands::Doctor => doctor(config_path).await,
        Commands::Logs { follow, lines } => logs(workspace, follow, lines).await,
        Commands::Security => security(config_path),
        Commands::Models => models(config_path),
        Commands::Gateway { action } => gateway(action, config_path).await,
        Commands::Telegram => telegram(config_path),
        Commands::Channels { action } => channels(action, config_path).await,
        Commands::Nodes => nodes(config_path).await,
        Commands::Memory { action } => memory(action, config_path).await,
        Commands::Pairing { action } => pairing(action, config_path).await,
        Commands::Cron { action } => cron(action, config_path).await,
        Commands::Webhooks { action } => webhooks(action, config_path).await,
        Commands::Skills => skills(workspace),
        Commands::Tailscale { action } => tailscale(action),
        Commands::Dashboard { open } => dashboard(config_path, open),
        Commands::Shell | Commands::Tui => {
            let config = AppConfig::load(config_path).context("loading configuration")?;
            let gateway_base_url = format!("http://{}:{}", config.rest.host, config.rest.port);
            shell::run(workspace, gateway_base_url).await
        }
        Commands::Auth { action } => auth(action, config_path).await,
    }
}

async fn onboard(
    workspace: &Path,
    config_path: Option<&Path>,
    auto: bool,
    prod: bool,
    doctor_flag: bool,
    repair: bool,
    seed: bool,
    validate: bool,
) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    println!("Prime onboarding\n================");
    println!("workspace: {}", workspace.display());
    println!("gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("rest:      {}:{}", config.rest.host, config.rest.port);

    let problems = config.validate_environment();
    if problems.is_empty() {
        println!("\nenvironment looks complete.");
    } else {
        println!("\nenvironment issues:");
        for p in &problems {
            println!("  - {p}");
        }
        if repair {
            println!("\n`onboard --repair` cannot write secrets for you; set the listed environment variables and re-run.");
        }
    }

    if seed {
        std::fs::create_dir_all(workspace.join(".skills"))?;
        std::fs::create_dir_all(workspace.join(".prime"))?;
        println!("\nseeded .skills/ and .prime/ in the workspace.");
    }

    if validate && !problems.is_empty() {
        bail!("{} environment issue(s) found; see above", problems.len());
    }
    if doctor_flag {
        println!();
        return self::doctor(config_path).await;
    }
    if auto && !prod {
        println!("\nstarting prime in the foreground (pass --prod to onboard in the background).");
        return server::start(config, workspace, false).await;
    }
    if auto && prod {
        return server::start(config, workspace, true).await;
    }
    println!("\nrun `prime start` when you're ready.");
    Ok(())
}

async fn status(config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let client = RestClient::from_config(&config);
    match client.healthz().await {
        Ok(body) => println!("server is up: {body}"),
        Err(e) => {
            println!("server is unreachable: {e}");
            bail!("status check failed");
        }
    }
    Ok(())
}

async fn doctor(config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let problems = config.validate_environment();
    println!("configuration:");
    println!("  gateway {}:{}", config.gateway.host, config.gateway.port);
    println!("  rest    {}:{}", config.rest.host, config.rest.port);
    if problems.is_empty() {
        println!("\nno configuration problems found.");
    } else {
        println!("\nproblems:");
        for p in &problems {
            println!("  - {p}");
        }
    }

    let client = RestClient::from_config(&config);
    match client.healthz().await {
        Ok(_) => println!("\nserver: reachable."),
        Err(e) => println!("\nserver: unreachable ({e}); run `prime start` first."),
    }

    if !problems.is_empty() {
        bail!("{} configuration issue(s) found", problems.len());
    }
    Ok(())
}

async fn logs(workspace: &Path, follow: bool, lines: Option<usize>) -> Result<()> {
    let log_path = workspace.join(".prime/prime.log");
    if !log_path.exists() {
        bail!("no log file at {} — is prime running in the background?", log_path.display());
    }
    print_tail(&log_path, lines.unwrap_or(100))?;
    if follow {
        let mut pos = std::fs::metadata(&log_path)?.len();
        loop {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            let len = std::fs::metadata(&log_path)?.len();
            if len > pos {
                use std::io::{Read, Seek, SeekFrom};
                let mut file = std::fs::File::open(&log_path)?;
                file.seek(SeekFrom::Start(pos))?;
                let mut buf = String::new();
                file.read_to_string(&mut buf)?;
                print!("{buf}");
                pos = len;
            }
        }
    }
    Ok(())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    for line in &all[start..] {
        println!("{line}");
    }
    Ok(())
}

fn security(config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    println!("secrets configured (values withheld):");
    println!("  SECRET_KEY:    {}", present(config.secrets.secret_key.is_some()));
    println!("  JWT_SECRET:    {}", present(config.secrets.jwt_secret.is_some()));
    println!("  DATABASE_URL:  {}", present(config.secrets.database_url.is_some()));
    println!("  APP_PUBLIC_URL:{}", present(config.secrets.app_public_url.is_some()));
    Ok(())
}

fn present(is_set: bool) -> &'static str {
    if is_set { "set" } else { "not set" }
}

fn models(config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let keys = &config.provider_keys;
    let rows = [
        ("openai", keys.openai.is_some()),
        ("anthropic", keys.anthropic.is_some()),
        ("deepseek", keys.deepseek.is_some()),
        ("kimi", keys.kimi.is_some()),
        ("gemini", keys.gemini.is_some()),
        ("mistral", keys.mistral.is_some()),
        ("zai", keys.zai.is_some()),
        ("qwen", keys.qwen.is_some()),
    ];
    println!("configured provider keys:");
    for (name, set) in rows {
        println!("  {name:<10} {}", present(set));
    }
    Ok(())
}

async fn gateway(action: GatewayAction, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let ws_url = RestClient::gateway_ws_url(&config);
    match action {
        GatewayAction::Url => {
            println!("{ws_url}");
            Ok(())
        }
        GatewayAction::Health => {
            let client = RestClient::from_config(&config);
            let body = client.healthz().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        GatewayAction::Status => {
            let result = ws::call(&ws_url, "health.get", json!({})).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        GatewayAction::Call { method, params } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw).context("--params must be valid JSON")?,
                None => json!({}),
            };
            let result = ws::call(&ws_url, &method, params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

fn telegram(config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    println!("telegram bot tokens configured: {}", config.telegram.bot_tokens.len());
    println!("allowed chat ids: {:?}", config.telegram.allowed_ids);
    Ok(())
}

async fn channels(action: ChannelsAction, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    match action {
        ChannelsAction::List => {
            println!("telegram: {} bot token(s)", config.telegram.bot_tokens.len());
            println!("slack:    {}", present(config.slack.bot_token.is_some()));
            println!("whatsapp: {}", present(config.whatsapp.token.is_some()));
            println!("web:      always available (no external credentials)");
            Ok(())
        }
        ChannelsAction::Doctor => {
            let mut ok = true;
            if config.telegram.bot_tokens.is_empty() {
                println!("telegram: no bot tokens configured");
                ok = false;
            }
            if config.slack.bot_token.is_none() {
                println!("slack: no bot token configured");
                ok = false;
            }
            if config.whatsapp.token.is_none() {
                println!("whatsapp: no token configured");
                ok = false;
            }
            if ok {
                println!("all channel adapters have credentials configured.");
            }
            Ok(())
        }
        ChannelsAction::Connect { channel } => {
            println!("`prime channels connect {channel}` requires completing that channel's OAuth/bot-token flow outside this CLI; see its provider docs, then set the matching PRIME_ environment variables.");
            Ok(())
        }
        ChannelsAction::Verify { channel } => {
            let configured = match channel.as_str() {
                "telegram" => !config.telegram.bot_tokens.is_empty(),
                "slack" => config.slack.bot_token.is_some(),
                "whatsapp" => config.whatsapp.token.is_some(),
                "web" => true,
                other => bail!("unknown channel '{other}'"),
            };
            println!("{channel}: {}", if configured { "configured" } else { "not configured" });
            Ok(())
        }
    }
}

async fn nodes(config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let client = RestClient::from_config(&config);
    let body = client.get("/node-executions/approvals/pending").await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn memory(action: MemoryAction, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let client = RestClient::from_config(&config);
    match action {
        MemoryAction::List { knowledge_base_id } => {
            let body = client
                .post(&format!("/knowledge-bases/{knowledge_base_id}/search"), json!({"query": "", "limit": 20}))
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        MemoryAction::Search { knowledge_base_id, query } => {
            let body = client.post(&format!("/knowledge-bases/{knowledge_base_id}/search"), json!({"query": query})).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
    }
}

async fn pairing(action: PairingAction, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let client = RestClient::from_config(&config);
    match action {
        PairingAction::List => {
            let body = client.get("/pairings/pending").await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        PairingAction::Approve { id } => {
            let body = client.post(&format!("/pairings/{id}/approve"), json!({})).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        PairingAction::Reject { id } => {
            let body = client.post(&format!("/pairings/{id}/reject"), json!({})).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
}

async fn cron(action: CronAction, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let client = RestClient::from_config(&config);
    match action {
        CronAction::List => {
            let body = client.get("/triggers/cron").await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
}

async fn webhooks(action: WebhooksAction, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let client = RestClient::from_config(&config);
    match action {
        WebhooksAction::List => {
            let body = client.get("/triggers/webhooks").await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
}

fn skills(workspace: &Path) -> Result<()> {
    let dir = workspace.join(".skills");
    let Ok(entries) = std::fs::read_dir(&dir) else {
        println!("no skills installed (no {} directory).", dir.display());
        return Ok(());
    };
    let mut found = false;
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        found = true;
        let name = entry.file_name().to_string_lossy().into_owned();
        let summary = std::fs::read_to_string(entry.path().join("SKILL.md"))
            .ok()
            .and_then(|s| s.lines().next().map(str::to_string))
            .unwrap_or_default();
        println!("{name:<20} {summary}");
    }
    if !found {
        println!("no skills installed.");
    }
    Ok(())
}

fn tailscale(action: TailscaleAction) -> Result<()> {
    let sub = match action {
        TailscaleAction::Status => vec!["status"],
        TailscaleAction::Connect => vec!["up"],
        TailscaleAction::Funnel => vec!["funnel", "status"],
    };
    let output = std::process::Command::new("tailscale")
        .args(&sub)
        .output()
        .context("running the system `tailscale` CLI (is it installed?)")?;
    std::io::Write::write_all(&mut std::io::stdout(), &output.stdout)?;
    std::io::Write::write_all(&mut std::io::stderr(), &output.stderr)?;
    if !output.status.success() {
        bail!("tailscale {} exited with {}", sub.join(" "), output.status);
    }
    Ok(())
}

fn dashboard(config_path: Option<&Path>, open: bool) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let url = config
        .secrets
        .app_public_url
        .clone()
        .unwrap_or_else(|| format!("http://{}:{}", config.rest.host, config.rest.port));
    println!("{url}");
    if open {
        let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
        let _ = std::process::Command::new(opener).arg(&url).status();
    }
    Ok(())
}

async fn auth(action: AuthAction, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path).context("loading configuration")?;
    let client = RestClient::from_config(&config);
    match action {
        AuthAction::Login => {
            let start = client.post("/auth/device/start", json!({})).await?;
            let user_code = start["user_code"].as_str().unwrap_or_default();
            let device_code = start["device_code"].as_str().unwrap_or_default();
            let interval = start["interval"].as_u64().unwrap_or(5);
            println!("Visit the dashboard and enter code: {user_code}");
            println!("Waiting for approval...");

            loop {
                tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
                let result = client.post("/auth/device/token", json!({"device_code": device_code})).await;
                match result {
                    Ok(body) => {
                        println!("login successful.");
                        let token_path = dirs_token_path();
                        if let Some(parent) = token_path.parent() {
                            std::fs::create_dir_all(parent).ok();
                        }
                        std::fs::write(&token_path, body.to_string()).ok();
                        break;
                    }
                    Err(e) if e.to_string().contains("authorization_pending") => continue,
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        }
        AuthAction::Status => {
            let token_path = dirs_token_path();
            if token_path.exists() {
                println!("logged in (token cached at {}).", token_path.display());
            } else {
                println!("not logged in; run `prime auth login`.");
            }
            Ok(())
        }
        AuthAction::Whoami => {
            let token_path = dirs_token_path();
            if !token_path.exists() {
                bail!("not logged in; run `prime auth login`.");
            }
            println!("authenticated via cached device token at {}.", token_path.display());
            Ok(())
        }
    }
}

fn dirs_token_path() -> std::path::PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("dev", "prime", "prime") {
        return dirs.config_dir().join("token.json");
    }
    std::env::temp_dir().join("prime-cli").join("token.json")
}
