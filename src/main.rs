//! Owl - 个性化学习编排器
//!
//! 入口：初始化日志、加载配置、装配存储 / LLM / 内容网关与引擎，
//! 然后跑一个行式 REPL。会话 ID 作为第一个命令行参数传入即可恢复旧会话。

use anyhow::Context;
use owl::config::{load_config, AppConfig};
use owl::content::create_content_gateway;
use owl::engine::Engine;
use owl::llm::create_llm_from_config;
use owl::store::create_session_store;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = match load_config(None) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Config load failed ({}), using defaults", e);
            AppConfig::default()
        }
    };

    let store = create_session_store(&cfg);
    let llm = create_llm_from_config(&cfg);
    let gateway = create_content_gateway(&cfg);
    let engine = Engine::new(&cfg, store, llm, gateway);

    // 第一个参数是会话 ID；缺省新建
    let session_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("session_{}", uuid::Uuid::new_v4()));

    match engine.session_summary(&session_id).await {
        Ok(Some(summary)) => {
            println!(
                "Resuming session {} (version {}, status {:?})",
                session_id, summary.version, summary.status
            );
            if let Some(topic) = &summary.topic {
                println!(
                    "Topic: {} — {}/{} days done",
                    topic, summary.days_done, summary.plan_days
                );
            }
        }
        Ok(None) => println!("New session {}", session_id),
        Err(e) => tracing::warn!("Could not inspect session: {}", e),
    }
    println!("Type a message ('exit' to quit).\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        match engine.submit_turn(&session_id, line).await {
            Ok(result) => println!("{}\n", result.output),
            Err(e) if e.is_retryable() => {
                println!("({}) Nothing was changed — please try again.\n", e)
            }
            Err(e) => println!("Something went wrong: {}. The session was left untouched.\n", e),
        }
    }

    println!("Bye — session {} is saved.", session_id);
    Ok(())
}
