//! Thin CLI harness around the agent runtime library.
//!
//! Mirrors the teacher's own `main.rs` role: this binary exists only to
//! exercise the library end-to-end for manual testing. The real
//! interactive shell (key bindings, splash screens, renderers, command
//! parser) lives outside this crate.

use agent_runtime::llm::*;
use agent_runtime::tools::all_tools;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "agent-runtime")]
#[command(author, version, about = "Manual test harness for the agent runtime", long_about = None)]
struct Cli {
    /// Provider to talk to: openai, anthropic, gemini, cohere
    #[arg(short, long, default_value = "openai")]
    provider: String,

    /// Model ID to use
    #[arg(short, long)]
    model: Option<String>,

    /// Environment variable holding the API key
    #[arg(long)]
    api_key_env: Option<String>,

    /// Execute tool calls automatically without asking for confirmation
    #[arg(long, default_value_t = true)]
    autorun: bool,
}

fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "claude-sonnet-4-5-20250929",
        "gemini" => "gemini-3-flash-preview",
        "cohere" => "command-r-plus",
        _ => "gpt-4o",
    }
}

fn default_api_key_env_for(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "ANTHROPIC_API_KEY",
        "gemini" => "GEMINI_API_KEY",
        "cohere" => "COHERE_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}

/// Conservative starting limits per provider family, used only until
/// `ModelRegistry`/`ProviderRegistry` metadata is wired up by a caller.
fn default_rate_limits_for(provider: &str) -> ModelLimits {
    match provider {
        "anthropic" => ModelLimits::new(50, 40_000),
        "gemini" => ModelLimits::new(60, 120_000),
        "cohere" => ModelLimits::new(100, 100_000),
        _ => ModelLimits::new(60, 60_000),
    }
}

fn resume_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".iabuilder")
        .join("resume")
}

/// Ask the user on stdin whether a requested tool call should run.
/// Used as the confirmation gate when `--autorun=false`.
fn confirm_tool_call(name: &str, args: &serde_json::Value) -> bool {
    print!("\nRun tool '{}' with args {}? [y/N] ", name, args);
    io::stdout().flush().ok();

    let mut line = String::new();
    if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Run one interactive REPL turn per line of stdin, driving the shared
/// agent loop (`chat_loop_with_tools`) with the full built-in tool
/// roster, a loop detector guarding against repetitive tool calls, a
/// rate limiter gating provider dispatch, and a real `Conversation` so
/// compression actually fires once the session grows long enough.
async fn run_repl<P: LLMProvider>(
    provider: P,
    rate_limiter: Arc<RateLimiter>,
    autorun: bool,
) -> Result<(), ProviderError> {
    println!(
        "Tools loaded: {}",
        all_tools()
            .iter()
            .map(|t| t.name().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Type a message and press enter. Ctrl-D to quit.\n");

    let stdin = io::stdin();
    let session_id = format!(
        "repl-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    );
    let mut conversation = Conversation::new(session_id);
    let compressor = Compressor::new(resume_dir());

    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        let bytes_read = stdin.read_line(&mut line).unwrap_or(0);
        if bytes_read == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        conversation.append(
            Message {
                role: Role::User,
                content: line.to_string(),
                tool_call_id: None,
                tool_calls: None,
                is_error: false,
            },
            &compressor,
        );

        let turn_start = conversation.messages.len();

        let mut config = ChatLoopConfig::new()
            .with_registry(ToolRegistry::new().register_all_builtin())
            .with_loop_detector(LoopDetector::new())
            .with_rate_limiter(rate_limiter.clone())
            .with_autorun(autorun)
            .on_content(|text| {
                print!("{}", text);
                io::stdout().flush().ok();
            });
        if !autorun {
            config = config.on_confirm(confirm_tool_call);
        }

        let response = chat_loop_with_tools(
            &provider,
            conversation.messages_for_api(false),
            Vec::new(),
            config,
        )
        .await?;
        println!(
            "\n[{} round(s), {} tokens]",
            response.rounds,
            response.usage.total()
        );

        for message in provider.get_history().into_iter().skip(turn_start) {
            conversation.append(message, &compressor);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let provider_name = cli.provider.to_lowercase();
    let model = cli
        .model
        .unwrap_or_else(|| default_model_for(&provider_name).to_string());
    let api_key_env = cli
        .api_key_env
        .unwrap_or_else(|| default_api_key_env_for(&provider_name).to_string());

    let api_key = match std::env::var(&api_key_env) {
        Ok(key) if !key.is_empty() => key,
        _ => {
            eprintln!(
                "Missing API key: set {} before running (provider '{}')",
                api_key_env, provider_name
            );
            std::process::exit(1);
        }
    };

    let rate_limiter = Arc::new(RateLimiter::new(default_rate_limits_for(&provider_name)));
    let autorun = cli.autorun;

    let result = match provider_name.as_str() {
        #[cfg(feature = "openai")]
        "openai" => {
            let provider = match OpenAIProvider::create(model, api_key) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to create provider: {}", e);
                    std::process::exit(1);
                }
            };
            run_repl(provider, rate_limiter, autorun).await
        }
        #[cfg(feature = "anthropic")]
        "anthropic" => {
            let provider = match AnthropicProvider::create(model, api_key) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to create provider: {}", e);
                    std::process::exit(1);
                }
            };
            run_repl(provider, rate_limiter, autorun).await
        }
        #[cfg(feature = "gemini")]
        "gemini" => {
            let provider = match GeminiProvider::create(model, api_key) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to create provider: {}", e);
                    std::process::exit(1);
                }
            };
            run_repl(provider, rate_limiter, autorun).await
        }
        #[cfg(feature = "cohere")]
        "cohere" => {
            let provider = match CohereProvider::create(model, api_key) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to create provider: {}", e);
                    std::process::exit(1);
                }
            };
            run_repl(provider, rate_limiter, autorun).await
        }
        other => {
            eprintln!("Unknown provider: {}", other);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Chat loop error: {}", e);
        std::process::exit(1);
    }
}
