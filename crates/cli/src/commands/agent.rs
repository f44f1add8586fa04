//! `relay agent` — interactive or single-message chat mode.
//!
//! Both modes run through the session manager so CLI sessions take the
//! same path as any channel adapter. User-visible text streams straight to
//! stdout; status lines go through a bounded sink that drops rather than
//! stalls.

use std::sync::Arc;

use relay_agent::{BoundedSink, Runtime, SessionManager, TextCallback};
use relay_config::AppConfig;
use relay_core::registry::MiddlewareRegistry;

const CLI_SESSION: &str = "cli";

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let mut registry = MiddlewareRegistry::new();
    relay_middlewares::register_defaults(&mut registry);

    let runtime = Runtime::new(config, registry)
        .await
        .map_err(|e| format!("Failed to initialize runtime: {e}"))?;

    // Stream chunks print inline; status lines drain through a bounded sink
    // so a slow terminal can never stall a turn.
    let stream_cb: TextCallback = Arc::new(|chunk: &str| {
        use std::io::Write;
        print!("{chunk}");
        let _ = std::io::stdout().flush();
    });

    let (status_sink, mut status_rx) = BoundedSink::channel(64);
    let status_task = tokio::spawn(async move {
        while let Some(line) = status_rx.recv().await {
            eprintln!("  {line}");
        }
    });

    let sessions: Arc<SessionManager> =
        runtime.session_manager(stream_cb, status_sink.callback());
    let sweeper = sessions.start_sweeper();

    let result = match message {
        Some(message) => single_shot(&sessions, &message).await,
        None => interactive(&runtime, &sessions).await,
    };

    sweeper.abort();
    sessions.shutdown().await;
    runtime.shutdown();
    status_task.abort();
    result
}

async fn single_shot(
    sessions: &Arc<SessionManager>,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    sessions.send(CLI_SESSION, message).await?;
    println!();
    Ok(())
}

async fn interactive(
    runtime: &Arc<Runtime>,
    sessions: &Arc<SessionManager>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = runtime.config();
    println!("Relay chat");
    println!(
        "model={}, provider={}, url={}",
        config.model,
        config.provider,
        config.base_url.as_deref().unwrap_or("default")
    );
    println!("Type /exit to quit, /clear to reset context.");

    let stdin = std::io::stdin();
    loop {
        use std::io::Write;
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!();
            return Ok(());
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/exit" | "exit" | "quit" => return Ok(()),
            "/clear" => {
                sessions.clear(CLI_SESSION).await?;
                println!("context cleared");
                continue;
            }
            _ => {}
        }

        // Output streams as it arrives; only errors need printing here
        if let Err(e) = sessions.send(CLI_SESSION, input).await {
            eprintln!("error: {e}");
        }
    }
}
