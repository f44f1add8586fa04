//! `relay onboard` — write a default configuration file.

use relay_config::AppConfig;

pub fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();

    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("Re-run with --force to overwrite it.");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, AppConfig::default_json())?;

    println!("Wrote default config to {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Pick a provider and model in the config (default: ollama / llama3.2)");
    println!("  2. Export an API key if the provider needs one, e.g.:");
    println!("       export RELAY_OPENAI_API_KEY=sk-...");
    println!("  3. Run `relay agent` to start chatting");
    Ok(())
}
