//! `relay doctor` — diagnose configuration and provider health.

use relay_config::AppConfig;
use relay_core::registry::MiddlewareRegistry;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Relay doctor");
    println!();

    // Config
    let config_path = AppConfig::config_path();
    let config = match AppConfig::load() {
        Ok(config) => {
            if config_path.exists() {
                println!("  [ok] config: {}", config_path.display());
            } else {
                println!("  [ok] config: defaults (no file at {})", config_path.display());
            }
            config
        }
        Err(e) => {
            println!("  [fail] config: {e}");
            return Ok(());
        }
    };
    println!("       provider={}, model={}", config.provider, config.model);

    // Middlewares
    let mut registry = MiddlewareRegistry::new();
    relay_middlewares::register_defaults(&mut registry);
    config.apply_middleware_settings();
    match registry.build_chain(None) {
        Some(chain) => {
            println!("  [ok] middlewares: {} active", chain.len());
            for (id, priority) in chain.list() {
                println!("       {priority:>4}  {id}");
            }
        }
        None => println!("  [warn] middlewares: none registered"),
    }

    // Scripts
    let scripts_dir = config.resolved_scripts_dir();
    if scripts_dir.is_dir() {
        println!("  [ok] scripts dir: {}", scripts_dir.display());
    } else {
        println!("  [warn] scripts dir missing: {}", scripts_dir.display());
    }

    // Provider reachability
    match relay_providers_health(&config).await {
        Ok(true) => println!("  [ok] provider reachable"),
        Ok(false) => println!("  [warn] provider responded unhealthy"),
        Err(e) => println!("  [fail] provider: {e}"),
    }

    Ok(())
}

async fn relay_providers_health(config: &AppConfig) -> Result<bool, relay_core::ProviderError> {
    let provider = relay_providers::build_provider(
        &config.provider,
        &config.model,
        config.base_url.as_deref(),
        config.api_key.as_deref(),
    )?;
    provider.health_check().await
}
