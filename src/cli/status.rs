use crate::cli::StatusArgs;
use crate::config::{BackendType, Config};
use crate::error::CacheError;
use crate::manager::CacheManager;
use crate::utils::redaction::{redact_connection_string, Redacted};
use anyhow::Result;
use secrecy::ExposeSecret;
use std::time::{Duration, Instant};

/// 连接失败时同样输出状态，而不是直接报错退出
pub async fn execute(config: Config, args: &StatusArgs) -> Result<()> {
    let started = Instant::now();
    let (backend, reachability, manager) = match CacheManager::init(config.clone()).await {
        Ok(manager) => {
            let started = Instant::now();
            let ping = manager.store().ping().await.map(|()| started.elapsed());
            let backend = manager.store().backend_name();
            (backend, describe_reachability(ping.as_ref()), Some(manager))
        }
        Err(e) => (
            backend_label(config.backend),
            describe_reachability(Err(&e)),
            None,
        ),
    };

    println!("=== tunecache status ===\n");
    println!("Backend: {}", backend);
    println!("Status:  {}", reachability);
    println!("Channel: {}", config.invalidation.channel);

    if config.backend == BackendType::Redis {
        println!(
            "Redis:   {:?} {}",
            config.redis.mode,
            redact_connection_string(config.redis.url.expose_secret())
        );
        if let Some(password) = &config.redis.password {
            println!("Password: {}", Redacted::new(password.expose_secret()));
        }
    }

    if args.verbose {
        let ttl = &config.ttl;
        println!("\nTTL (seconds):");
        println!("  default:      {}", ttl.default);
        println!("  song:         {}", ttl.song);
        println!("  album:        {}", ttl.album);
        println!("  artist:       {}", ttl.artist);
        println!("  search:       {}", ttl.search);
        println!("  autocomplete: {}", ttl.autocomplete);
        println!("  topSongs:     {}", ttl.top_songs);
        println!("  home:         {}", ttl.home);
        println!("  favorite:     {}", ttl.favorite);
        println!(
            "\nSerialization: {:?} (gzip: {})",
            config.serialization.format, config.serialization.compress
        );
        println!("Scan batch size: {}", config.redis.scan_batch_size);
        println!("Checked in {} ms", started.elapsed().as_millis());
    }

    if let Some(manager) = manager {
        manager.shutdown().await;
    }
    Ok(())
}

fn backend_label(backend: BackendType) -> &'static str {
    match backend {
        BackendType::Redis => "redis",
        BackendType::Memory => "memory",
    }
}

fn describe_reachability(ping: std::result::Result<&Duration, &CacheError>) -> String {
    match ping {
        Ok(elapsed) => format!("✅ REACHABLE ({} ms)", elapsed.as_millis()),
        Err(e) => format!("❌ UNREACHABLE ({})", e),
    }
}
