//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了只读的诊断命令：查看键、列出键、监听失效消息。

use crate::keys::CacheKey;
use crate::manager::CacheManager;
use crate::sync::InvalidationEvent;
use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;

#[derive(Parser, Debug)]
pub struct InspectArgs {
    #[arg(short, long, help = "Exact cache key, e.g. 'song:meta:S1'")]
    pub key: String,
}

#[derive(Parser, Debug)]
pub struct KeysArgs {
    #[arg(short, long, help = "Glob pattern, e.g. 'artists:list:*'")]
    pub pattern: String,

    #[arg(short, long, default_value_t = 100, help = "Maximum number of keys to print")]
    pub limit: usize,
}

pub async fn execute_inspect(manager: &CacheManager, args: &InspectArgs) -> Result<()> {
    let key = CacheKey::from_raw(args.key.as_str());
    let store = manager.store();

    let ttl = store.ttl(key.as_str()).await?;
    match manager.cache().get::<serde_json::Value>(&key).await {
        Some(value) => {
            println!("Key: {}", key);
            match ttl {
                Some(ttl) => println!("TTL: {}s", ttl),
                None => println!("TTL: none"),
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        None => match store.get(key.as_str()).await? {
            Some(bytes) => println!("Key: {} ({} bytes, not valid JSON)", key, bytes.len()),
            None => println!("Key '{}' not found", key),
        },
    }
    Ok(())
}

pub async fn execute_keys(manager: &CacheManager, args: &KeysArgs) -> Result<()> {
    let store = manager.store();
    let mut batches = store.scan_keys(&args.pattern);
    let mut printed = 0usize;

    'scan: while let Some(batch) = batches.next().await {
        let batch = batch.with_context(|| format!("Failed to scan '{}'", args.pattern))?;
        for key in batch {
            if printed >= args.limit {
                break 'scan;
            }
            println!("{}", key);
            printed += 1;
        }
    }

    if printed >= args.limit {
        println!("(stopped after {} keys)", args.limit);
    } else {
        println!("({} keys)", printed);
    }
    Ok(())
}

pub async fn execute_listen(manager: &CacheManager) -> Result<()> {
    let bus = manager.bus();
    let mut payloads = bus.subscribe().await?;
    println!("Listening on '{}', press Ctrl-C to stop", bus.channel());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = payloads.next() => match next {
                Some(payload) => match InvalidationEvent::decode(&payload) {
                    Ok(event) => println!("{}", serde_json::to_string(&event)?),
                    Err(e) => println!("(malformed) {}: {}", String::from_utf8_lossy(&payload), e),
                },
                None => break,
            },
        }
    }
    Ok(())
}
