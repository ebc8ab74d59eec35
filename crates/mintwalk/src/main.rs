mod cli;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{eyre, WrapErr};

use mintwalk_core::api::{SolscanClient, TransferFilter};
use mintwalk_core::cache::TransferCache;
use mintwalk_core::checkpoint::CheckpointStore;
use mintwalk_core::fetch::{lookup_token_meta, TransferFetcher};
use mintwalk_core::throttle::Throttle;
use mintwalk_core::{AccountNode, CrawlConfig, CrawlSummary, Crawler, FetchError};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let config = CrawlConfig {
        max_steps: args.max_steps,
        inter_call_delay_ms: args.inter_call_delay_ms,
        resume: args.resume,
        concurrency: args.concurrency,
        dedup_addresses: args.dedup_addresses,
        max_pages: args.max_pages,
    };
    config.validate().wrap_err("invalid crawl options")?;

    if args.api_key.is_none() {
        tracing::warn!("no API key set (--api-key / SOLSCAN_API_KEY); the explorer may reject requests");
    }

    let throttle = Arc::new(Throttle::from_millis(config.inter_call_delay_ms));
    let client = SolscanClient::new(&args.api_url, args.api_key.as_deref(), args.page_size)
        .wrap_err("configure explorer client")?;

    // Seed the root: either given directly, or the token's creator with
    // transfers restricted to a window around the mint time.
    let (root, client) = match &args.root {
        Some(root) => (root.clone(), client),
        None => {
            let meta = lookup_token_meta(&client, &throttle, &args.token)
                .await
                .map_err(|err| eyre!(format_fetch_error(&args.api_url, &err)))
                .wrap_err("while looking up token metadata")?;
            tracing::info!(
                token = %args.token,
                name = meta.name.as_deref().unwrap_or("<unnamed>"),
                creator = %meta.creator,
                created_time = meta.created_time,
                "token metadata loaded"
            );
            let filter = TransferFilter {
                token: args.token.clone(),
                mint_time: meta.created_time,
                window: Duration::from_secs(args.window_hours.saturating_mul(3600)),
            };
            (meta.creator, client.with_filter(filter))
        }
    };

    let token_dir = args.data_dir.join(&args.token);
    let store = CheckpointStore::new(token_dir.join("checkpoints"))
        .with_overwrite(args.overwrite_checkpoints);
    let fetcher = TransferFetcher::new(Arc::new(client), throttle)
        .with_cache(TransferCache::new(token_dir.join("transfers")));
    let crawler = Crawler::new(fetcher, store, config).wrap_err("set up crawler")?;

    // First Ctrl-C stops at the next step boundary; a second one exits.
    let stop = crawler.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current step");
            stop.store(true, Ordering::SeqCst);
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("second interrupt; exiting without waiting");
            std::process::exit(130);
        }
    });

    let summary = crawler
        .run(&root)
        .await
        .wrap_err_with(|| format!("crawl from {root} failed"))?;

    if let Some(path) = &args.export_edges {
        export_edges(&summary.root, path)
            .wrap_err_with(|| format!("write edge list to {}", path.display()))?;
        tracing::info!(path = %path.display(), "edge list written");
    }

    print_summary(&summary, &token_dir);
    Ok(())
}

fn export_edges(root: &AccountNode, path: &Path) -> eyre::Result<()> {
    let edges: Vec<serde_json::Value> = root
        .edges()
        .into_iter()
        .map(|(from, to)| serde_json::json!({ "from": from, "to": to }))
        .collect();
    let body = serde_json::to_vec_pretty(&edges)?;
    std::fs::write(path, body)?;
    Ok(())
}

fn print_summary(summary: &CrawlSummary, token_dir: &Path) {
    println!();
    println!("  Crawl finished ({:?}):", summary.reason);
    println!("    Root:        {}", summary.root.address());
    println!(
        "    Steps:       {} -> {}",
        summary.start_step, summary.final_step
    );
    println!("    Nodes:       {}", summary.root.node_count());
    println!("    Frontier:    {}", summary.frontier.len());
    println!("    Checkpoints: {}", token_dir.join("checkpoints").display());
    for stats in &summary.steps {
        println!(
            "    step {:>3}: expanded {}, failed {}, discovered {}, total {}",
            stats.step, stats.expanded, stats.failed, stats.discovered, stats.total_nodes
        );
    }
    if !summary.unexpanded.is_empty() {
        println!(
            "    Never expanded ({}):",
            summary.unexpanded.len()
        );
        for address in &summary.unexpanded {
            println!("      {address}");
        }
    }
    println!();
}

fn format_fetch_error(api_url: &str, err: &FetchError) -> String {
    let mut lines = vec![
        format!("explorer request to `{api_url}` failed"),
        format!("error: {err}"),
    ];

    match err {
        FetchError::Status {
            status: 401 | 403, ..
        } => lines.push("hint: authentication failed; verify --api-key / SOLSCAN_API_KEY".into()),
        FetchError::Status { status: 429, .. } => lines.push(
            "hint: rate limited; raise --inter-call-delay-ms or retry later".into(),
        ),
        FetchError::Status { status: 404, .. } => {
            lines.push("hint: endpoint path is invalid; verify --api-url".into())
        }
        FetchError::Transport(_) => lines.push(
            "hint: request could not be sent; verify network access and the API URL".into(),
        ),
        _ => {}
    }

    lines.join("\n")
}
