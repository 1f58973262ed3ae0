use std::sync::Arc;
use std::thread;
use std::time::Duration;

use args::Args;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use trino_client_core::auth::BasicAuth;
use trino_client_core::{Query, RequestLayerBuilder, Scheme};

mod args;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let scheme = match args.endpoint.scheme() {
        "https" => Scheme::Https,
        _ => Scheme::Http,
    };
    let port = args
        .endpoint
        .port_or_known_default()
        .expect("endpoint must carry or imply a port");

    let request_layer = Arc::new(
        RequestLayerBuilder::new(
            args.endpoint.host_str().expect("endpoint must carry a host"),
            port,
            &args.username,
        )
        .scheme(scheme)
        .auth(Box::new(BasicAuth::new(&args.username, &args.password)))
        .max_attempts(args.max_attempts)
        .build()
        .expect("failed to construct request layer"),
    );

    println!(
        "[INFO] Submitting {} queries at {} queries/s",
        args.queries, args.queries_per_second
    );

    let multi_bar = MultiProgress::new();
    let started_bar = multi_bar.add(ProgressBar::new(args.queries));
    let finished_bar = Arc::new(multi_bar.add(ProgressBar::new(args.queries)));

    let wait_time = Duration::from_nanos((1e9 / args.queries_per_second) as u64);
    let mut handles = Vec::new();
    let mut count = 0;

    while count < args.queries {
        thread::sleep(wait_time);
        let request_layer = Arc::clone(&request_layer);
        let finished_bar = Arc::clone(&finished_bar);
        let statement = args.statement.clone();
        handles.push(thread::spawn(move || {
            let mut query = Query::new(request_layer, statement);
            if let Err(err) = query.execute() {
                println!("[WARN] Query failed: {err}");
                finished_bar.inc(1);
                return;
            }
            for row in query.rows() {
                if let Err(err) = row {
                    println!("[WARN] Query failed: {err}");
                    break;
                }
            }
            finished_bar.inc(1);
        }));
        started_bar.inc(1);
        count += 1;
    }

    for handle in handles {
        let _ = handle.join();
    }
}
