use std::sync::Arc;

use dotenv::dotenv;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use widget_consumer_lib::{
    cli::{parse_args, Cli},
    config::Config,
    consumer::{ConsumerLoop, ConsumerPolicy, RunSummary},
    logging::{format_error_report, init_logging},
    server::setup_server_with_addr,
    session::AwsSession,
    sink::ReservedWords,
    state::AppState,
    Error,
};

/// Cancels the shared token on SIGTERM or SIGINT. Returns once the token is
/// cancelled for any reason.
async fn handle_shutdown_signals(state: Arc<AppState>) {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(err), _) | (_, Err(err)) => {
            warn!(event = "signal_handler_unavailable", error = %err, "running without signal handling");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!(event = "shutdown_signal", signal = "SIGTERM", "SIGTERM received, shutting down.");
        }
        _ = sigint.recv() => {
            info!(event = "shutdown_signal", signal = "SIGINT", "SIGINT received, shutting down.");
        }
        _ = state.shutdown_token.cancelled() => return,
    }

    state.shutdown_token.cancel();
}

async fn run(args: Cli, config: Config) -> Result<RunSummary, Error> {
    let state = Arc::new(AppState::new(CancellationToken::new()));
    let shutdown_handle = tokio::spawn(handle_shutdown_signals(state.clone()));
    let metrics = state.register_consumer_metrics().await;

    let server_handle = match config.metrics_addr {
        Some(addr) => Some(setup_server_with_addr(state.clone(), addr).await?),
        None => None,
    };

    let session = AwsSession::load(&config.aws_region).await;
    let reserved = ReservedWords::with_extra(&config.reserved_columns);
    let sink = session.resolve_sink(&args.widget_bucket, reserved).await?;
    let source = session
        .resolve_source(
            &args.request_bucket,
            args.queue_url.as_deref(),
            config.queue_wait_seconds,
        )
        .await?;

    let mut policy = ConsumerPolicy::from_config(&config);
    if let Some(max_idle_polls) = args.max_idle_polls {
        policy.max_idle_polls = max_idle_polls;
    }

    let consumer = ConsumerLoop::new(source, sink, policy).with_metrics(metrics);
    let summary = consumer.run(state.shutdown_token.clone()).await;

    // Releases the signal task and the metrics server.
    state.shutdown_token.cancel();
    if let Err(err) = shutdown_handle.await {
        warn!(event = "signal_task_failed", error = %err, "signal handler task ended abnormally");
    }
    if let Some(handle) = server_handle {
        if let Err(err) = handle.await {
            warn!(event = "metrics_server_task_failed", error = %err, "metrics server task ended abnormally");
        }
    }

    Ok(summary)
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let args = parse_args();
    let mode = if args.queue_url.is_some() { "queue" } else { "bucket" };
    let logging_context = init_logging("widget_consumer", mode, "info");
    let run_span = tracing::info_span!(
        "consumer_run",
        service = %logging_context.service,
        environment = %logging_context.environment,
        mode = %logging_context.mode,
        run_id = %logging_context.run_id
    );
    let _run_guard = run_span.enter();
    info!(
        event = "consumer_starting",
        request_bucket = %args.request_bucket,
        widget_bucket = %args.widget_bucket,
        queue_url = ?args.queue_url,
        "starting widget consumer"
    );

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            let err = Error::from(err);
            error!(event = "config_invalid", error = %format_error_report(&err), "configuration rejected");
            eprintln!("{}", format_error_report(&err));
            std::process::exit(2);
        }
    };

    match run(args, config).await {
        Ok(summary) => {
            info!(
                event = "consumer_finished",
                stop_reason = ?summary.stop_reason,
                applied = summary.applied,
                rejected = summary.rejected,
                deferred = summary.deferred,
                ack_failures = summary.ack_failures,
                "widget consumer finished"
            );
        }
        Err(err) => {
            error!(event = "consumer_failed", error = %format_error_report(&err), "widget consumer failed");
            eprintln!("{}", format_error_report(&err));
            std::process::exit(1);
        }
    }
}
