use std::{process, sync::Arc};

use diretta::{
    application::{content::ChannelSource, error::AppError, feed::FeedService},
    config,
    infra::{
        cms::CmsClient,
        error::InfraError,
        http::{self, HttpState},
        realtime::SseChannelSource,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cms = Arc::new(CmsClient::new(&settings.cms)?);
    let channel: Arc<dyn ChannelSource> = Arc::new(SseChannelSource::new(&settings.cms)?);
    let feed = Arc::new(FeedService::new(cms, &settings.feed));

    let state = HttpState {
        feed,
        channel,
        last_feed: Arc::default(),
        timestamp_refresh: settings.feed.timestamp_refresh,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "diretta::server",
        addr = %settings.server.public_addr,
        "serving live blog"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
