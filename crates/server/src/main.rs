//! Quizflow server entry point.

use std::sync::Arc;

use axum::{Router, middleware};
use quizflow_api::{AppState, middleware::admin_identity, router as api_router};
use quizflow_common::Config;
use quizflow_core::{
    CancelHandle, DispatchService, InvitationService, OpenAiQuestionGenerator, SnapshotScorer,
    WorkflowDependencies, WorkflowOrchestrator, WorkflowSettings, cancel_pair,
};
use quizflow_db::repositories::{
    InvitationRepository, QuestionRepository, QuizRepository, ResultRepository,
    WorkflowRepository,
};
use quizflow_queue::{DispatchPipeline, ProviderRegistry};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Largest accepted request body (answer submissions are small).
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Waits for a shutdown signal (SIGINT or SIGTERM), then cancels
/// in-flight workflow runs.
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal(cancel: CancelHandle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }

    // Queued sends are abandoned; their stages stay pending for the next run.
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quizflow=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting quizflow server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = Arc::new(quizflow_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    quizflow_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let invitation_repo = Arc::new(InvitationRepository::new(Arc::clone(&db)));
    let question_repo = Arc::new(QuestionRepository::new(Arc::clone(&db)));
    let quiz_repo = Arc::new(QuizRepository::new(Arc::clone(&db)));
    let result_repo = Arc::new(ResultRepository::new(Arc::clone(&db)));
    let workflow_repo = Arc::new(WorkflowRepository::new(Arc::clone(&db)));

    // Email dispatch: provider precedence is resolved once, here
    let registry = ProviderRegistry::from_config(&config.mail, &config.dispatch)?;
    let dispatch: DispatchService =
        Arc::new(DispatchPipeline::from_config(registry, &config.dispatch));

    // Initialize services
    let invitation_service = InvitationService::new(
        invitation_repo,
        result_repo.clone(),
        quiz_repo.clone(),
        dispatch.clone(),
        config.frontend.clone(),
        config.mail.from_name.clone(),
    );

    let generator = Arc::new(OpenAiQuestionGenerator::from_config(&config.generation)?);
    let workflow_orchestrator = WorkflowOrchestrator::new(
        WorkflowDependencies {
            workflows: workflow_repo,
            questions: question_repo,
            directory: quiz_repo,
            results: result_repo,
            invitations: invitation_service.clone(),
            dispatch,
            generator,
            scorer: Arc::new(SnapshotScorer),
        },
        WorkflowSettings::from_config(&config.workflow, config.mail.from_name.clone()),
    );

    let (cancel_handle, shutdown) = cancel_pair();
    let state = AppState {
        invitation_service,
        workflow_orchestrator,
        shutdown,
    };

    // Build router
    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn(admin_identity))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_handle))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
