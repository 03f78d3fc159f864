//! Votepool Backend Service
//!
//! Main entry point for the votepool betting ledger.
//! This service runs:
//! - the vote scheduler, closing overdue votes and paying out resolved ones
//! - periodic counter reconciliation

use std::sync::Arc;
use tracing::{error, info, warn};
use votepool_backend::config::{AppConfig, LedgerBackend};
use votepool_backend::database::{create_pool, run_migrations};
use votepool_backend::ledger::{LedgerStore, MemoryLedger};
use votepool_backend::repositories::PgLedger;
use votepool_backend::services::AuditTrailService;
use votepool_backend::{AppError, AppResult, AppState};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    // Initialize tracing/logging with config
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("votepool_backend={},sqlx=warn", config.log_level).into()
    });
    if config.json_logs() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Votepool Backend Service Starting              ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("Ledger backend: {}", config.ledger.backend.as_str());
    info!("Default fee rate: {}", config.ledger.default_fee_rate);
    info!("Participation policy: {:?}", config.ledger.participation_policy);

    match config.ledger.backend {
        LedgerBackend::Postgres => {
            // =================================================================
            // DATABASE SETUP
            // =================================================================
            info!("Connecting to database...");

            let pool = create_pool(&config.database).await.map_err(|e| {
                error!("Failed to create database pool: {}", e);
                AppError::Database(e)
            })?;

            info!("Database connection pool created successfully");
            info!("Max connections: {}", config.database.max_connections);

            info!("Running database migrations...");
            run_migrations(&pool, None).await.map_err(|e| {
                error!("Database migration failed: {}", e);
                AppError::Database(e)
            })?;
            info!("Database migrations completed successfully");

            run(Arc::new(PgLedger::new(pool)), &config).await
        }
        LedgerBackend::Memory => {
            warn!("Using the in-memory ledger, nothing will survive a restart");
            run(Arc::new(MemoryLedger::new()), &config).await
        }
    }
}

async fn run<S: LedgerStore>(store: Arc<S>, config: &AppConfig) -> AppResult<()> {
    // =========================================================================
    // CORE SERVICES INITIALIZATION
    // =========================================================================
    info!("Initializing core services...");

    let audit = match AuditTrailService::new(config.ledger.audit_log_dir.clone()) {
        Ok(audit) => {
            info!("✓ Audit trail service initialized");
            Some(Arc::new(audit))
        }
        Err(e) => {
            warn!("Audit trail disabled: {}", e);
            None
        }
    };

    let app_state = AppState::new(store, &config.ledger, audit);
    info!("✓ Application state initialized with services");

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    info!("Starting background tasks...");

    let scheduler = app_state.scheduler(&config.ledger);
    let scheduler_handle = tokio::spawn(async move {
        scheduler.start().await;
    });
    info!(
        "✓ Vote scheduler started ({}s interval)",
        config.ledger.scheduler_interval_secs
    );

    let reconciler = app_state.reconciler(&config.ledger);
    let reconciler_handle = tokio::spawn(async move {
        reconciler.start().await;
    });
    info!(
        "✓ Reconciliation started ({}s interval)",
        config.ledger.reconcile_interval_secs
    );

    // =========================================================================
    // READY
    // =========================================================================
    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Votepool Backend Service Ready!                ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = scheduler_handle => {
            error!("Vote scheduler exited unexpectedly");
        }
        _ = reconciler_handle => {
            error!("Reconciliation task exited unexpectedly");
        }
    }

    info!("Votepool backend service shutdown complete");
    Ok(())
}
