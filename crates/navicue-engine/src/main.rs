//! Headless preview engine for NaviCue modules.
//!
//! This is the main entry point that wires together configuration, the
//! module catalogue and the choreography driver. It mounts one module,
//! plays that module's demo script into the driver against real time, and
//! logs every transition until the module completes or is unmounted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `navicue-config.yaml` (or `NAVICUE_CONFIG`)
//!    and apply environment overrides
//! 2. Initialize structured logging (tracing)
//! 3. Build the catalogue and merge config-declared modules
//! 4. Resolve the module to preview
//! 5. Mount it with the configured timing mode
//! 6. Spawn the driver and feed the demo script
//! 7. Log the result

mod error;
mod script;
mod transition_log;

use std::path::PathBuf;
use std::time::Duration;

use navicue_core::config::{CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH, LoggingConfig};
use navicue_core::{DriverOutcome, LabTimeContext, NavicueConfig, spawn_choreography};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::transition_log::TransitionLogger;

/// Application entry point for the preview engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the preview run fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        module = %config.preview.module,
        mode = config.timing.mode.as_str(),
        unmount_after_ms = config.preview.unmount_after_ms,
        "navicue-engine starting"
    );

    let outcome = run_preview(config).await?;

    // 7. Log the result.
    info!(
        end_reason = ?outcome.end_reason,
        final_stage = outcome.final_stage.as_deref(),
        elapsed_ms = outcome.elapsed_ms,
        transitions = outcome.transitions,
        "Preview finished"
    );
    Ok(())
}

/// Steps 3 to 6: build the catalogue, mount the module and drive it.
async fn run_preview(config: NavicueConfig) -> Result<DriverOutcome<String>, EngineError> {
    // 3. Build the catalogue.
    let mut catalogue = navicue_catalogue::create_catalogue()?;
    let from_config = config.modules.len();
    catalogue.extend(config.modules)?;
    info!(
        modules = catalogue.len(),
        from_config,
        "Catalogue ready"
    );

    // 4. Resolve the module.
    let definition = catalogue.require(&config.preview.module)?;
    info!(
        module = definition.id(),
        title = %definition.meta.title,
        interaction = ?definition.meta.interaction,
        stages = definition.stages.len(),
        script_steps = definition.demo_script.len(),
        "Module resolved"
    );

    // 5. Mount.
    let ctx = LabTimeContext::new(config.timing.mode);
    let machine = definition
        .builder(ctx)?
        .observer(TransitionLogger::new(definition.id()))
        .on_complete(|report| {
            info!(
                instance = %report.instance_id,
                final_stage = %report.final_stage,
                elapsed_ms = report.elapsed_ms,
                retries = report.retries,
                completed_at = %report.completed_at,
                "Completion reported"
            );
        })
        .mount();
    info!(
        instance = %machine.id(),
        liveness_bound_ms = machine.table().liveness_bound_ms(ctx),
        "Module mounted"
    );

    // 6. Drive it.
    let handle = spawn_choreography(machine, config.preview.input_channel_capacity);

    if let Some(after_ms) = config.preview.unmount_after_ms {
        let unmount = handle.unmount_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(after_ms)).await;
            info!(after_ms, "Unmounting preview");
            unmount.unmount();
        });
    }

    let delivered = script::feed_script(&definition.demo_script, &handle).await;
    info!(delivered, "Demo script fed");

    handle.join().await.map_err(|e| EngineError::Driver {
        message: format!("{e}"),
    })
}

/// Load configuration from `NAVICUE_CONFIG` or `navicue-config.yaml`.
///
/// Falls back to defaults if the file does not exist, then applies
/// environment overrides.
fn load_config() -> Result<NavicueConfig, EngineError> {
    let config_path = std::env::var(CONFIG_PATH_VAR)
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let mut config = if config_path.exists() {
        NavicueConfig::from_file(&config_path)?
    } else {
        NavicueConfig::default()
    };
    config.apply_env_overrides()?;
    Ok(config)
}

/// Install the tracing subscriber. `RUST_LOG` wins over `logging.level`.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
