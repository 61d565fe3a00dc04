//! CLI runner - executes the tap

use crate::catalog::{discover, Catalog};
use crate::cli::commands::Cli;
use crate::config::RunContext;
use crate::engine::{EventProcessor, SyncEngine};
use crate::error::{Error, Result, ResultExt};
use crate::output::{JsonLinesSink, MessageSink};
use crate::state::StateManager;
use crate::types::JsonValue;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the tap in the mode the arguments select
    pub async fn run(&self) -> Result<()> {
        let config = read_json(&self.cli.config).context("Failed to load config")?;
        let ctx = Arc::new(RunContext::from_value(&config)?);

        if self.cli.discover {
            return self.discover();
        }

        let catalog = self.load_catalog()?;
        let state = self.load_state()?;
        let engine = SyncEngine::new(ctx, catalog, state, JsonLinesSink::stdout());

        match self.cli.events.as_deref() {
            Some("-") => {
                let stdin = io::stdin();
                process_events(EventProcessor::new(engine)?, stdin.lock()).await?;
            }
            Some(path) => {
                let file = fs::File::open(path)
                    .with_context(|| format!("Failed to open events file {path}"))?;
                process_events(EventProcessor::new(engine)?, BufReader::new(file)).await?;
            }
            None => {
                let mut engine = engine;
                engine.sync().await?;
            }
        }

        Ok(())
    }

    /// Print the discovered catalog
    fn discover(&self) -> Result<()> {
        info!("Starting discover");
        let catalog = discover()?;
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        info!("Finished discover");
        Ok(())
    }

    /// Catalog from `--catalog`, or every stream unselected when absent
    fn load_catalog(&self) -> Result<Catalog> {
        match &self.cli.catalog {
            Some(path) => {
                let value = read_json(path).context("Failed to load catalog")?;
                Catalog::from_value(value)
            }
            None => {
                debug!("No catalog given, using the discovered one");
                discover()
            }
        }
    }

    /// State from `--state-json` or `--state`, persisted to `--state-output` if set
    fn load_state(&self) -> Result<StateManager> {
        let manager = if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)?
        } else if let Some(path) = &self.cli.state {
            StateManager::from_value(read_json(path).context("Failed to load state")?)?
        } else {
            StateManager::in_memory()
        };

        Ok(match &self.cli.state_output {
            Some(path) => manager.with_path(path),
            None => manager,
        })
    }
}

/// Read and parse a JSON file
fn read_json(path: &Path) -> Result<JsonValue> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Feed every non-blank line of `reader` to the processor as one event
pub async fn process_events<S: MessageSink, R: BufRead>(
    mut processor: EventProcessor<S>,
    reader: R,
) -> Result<usize> {
    let mut processed = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let event: JsonValue = serde_json::from_str(&line)
            .map_err(|e| Error::decode(format!("Invalid event on line {}: {e}", index + 1)))?;
        processor.process(&event).await?;
        processed += 1;
    }

    info!("Processed {processed} events");
    Ok(processed)
}
