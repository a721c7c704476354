//! Command-line front end: `drugguard search` and `drugguard analyze`.

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::analysis::{AnalysisError, AnalysisSession};
use crate::config::{ClientConfig, ConfigError, MAX_MEDICATIONS};
use crate::models::{
    DrugKind, Gender, Medication, ModelError, PatientField, Report, DEFAULT_AGE, DEFAULT_GENDER,
};
use crate::service::{AnalysisService, DrugSearch, HttpAnalysisClient, ServiceError};

#[derive(Parser, Debug)]
#[command(name = "drugguard")]
#[command(about = "Drug interaction safety reports from the command line", version)]
pub struct Cli {
    /// Analysis server base URL (overrides DRUGGUARD_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Look up medications by name
    Search {
        /// At least two characters
        query: String,
    },
    /// Analyze a set of medications for interactions
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Medication names (2 to 5)
    #[arg(required = true, num_args = 2..=MAX_MEDICATIONS)]
    pub names: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_AGE)]
    pub age: u32,
    #[arg(long, default_value_t = DEFAULT_GENDER)]
    pub gender: Gender,
    /// Weight in kg
    #[arg(long)]
    pub weight: Option<f64>,
    /// Height in cm
    #[arg(long)]
    pub height: Option<f64>,
    /// Pre-existing condition; repeat for several
    #[arg(long = "condition")]
    pub conditions: Vec<String>,
}

impl Default for AnalyzeArgs {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            age: DEFAULT_AGE,
            gender: DEFAULT_GENDER,
            weight: None,
            height: None,
            conditions: Vec::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Invalid patient data: {0}")]
    Patient(#[from] ModelError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CommandError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Analysis(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Run one parsed command against the configured server, printing JSON.
pub async fn execute(cli: Cli) -> Result<(), CommandError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url.as_deref() {
        config.api_url = ClientConfig::with_api_url(url)?.api_url;
    }
    let client = Arc::new(HttpAnalysisClient::new(&config)?);
    tracing::info!(api_url = %client.base_url(), "Using analysis server");

    let output = match cli.command {
        Command::Search { query } => {
            serde_json::to_string_pretty(&search(client.as_ref(), &query).await?)?
        }
        Command::Analyze(args) => serde_json::to_string_pretty(&analyze(client, &args).await?)?,
    };
    println!("{output}");
    Ok(())
}

pub async fn search(provider: &dyn DrugSearch, query: &str) -> Result<Vec<Medication>, CommandError> {
    let results = provider.search(query.trim()).await?;
    tracing::info!(count = results.len(), "Search complete");
    Ok(results)
}

/// Build a selection from the given names and patient flags, then run one analysis.
pub async fn analyze<S>(service: Arc<S>, args: &AnalyzeArgs) -> Result<Report, CommandError>
where
    S: AnalysisService + DrugSearch + 'static,
{
    let mut session = AnalysisSession::new(service.clone());

    for name in &args.names {
        let medication = pick_medication(service.as_ref(), name).await;
        if !session.add_medication(medication) {
            tracing::warn!(name = %name, "Medication skipped (duplicate or selection full)");
        }
    }

    // Gender first so a later Pregnancy condition is checked against it
    session.set_patient_field(PatientField::Gender(Some(args.gender)))?;
    session.set_patient_field(PatientField::Age(Some(args.age)))?;
    session.set_patient_field(PatientField::WeightKg(args.weight))?;
    session.set_patient_field(PatientField::HeightCm(args.height))?;
    for condition in &args.conditions {
        session.set_patient_field(PatientField::AddCondition(condition.clone()))?;
    }

    let report = session.run().await?;
    Ok(report.clone())
}

/// Exact (case-insensitive) name match from the search endpoint, otherwise
/// the name as typed; the resolve stage works on names either way.
async fn pick_medication(provider: &dyn DrugSearch, name: &str) -> Medication {
    let name = name.trim();
    let candidates = match provider.search(name).await {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!(error = %e, "Lookup failed, using name as typed");
            Vec::new()
        }
    };
    candidates
        .into_iter()
        .find(|m| m.name.eq_ignore_ascii_case(name))
        .unwrap_or_else(|| Medication::new(name, name, DrugKind::Unknown))
}
