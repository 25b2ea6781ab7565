use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bpc_app::{
    AcquisitionOrchestrator, AppContext, Application, DisplayAdapter, FileSource, LaunchOutcome,
    OrchestratorConfig, UiControls,
};
use bpc_core::{
    AppSettings, CalculatorView, CannedSample, FilterButtonSetting, FormField, Patient,
    ReferenceTable, StringTable, View,
};
use bpc_fhir::FhirNormalizer;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bpc-cli",
    about = "Load a patient from FHIR JSON files and compute pediatric blood pressure percentiles."
)]
struct Args {
    /// FHIR Patient resource.
    #[arg(long)]
    demographics: PathBuf,
    /// FHIR Bundle (or array) of vital-sign Observations.
    #[arg(long)]
    vitals: PathBuf,
    /// Reference table JSON (`{ "rows": [...] }`).
    #[arg(long)]
    table: PathBuf,
    /// Launch context JSON carrying `need_patient_banner`.
    #[arg(long)]
    launch_context: Option<PathBuf>,
    /// Application settings JSON; absent keys use defaults.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Flat JSON object of UI string overrides.
    #[arg(long)]
    strings: Option<PathBuf>,
    /// Seconds to wait before falling back to the sample patient.
    #[arg(long, default_value_t = 10)]
    fallback_delay: u64,
    /// Form edits applied after start, e.g. `--set height=130 --set sex=female`.
    #[arg(long = "set", value_parser = parse_edit)]
    edits: Vec<(FormField, String)>,
    /// Print calculator output as JSON.
    #[arg(long)]
    json: bool,
}

fn parse_edit(raw: &str) -> Result<(FormField, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got {raw:?}"))?;
    let field = match name.trim() {
        "height" => FormField::Height,
        "systolic" => FormField::Systolic,
        "diastolic" => FormField::Diastolic,
        "age_years" | "years" => FormField::AgeYears,
        "age_months" | "months" => FormField::AgeMonths,
        "sex" => FormField::Sex,
        other => return Err(format!("unknown form field {other:?}")),
    };
    Ok((field, value.to_string()))
}

struct ConsoleDisplay {
    json: bool,
}

impl DisplayAdapter for ConsoleDisplay {
    fn show_error(&mut self, message: &str) {
        eprintln!("{message}");
    }

    fn show_calculator(&mut self, view: &CalculatorView) {
        if self.json {
            match serde_json::to_string_pretty(view) {
                Ok(text) => println!("{text}"),
                Err(err) => tracing::warn!(error = %err, "could not serialize calculator view"),
            }
            return;
        }

        match view {
            CalculatorView::Prompt { message } => println!("{message}"),
            CalculatorView::Result(payload) => {
                println!("{}", payload.summary_line);
                if !payload.note.is_empty() {
                    println!("{}", payload.note);
                }
                println!(
                    "Percentiles: systolic {}, diastolic {}",
                    or_dash(&payload.systolic_pct_label),
                    or_dash(&payload.diastolic_pct_label)
                );
                if !payload.threshold_block.is_empty() {
                    println!("{}", payload.threshold_block);
                }
            }
        }
        println!();
    }

    fn show_patient_banner(&mut self, patient: &Patient, is_sample: bool) {
        println!(
            "Patient: {} ({}, born {}){}",
            patient.name.as_deref().unwrap_or("unnamed"),
            patient.sex.code(),
            patient.birthdate,
            if is_sample { " [sample]" } else { "" }
        );
    }

    fn apply_filter_button(&mut self, setting: &FilterButtonSetting) {
        tracing::debug!(handle = %setting.handle, on = setting.on_by_default, "filter button");
    }
}

fn or_dash(label: &str) -> &str {
    if label.is_empty() {
        "-"
    } else {
        label
    }
}

struct ConsoleControls;

impl UiControls for ConsoleControls {
    fn enable(&mut self) {
        tracing::debug!("controls enabled");
    }

    fn disable(&mut self) {
        tracing::debug!("controls disabled");
    }

    fn select_view(&mut self, view: View) {
        tracing::debug!(?view, "view selected");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read settings {:?}", path))?;
            AppSettings::from_json_str(&text)?
        }
        None => AppSettings::default(),
    };
    let strings = match &args.strings {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read strings {:?}", path))?;
            StringTable::from_json_str(&text)?
        }
        None => StringTable::default(),
    };
    let table_text = std::fs::read_to_string(&args.table)
        .with_context(|| format!("Could not read reference table {:?}", args.table))?;
    let table = ReferenceTable::from_json_str(&table_text)?;

    let context = Arc::new(AppContext::new(settings));
    let mut app = Application::new(
        Arc::clone(&context),
        Arc::new(table),
        Arc::new(strings),
        Box::new(ConsoleDisplay { json: args.json }),
        Box::new(ConsoleControls),
        chrono::Local::now().date_naive(),
    );

    let mut source = FileSource::new(&args.demographics, &args.vitals);
    if let Some(path) = &args.launch_context {
        source = source.with_launch_context(path);
    }
    let source = Arc::new(source);

    let orchestrator = AcquisitionOrchestrator::new(
        source.clone(),
        source,
        Arc::new(FhirNormalizer),
        Arc::new(CannedSample),
        Arc::clone(&context),
    )
    .with_config(OrchestratorConfig {
        fallback_delay_secs: args.fallback_delay,
        ..OrchestratorConfig::default()
    });

    match orchestrator.run(&mut app).await? {
        LaunchOutcome::Live => tracing::info!("started with live data"),
        LaunchOutcome::Sample { cause } => tracing::warn!(%cause, "started with sample data"),
    }

    for (field, value) in &args.edits {
        app.on_field_changed(*field, value);
    }

    Ok(())
}
