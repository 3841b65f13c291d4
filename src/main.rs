// Content Forensics CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::info;

use content_forensics_lib::init_logging;
use content_forensics_lib::models::{TransformMode, TransformRequest};
use content_forensics_lib::services::{
    analyze, compare_verdicts, mask_key, render_comparison, render_verdict, AppConfig, ConfigStore,
    LlmOverrides, LlmSettings, ModelBundle, ModelRegistry, Session, TransformService,
};

#[derive(Parser, Debug)]
#[command(name = "content-forensics", version, about = "Classify text and rewrite it through an LLM")]
struct Cli {
    /// Directory holding the trained model artifacts
    #[arg(long, global = true, env = "FORENSICS_ARTIFACT_DIR")]
    artifacts: Option<PathBuf>,

    /// Directory holding config.json
    #[arg(long, global = true, env = "FORENSICS_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// API key for the generative service (overrides config and environment)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Model used for explanations and rewrites
    #[arg(long, global = true)]
    model: Option<String>,

    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify text on every axis
    Analyze {
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Explain, humanize or adversarially rewrite text
    Rewrite {
        mode: TransformMode,
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Inspect or edit the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    Path,
    SetKey { key: String },
    DeleteKey,
    SetArtifactDir { dir: PathBuf },
    SetModel { model: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = match &cli.config_dir {
        Some(dir) => ConfigStore::new(dir.clone()),
        None => ConfigStore::open_default()?,
    };

    match &cli.command {
        Some(Command::Config { action }) => run_config(&store, action),
        Some(Command::Analyze { text, file, json }) => {
            let config = store.load()?;
            let bundle = load_bundle(&cli, &config)?;
            let text = read_input(text.as_deref(), file.as_ref())?;
            let verdict = analyze(&text, &bundle)?;
            if *json {
                println!("{}", verdict.to_pretty_json());
            } else {
                print!("{}", render_verdict(&verdict));
            }
            Ok(())
        }
        Some(Command::Rewrite { mode, text, file, json }) => {
            let config = store.load()?;
            let bundle = load_bundle(&cli, &config)?;
            let service = build_transformer(&cli, &config)?;
            let text = read_input(text.as_deref(), file.as_ref())?;
            run_rewrite(&bundle, &service, *mode, text, *json).await
        }
        None => {
            let config = store.load()?;
            let bundle = load_bundle(&cli, &config)?;
            // Analysis stays available even when the generative client cannot be built.
            let service = TransformService::from_settings_or_disabled(&llm_settings(&cli, &config));
            let stdin = io::stdin();
            let stdout = io::stdout();
            let summary = Session::new(&bundle, &service, stdin.lock(), stdout.lock())
                .run()
                .await?;
            info!(
                analyzed = summary.texts_analyzed,
                completed = summary.transforms_completed,
                "[CLI] session closed"
            );
            Ok(())
        }
    }
}

fn load_bundle(cli: &Cli, config: &AppConfig) -> Result<ModelBundle> {
    let dir = config.resolve_artifact_dir(cli.artifacts.as_deref());
    ModelRegistry::new(&dir)
        .load()
        .with_context(|| format!("cannot load model artifacts from {}", dir.display()))
}

fn llm_settings(cli: &Cli, config: &AppConfig) -> LlmSettings {
    config.llm_settings(LlmOverrides {
        api_key: cli.api_key.as_deref(),
        model: cli.model.as_deref(),
        timeout_secs: cli.timeout_secs,
    })
}

fn build_transformer(cli: &Cli, config: &AppConfig) -> Result<TransformService> {
    Ok(TransformService::from_settings(&llm_settings(cli, config))?)
}

/// Positional text wins, then `--file`, then all of stdin.
fn read_input(text: Option<&str>, file: Option<&PathBuf>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text.to_string());
    }
    if let Some(path) = file {
        return std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_string())
}

async fn run_rewrite(
    bundle: &ModelBundle,
    service: &TransformService,
    mode: TransformMode,
    text: String,
    json: bool,
) -> Result<()> {
    if !service.is_enabled() {
        bail!("transformation disabled: set --api-key, llm.apiKey in config, or OPENAI_API_KEY");
    }

    let before = analyze(&text, bundle)?;
    let request = TransformRequest::new(text, before.clone(), mode);
    let output = service.transform(request).await?;

    if !mode.is_rewrite() {
        if json {
            let body = serde_json::json!({ "mode": mode.name(), "verdict": before, "explanation": output });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            print!("{}", render_verdict(&before));
            println!("\n=== EXPLANATION ===\n{}", output);
        }
        return Ok(());
    }

    let after = analyze(&output, bundle)?;
    let comparison = compare_verdicts(&before, &after);

    if json {
        let body = serde_json::json!({
            "mode": mode.name(),
            "before": before,
            "rewritten": output,
            "after": after,
            "comparison": comparison,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("=== ORIGINAL ===");
        print!("{}", render_verdict(&before));
        println!("\n=== REWRITTEN ({}) ===\n{}", mode.name(), output);
        print!("{}", render_verdict(&after));
        println!("\nShift vs. original:");
        print!("{}", render_comparison(&comparison));
    }
    Ok(())
}

fn run_config(store: &ConfigStore, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let mut config = store.load()?;
            config.llm.api_key = config.llm.api_key.as_deref().map(mask_key);
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Path => println!("{}", store.config_file().display()),
        ConfigAction::SetKey { key } => {
            store.set_api_key(key)?;
            println!("API key stored ({})", mask_key(key));
        }
        ConfigAction::DeleteKey => {
            store.delete_api_key()?;
            println!("API key removed");
        }
        ConfigAction::SetArtifactDir { dir } => {
            store.set_artifact_dir(dir)?;
            println!("Artifact directory set to {}", dir.display());
        }
        ConfigAction::SetModel { model } => {
            store.set_model(model)?;
            println!("Model set to {}", model);
        }
    }
    Ok(())
}
