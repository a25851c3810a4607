// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use cfit_rs::adk::coerce::coerce;
use cfit_rs::cfit::config::Settings;
use cfit_rs::cfit::extract::Document;
use cfit_rs::cfit::nodes::keys::JD_URL;
use cfit_rs::cfit::server;
use cfit_rs::cfit::service::{new_thread_id, open_checkpoints, FitService};
use cfit_rs::cfit::workflow::loader::WorkflowLoader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (defaults to PORT or 8000)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one workflow on a thread
    Run {
        /// Workflow name, e.g. oneclick_fit
        #[arg(short, long)]
        workflow: String,

        /// Thread to run on; a new one is generated when omitted
        #[arg(short, long)]
        thread_id: Option<String>,

        /// Initial Job State field as key=value (JSON values are parsed)
        #[arg(short, long = "field")]
        fields: Vec<String>,

        /// Résumé document to extract into `resume`
        #[arg(long)]
        resume_file: Option<PathBuf>,

        /// Job posting URL, stored as `jd_url`
        #[arg(long)]
        jd_url: Option<String>,
    },
    /// Print the checkpointed state of a thread
    State {
        #[arg(short, long)]
        thread_id: String,
    },
    /// List the available workflows
    Workflows,
}

fn parse_field(raw: &str) -> anyhow::Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("field '{}' must be key=value", raw);
    };
    let value = match serde_json::from_str::<Value>(value) {
        Ok(v) => v,
        Err(_) => match coerce(value) {
            v @ (Value::Object(_) | Value::Array(_)) => v,
            _ => Value::String(value.to_string()),
        },
    };
    Ok((key.trim().to_string(), value))
}

async fn read_document(path: &Path) -> anyhow::Result<Document> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("resume")
        .to_string();
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => Some("application/pdf".to_string()),
        Some("docx") => Some(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
        ),
        _ => None,
    };
    Ok(Document {
        file_name,
        content_type,
        bytes,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut settings = Settings::from_env()?;

    match args.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                settings.port = port;
            }
            server::serve(settings).await?;
        }
        Commands::Run {
            workflow,
            thread_id,
            fields,
            resume_file,
            jd_url,
        } => {
            let thread_id = thread_id.unwrap_or_else(new_thread_id);

            let mut initial = Map::new();
            for raw in &fields {
                let (key, value) = parse_field(raw)?;
                initial.insert(key, value);
            }
            if let Some(url) = jd_url {
                initial.insert(JD_URL.to_string(), Value::String(url));
            }

            let checkpoints = open_checkpoints(&settings).await?;
            let service = FitService::bootstrap(&settings, checkpoints.clone()).await?;

            if let Some(path) = &resume_file {
                let document = read_document(path).await?;
                let extracted = service.extract_document(document).await?;
                initial.extend(extracted);
            }

            log::info!("Running workflow '{}' on thread {}", workflow, thread_id);
            let result = service.run(&workflow, &thread_id, initial).await;
            checkpoints.close().await?;
            let state = result?;

            let output = serde_json::json!({ "thread_id": thread_id, "state": state });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::State { thread_id } => {
            let checkpoints = open_checkpoints(&settings).await?;
            let values = checkpoints.load(&thread_id).await?;
            checkpoints.close().await?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        Commands::Workflows => {
            let defs = WorkflowLoader::new().load_all(settings.workflows_dir.as_deref())?;
            let listing: Vec<Value> = defs
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "name": d.name,
                        "description": d.description,
                        "nodes": d.nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
    }

    Ok(())
}
