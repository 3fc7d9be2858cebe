use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use topology_relay::topology::{Deployment, Protocol, ResourceStore, TopologySpec};

#[derive(Parser)]
#[command(name = "topology-cli")]
#[command(about = "Plan the two-tier topology and talk to the relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resources of a topology file in build order
    Plan { file: PathBuf },
    /// Ask whether one service may connect to another
    Check {
        file: PathBuf,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        port: u16,
        #[arg(long, value_enum, default_value_t = ProtocolArg::Tcp)]
        protocol: ProtocolArg,
    },
    /// Apply a topology file to a saved state and report what changed
    Apply {
        file: PathBuf,
        #[arg(long, default_value = "topology-state.json")]
        state: PathBuf,
    },
    /// Fetch the backend status through the relay
    Status {
        #[arg(short, long, default_value = "http://localhost:3000")]
        url: String,
    },
    /// Submit a data file for a date range and save the report
    Submit {
        #[arg(short, long, default_value = "http://localhost:3000")]
        url: String,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        end: String,
        #[arg(long)]
        file: PathBuf,
        /// Directory the report is written to
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProtocolArg {
    Tcp,
    Udp,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Tcp => Protocol::Tcp,
            ProtocolArg::Udp => Protocol::Udp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { file } => {
            let deployment = load_deployment(&file)?;
            println!(
                "{}",
                serde_json::to_string_pretty(deployment.graph.resources())?
            );
        }
        Commands::Check {
            file,
            from,
            to,
            port,
            protocol,
        } => {
            let deployment = load_deployment(&file)?;
            let verdict = deployment.can_connect(&from, &to, protocol.into(), port);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            if !verdict.is_allowed() {
                std::process::exit(1);
            }
        }
        Commands::Apply { file, state } => {
            let deployment = load_deployment(&file)?;
            let store = ResourceStore::load(&state)?;
            let report = store.apply(&deployment.graph);
            store.save(&state)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Status { url } => {
            let res = reqwest::get(format!("{}/status", url.trim_end_matches('/'))).await?;
            print_response(res).await?;
        }
        Commands::Submit {
            url,
            start,
            end,
            file,
            out,
        } => {
            let (start, end) = parse_range(&start, &end)?;
            let report = submit(&url, start, end, &file, &out).await?;
            println!("Saved {}", report.display());
        }
    }

    Ok(())
}

fn load_deployment(path: &Path) -> Result<Deployment, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let spec: TopologySpec = toml::from_str(&content)?;
    Ok(Deployment::build(&spec)?)
}

fn parse_range(start: &str, end: &str) -> Result<(NaiveDate, NaiveDate), String> {
    let parse = |label: &str, value: &str| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|e| format!("{label} date {value:?} is not YYYY-MM-DD: {e}"))
    };
    let start = parse("start", start)?;
    let end = parse("end", end)?;
    if end < start {
        return Err(format!("end date {end} is before start date {start}"));
    }
    Ok((start, end))
}

fn report_name(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "reporte_{}_{}.xlsx",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

async fn submit(
    url: &str,
    start: NaiveDate,
    end: NaiveDate,
    file: &Path,
    out: &Path,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    // Read before connecting: a missing file never reaches the relay.
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|e| format!("cannot read data file {}: {e}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archivo_datos".to_string());

    let form = Form::new()
        .text("fecha_inicio", start.format("%Y-%m-%d").to_string())
        .text("fecha_fin", end.format("%Y-%m-%d").to_string())
        .part("archivo_datos", Part::bytes(bytes).file_name(file_name));

    let res = reqwest::Client::new()
        .post(format!("{}/submit", url.trim_end_matches('/')))
        .multipart(form)
        .send()
        .await?;

    let status = res.status();
    if !status.is_success() {
        let message = match res.json::<Value>().await {
            Ok(body) => body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| "failed to process the file".to_string()),
            Err(_) => "failed to process the file".to_string(),
        };
        return Err(format!("{status}: {message}").into());
    }

    let target = out.join(report_name(start, end));
    let partial = target.with_extension("xlsx.part");
    let mut writer = tokio::fs::File::create(&partial).await?;
    let mut stream = res.bytes_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => writer.write_all(&chunk).await?,
            Err(e) => {
                drop(writer);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e.into());
            }
        }
    }
    writer.flush().await?;
    drop(writer);
    tokio::fs::rename(&partial, &target).await?;

    Ok(target)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
