use std::collections::BTreeMap;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;

use mixgate::control::labels::{CALLER_IP, PRODUCER_REQUEST_COUNT};
use mixgate::control::{CheckRequest, MetricValue, MetricValueSet, Operation, ReportRequest};

#[derive(Parser)]
#[command(name = "mixgate-cli")]
#[command(about = "Send check and report calls to a mixgate instance", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:9092")]
    gateway: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask whether an operation may proceed
    Check {
        /// Destination service
        #[arg(long)]
        dest: String,
        /// Calling service (consumer id)
        #[arg(long, default_value = "")]
        source: String,
        #[arg(long)]
        caller_ip: Option<String>,
        #[arg(long, default_value = "cli-op")]
        operation_id: String,
    },
    /// Report int64 metric values
    Report {
        #[arg(long)]
        dest: String,
        #[arg(long, default_value = "")]
        source: String,
        /// `name=value`, repeatable. Defaults to one request count.
        #[arg(long = "metric", value_parser = parse_metric)]
        metrics: Vec<(String, i64)>,
    },
}

fn parse_metric(s: &str) -> Result<(String, i64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let value = value.parse().map_err(|e| format!("{s}: {e}"))?;
    Ok((name.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let base = cli.gateway.trim_end_matches('/');

    match cli.command {
        Commands::Check {
            dest,
            source,
            caller_ip,
            operation_id,
        } => {
            let mut labels = BTreeMap::new();
            if let Some(ip) = caller_ip {
                labels.insert(CALLER_IP.to_string(), ip);
            }
            let request = CheckRequest {
                service_name: dest.clone(),
                operation: Operation {
                    operation_id,
                    consumer_id: source,
                    labels,
                    ..Operation::default()
                },
            };
            let res = client
                .post(format!("{base}/v1/services/{dest}:check"))
                .json(&request)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Report { dest, source, metrics } => {
            let metrics = if metrics.is_empty() {
                vec![(PRODUCER_REQUEST_COUNT.to_string(), 1)]
            } else {
                metrics
            };
            let request = ReportRequest {
                service_name: dest.clone(),
                operations: vec![Operation {
                    operation_id: "cli-report".into(),
                    consumer_id: source,
                    metric_value_sets: metrics
                        .into_iter()
                        .map(|(metric_name, value)| MetricValueSet {
                            metric_name,
                            metric_values: vec![MetricValue::int64(value)],
                        })
                        .collect(),
                    ..Operation::default()
                }],
            };
            let res = client
                .post(format!("{base}/v1/services/{dest}:report"))
                .json(&request)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
