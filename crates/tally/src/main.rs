mod output;
mod telemetry;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tally_core::config::Config;
use tally_core::line::encode_record;
use tally_export::datum::build_all_datums;
use tally_export::{OutputConfig, OutputRegistry};
use tally_ingest::exec::Exec;
use tally_ingest::pipeline::{Agent, AgentConfig};
use tracing::info;

use crate::output::{print_datums_human, print_datums_json, print_records_json, print_routed_human};
use crate::telemetry::{init_cli_tracing, init_run_tracing};

const SAMPLE_CONFIG: &str = r#"# How often to run the collector and flush its output
interval = "10s"
# Tags added to every record unless the collector already set them
global_tags = "host=web-01,dc=east"

# The collector command, as an argument list
exec_command = ["/usr/bin/mycollector", "--foo=bar"]
# "json" (numbers only, nested keys joined with _) or "influx" (line records)
exec_data_format = "json"
# Appended to the measurement name
exec_name_suffix = "_mycollector"
exec_timeout = "5s"

# One of the kinds listed by `tally outputs`
output_kind = "http"
output_endpoint = "http://127.0.0.1:8080/metrics"
# Namespace for batched outputs, topic for the queue output
output_namespace = "Tally/Agent"
output_max_batch_size = 20
output_max_dimensions = 10
# Queue output only: tag whose value keys each message
# output_routing_tag = "host"
# output_headers = "authorization=Bearer token"
# output_compression = "gzip"
output_timeout = "10s"
# PEM files for https endpoints; cert and key go together
# output_tls_ca = "/etc/tally/ca.pem"
# output_tls_cert = "/etc/tally/client.pem"
# output_tls_key = "/etc/tally/client.key"
# output_tls_insecure_skip_verify = false
"#;

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Run a collector and export its metrics in backend-sized batches")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Path to the TOML config file")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Gather and export on every interval")]
    Run {
        #[arg(long, help = "Gather and export a single time, then exit")]
        once: bool,
    },
    #[command(about = "Gather once and print what would be exported")]
    Test {
        #[arg(long)]
        json: bool,
    },
    #[command(about = "List the available output kinds")]
    Outputs,
    #[command(about = "Print an example config file")]
    SampleConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { once } => {
            let tracing = init_run_tracing();
            let result = run_agent(cli.config, once).await;
            tracing.shutdown();
            result
        }
        Commands::Test { json } => {
            init_cli_tracing();
            run_test(cli.config, json).await
        }
        Commands::Outputs => {
            for kind in OutputRegistry::builtin().kinds() {
                println!("{kind}");
            }
            Ok(())
        }
        Commands::SampleConfig => {
            print!("{SAMPLE_CONFIG}");
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let cfg = Config::load(path.as_deref()).context("load config")?;
    cfg.validate_for_run().context("validate config")?;
    Ok(cfg)
}

fn build_agent(cfg: &Config) -> anyhow::Result<Agent> {
    let registry = OutputRegistry::builtin();
    let output = registry
        .build(&OutputConfig::from_config(cfg))
        .context("build output")?;
    let exec = Exec::from_config(cfg).context("build exec input")?;
    Ok(Agent::new(exec, output, AgentConfig::from_config(cfg)))
}

async fn run_agent(path: Option<PathBuf>, once: bool) -> anyhow::Result<()> {
    let cfg = load_config(path)?;
    let mut agent = build_agent(&cfg)?;

    if once {
        let report = agent.run_once().await.context("export")?;
        info!(
            records = report.records,
            datums = report.datums,
            requests = report.requests,
            "export complete"
        );
        return Ok(());
    }

    agent
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("agent")?;
    Ok(())
}

async fn run_test(path: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let cfg = load_config(path)?;
    let output_cfg = OutputConfig::from_config(&cfg);
    let agent = build_agent(&cfg)?;
    let records = agent.gather().await.context("gather")?;

    if agent.output().is_routed() {
        if json {
            return print_records_json(&records);
        }
        let routed = output_cfg.routed_config();
        let lines = records
            .iter()
            .filter_map(|r| {
                encode_record(r)
                    .ok()
                    .flatten()
                    .map(|line| (routed.routing_key(r), line))
            })
            .collect::<Vec<_>>();
        print_routed_human(&lines);
        return Ok(());
    }

    let datums = build_all_datums(&records, output_cfg.max_dimensions);
    if json {
        print_datums_json(&datums)
    } else {
        print_datums_human(&datums);
        Ok(())
    }
}
