use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_tally")
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

fn tally(args: &[&str], config: &Path) -> Output {
    Command::new(bin())
        .args(args)
        .arg("--config")
        .arg(config)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn stdout_lines(out: &Output) -> Vec<serde_json::Value> {
    String::from_utf8(out.stdout.clone())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn outputs_lists_builtin_kinds() {
    let out = Command::new(bin()).arg("outputs").output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert_eq!(text.lines().collect::<Vec<_>>(), vec!["http", "queue", "stdout"]);
}

#[test]
fn sample_config_is_valid_toml() {
    let out = Command::new(bin()).arg("sample-config").output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("output_max_batch_size = 20"));
    assert!(text.parse::<toml::Table>().is_ok());

    let temp = tempfile::tempdir().unwrap();
    let path = write_config(temp.path(), &text);
    let cfg = tally_core::config::Config::load(Some(&path)).unwrap();
    assert_eq!(cfg.output_kind, "http");
    assert_eq!(cfg.exec_name_suffix, "_mycollector");
    assert!(cfg.validate_for_run().is_ok());
}

#[test]
fn test_command_prints_datums_with_capped_dimensions() {
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(
        temp.path(),
        r#"
exec_command = ["echo", 'cpu,host=a,region=us,zone=1 usage=42,idle="high"']
exec_data_format = "influx"
output_kind = "stdout"
output_max_dimensions = 2
"#,
    );

    let out = tally(&["test", "--json"], &config);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let datums = stdout_lines(&out);
    assert_eq!(datums.len(), 1);
    assert_eq!(datums[0]["MetricName"], "cpu_usage");
    assert_eq!(datums[0]["Value"], 42.0);
    assert_eq!(
        datums[0]["Dimensions"],
        serde_json::json!([
            { "Name": "host", "Value": "a" },
            { "Name": "region", "Value": "us" }
        ])
    );
}

#[test]
fn run_once_partitions_json_collector_output() {
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(
        temp.path(),
        r#"
global_tags = "host=agent-1"
exec_command = ["echo", '{"load": 1.5, "mem": {"free": 10, "label": "x"}}']
output_kind = "stdout"
output_namespace = "E2E"
output_max_batch_size = 1
"#,
    );

    let out = tally(&["run", "--once"], &config);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let batches = stdout_lines(&out);
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0]["Namespace"], "E2E");
    assert_eq!(batches[0]["MetricData"][0]["MetricName"], "exec_load");
    assert_eq!(batches[1]["MetricData"][0]["MetricName"], "exec_mem_free");
    assert_eq!(batches[1]["MetricData"][0]["Dimensions"][0]["Value"], "agent-1");
}

#[test]
fn routed_test_shows_routing_keys() {
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(
        temp.path(),
        r#"
exec_command = ["echo", "cpu,host=srv1 usage=1"]
exec_data_format = "influx"
output_kind = "queue"
output_endpoint = "http://127.0.0.1:8082"
output_namespace = "metrics"
output_routing_tag = "host"
"#,
    );

    let out = tally(&["test"], &config);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("srv1"));
    assert!(text.contains("cpu,host=srv1 usage=1 "));
    assert!(text.contains("-- 1 records --"));
}

#[test]
fn zero_batch_size_is_rejected_before_running() {
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(
        temp.path(),
        r#"
exec_command = ["echo", "{}"]
output_max_batch_size = 0
"#,
    );

    let out = tally(&["run", "--once"], &config);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("output_max_batch_size"));
}

#[test]
fn unknown_output_kind_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let config = write_config(
        temp.path(),
        r#"
exec_command = ["echo", "{}"]
output_kind = "carrier-pigeon"
"#,
    );

    let out = tally(&["run", "--once"], &config);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown output kind"));
}
