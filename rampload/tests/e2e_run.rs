use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::Context as _;
use rampload_testserver::{PATH_USER_REGISTER, TestServer};
use serde::Deserialize;

const REGISTER_FIELDS: [(&str, &str); 4] = [
    ("username", "admin"),
    ("name", "admin"),
    ("birthdate", "2024-10-10T02:59:10.843897"),
    ("password", "superSecretAdminPassword123"),
];

#[derive(Debug, Deserialize)]
struct Totals {
    requests_total: u64,
    failed_requests_total: u64,
    dropped_iterations_total: u64,
}

#[derive(Debug, Deserialize)]
struct ScenarioLine {
    scenario: String,
    executor: String,
}

#[derive(Debug, Deserialize)]
struct ProgressLine {
    scenario: String,
    max_vus: u64,
}

#[derive(Debug, Deserialize)]
struct SummaryLine {
    scenarios: Vec<ScenarioLine>,
    totals: Totals,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum JsonLine {
    #[serde(rename = "progress")]
    Progress(ProgressLine),

    #[serde(rename = "summary")]
    Summary(SummaryLine),
}

async fn rampload(args: Vec<String>) -> anyhow::Result<Output> {
    let out = tokio::task::spawn_blocking(move || {
        Command::new(env!("CARGO_BIN_EXE_rampload"))
            .args(&args)
            .env_remove("BASE_URL")
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run rampload binary")?;

    anyhow::ensure!(
        out.status.success(),
        "rampload failed ({:?})\nstdout:\n{}\nstderr:\n{}",
        out.status.code(),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(out)
}

fn parse_lines(out: &Output) -> anyhow::Result<(Vec<ProgressLine>, SummaryLine)> {
    let stdout = String::from_utf8_lossy(&out.stdout);
    let mut progress = Vec::new();
    let mut summary = None;

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<JsonLine>(line)
            .with_context(|| format!("invalid NDJSON line: {line}"))?
        {
            JsonLine::Progress(p) => progress.push(p),
            JsonLine::Summary(s) => summary = Some(s),
        }
    }

    let summary = summary.ok_or_else(|| anyhow::anyhow!("missing summary line:\n{stdout}"))?;
    Ok((progress, summary))
}

fn ensure_register_requests(server: &TestServer, expected: u64) -> anyhow::Result<()> {
    let recorded = server.stats().recorded();
    anyhow::ensure!(
        recorded.len() as u64 == expected,
        "server saw {} requests, expected {expected}",
        recorded.len()
    );
    for r in &recorded {
        anyhow::ensure!(r.method == "POST" && r.path == PATH_USER_REGISTER);
        let fields = r
            .fields
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("undecodable body"))?;
        anyhow::ensure!(fields.len() == REGISTER_FIELDS.len(), "fields: {fields:?}");
        for (name, value) in REGISTER_FIELDS {
            anyhow::ensure!(fields.get(name).map(String::as_str) == Some(value));
        }
    }
    Ok(())
}

fn write_scenario(dir: &tempfile::TempDir, yaml: &str) -> anyhow::Result<PathBuf> {
    let path = dir.path().join("scenario.yaml");
    std::fs::write(&path, yaml).context("write scenario")?;
    Ok(path)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shortened_ramp_from_file_reports_ndjson() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir().context("tempdir")?;

    // 0 -> 20/s over 2s: the rate integral is 20 iterations.
    let path = write_scenario(
        &dir,
        r#"
scenarios:
  - name: constant_request_rate
    executor: ramping-arrival-rate
    startRate: 0
    timeUnit: 1s
    preAllocatedVUs: 2
    maxVUs: 4
    stages:
      - target: 20
        duration: 2s
"#,
    )?;

    let out = rampload(vec![
        "run".to_string(),
        path.display().to_string(),
        "--base-url".to_string(),
        server.base_url().to_string(),
        "--output".to_string(),
        "json".to_string(),
    ])
    .await?;
    let (progress, summary) = parse_lines(&out)?;

    anyhow::ensure!(!progress.is_empty(), "expected progress lines");
    anyhow::ensure!(progress.iter().all(|p| p.scenario == "constant_request_rate"));
    anyhow::ensure!(progress.iter().all(|p| p.max_vus == 4));

    anyhow::ensure!(summary.scenarios[0].executor == "ramping-arrival-rate");
    let t = &summary.totals;
    anyhow::ensure!(
        t.requests_total + t.dropped_iterations_total == 20,
        "requests={} dropped={}",
        t.requests_total,
        t.dropped_iterations_total
    );
    anyhow::ensure!(t.failed_requests_total == 0);

    ensure_register_requests(&server, t.requests_total)?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn built_in_plan_with_overrides_registers_the_admin_user() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let out = rampload(vec![
        "run".to_string(),
        "--base-url".to_string(),
        server.base_url().to_string(),
        "--vus".to_string(),
        "1".to_string(),
        "--iterations".to_string(),
        "3".to_string(),
    ])
    .await?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(stdout.contains("plan: built-in user-register"), "{stdout}");
    anyhow::ensure!(stdout.contains("scenario: constant_request_rate exec=constant-vus"));
    anyhow::ensure!(stdout.contains("requests: 3 (failed 0)"), "{stdout}");

    ensure_register_requests(&server, 3)?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn exported_scenario_runs_as_exported() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir().context("tempdir")?;
    let exported = dir.path().join("out/exported.yaml");

    rampload(vec![
        "export-scenario".to_string(),
        "--out".to_string(),
        exported.display().to_string(),
        "--base-url".to_string(),
        server.base_url().to_string(),
        "--vus".to_string(),
        "2".to_string(),
        "--iterations".to_string(),
        "4".to_string(),
    ])
    .await?;

    let yaml = std::fs::read_to_string(&exported).context("read exported scenario")?;
    anyhow::ensure!(yaml.contains("executor: constant-vus"), "{yaml}");
    anyhow::ensure!(yaml.contains("path: /user-register"), "{yaml}");

    let out = rampload(vec![
        "run".to_string(),
        exported.display().to_string(),
        "--output".to_string(),
        "json".to_string(),
    ])
    .await?;
    let (_, summary) = parse_lines(&out)?;

    anyhow::ensure!(summary.scenarios[0].scenario == "constant_request_rate");
    anyhow::ensure!(summary.totals.requests_total == 4);
    ensure_register_requests(&server, 4)?;
    server.shutdown().await;
    Ok(())
}
