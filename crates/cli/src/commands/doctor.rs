use std::fs;
use std::path::Path;

use crmquery_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

const PROBE_FILE: &str = ".crmquery-doctor-probe";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| error.to_string());
    let report = build_report(config);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(config: Result<AppConfig, String>) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_endpoint(&config));
            checks.push(check_resource_path(&config.crm.resource_path));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error,
            });
            for name in ["llm_endpoint", "resource_path_writable"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_endpoint(config: &AppConfig) -> DoctorCheck {
    match config.llm.resolved_base_url() {
        Some(base_url) => DoctorCheck {
            name: "llm_endpoint",
            status: CheckStatus::Pass,
            details: format!(
                "{:?} via `{base_url}` using model `{}`",
                config.llm.provider, config.llm.model
            ),
        },
        None => DoctorCheck {
            name: "llm_endpoint",
            status: CheckStatus::Fail,
            details: format!("no base url resolvable for {:?}", config.llm.provider),
        },
    }
}

fn check_resource_path(path: &Path) -> DoctorCheck {
    let probe = path.join(PROBE_FILE);
    let result = fs::create_dir_all(path)
        .and_then(|()| fs::write(&probe, b"ok"))
        .and_then(|()| fs::remove_file(&probe));

    match result {
        Ok(()) => DoctorCheck {
            name: "resource_path_writable",
            status: CheckStatus::Pass,
            details: format!("`{}` is writable", path.display()),
        },
        Err(error) => DoctorCheck {
            name: "resource_path_writable",
            status: CheckStatus::Fail,
            details: format!("`{}` is not writable: {error}", path.display()),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
