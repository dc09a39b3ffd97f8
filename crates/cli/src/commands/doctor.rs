use clawby_core::config::{AppConfig, LoadOptions};
use clawby_mcp::load_server_definitions;
use serde::Serialize;

use crate::commands::{block_on, CommandResult};

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

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_api_key(&config));
            checks.push(check_persona(&config));
            checks.push(check_memory_store(&config));
            checks.push(check_remote_servers(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_api_key", "persona_file", "memory_store", "remote_servers"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_api_key(config: &AppConfig) -> DoctorCheck {
    match config.require_llm_api_key() {
        Ok(_) => DoctorCheck {
            name: "llm_api_key",
            status: CheckStatus::Pass,
            details: format!("api key present for model `{}`", config.llm.model),
        },
        Err(error) => {
            DoctorCheck { name: "llm_api_key", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_persona(config: &AppConfig) -> DoctorCheck {
    let path = &config.agent.soul_path;
    let details = if path.is_file() {
        format!("persona loaded from `{}`", path.display())
    } else {
        format!("`{}` not found, built-in persona in use", path.display())
    };
    DoctorCheck { name: "persona_file", status: CheckStatus::Pass, details }
}

fn check_memory_store(config: &AppConfig) -> DoctorCheck {
    if !config.memory.enabled {
        return DoctorCheck {
            name: "memory_store",
            status: CheckStatus::Skipped,
            details: "memory disabled".to_string(),
        };
    }
    if !config.memory.mock_embeddings && config.require_llm_api_key().is_err() {
        return DoctorCheck {
            name: "memory_store",
            status: CheckStatus::Fail,
            details: "real embeddings need llm.api_key (or set memory.mock_embeddings)".to_string(),
        };
    }

    let store = clawby_memory::VectorStore::new(config.memory.dir.join("memories.json"));
    match block_on("doctor", store.count()) {
        Ok(count) => DoctorCheck {
            name: "memory_store",
            status: CheckStatus::Pass,
            details: format!("{count} memories in `{}`", config.memory.dir.display()),
        },
        Err(failure) => {
            DoctorCheck { name: "memory_store", status: CheckStatus::Fail, details: failure.output }
        }
    }
}

fn check_remote_servers(config: &AppConfig) -> DoctorCheck {
    if !config.mcp.enabled {
        return DoctorCheck {
            name: "remote_servers",
            status: CheckStatus::Skipped,
            details: "remote tools disabled".to_string(),
        };
    }

    match load_server_definitions(&config.mcp.servers_path) {
        Ok(definitions) if definitions.is_empty() => DoctorCheck {
            name: "remote_servers",
            status: CheckStatus::Pass,
            details: format!("no servers defined in `{}`", config.mcp.servers_path.display()),
        },
        Ok(definitions) => DoctorCheck {
            name: "remote_servers",
            status: CheckStatus::Pass,
            details: format!(
                "{} server(s) defined: {}",
                definitions.len(),
                definitions.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        },
        Err(error) => {
            DoctorCheck { name: "remote_servers", status: CheckStatus::Fail, details: error.to_string() }
        }
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
