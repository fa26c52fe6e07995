use batchops::control::ReplayTarget;
use batchops::execution::model::parse_date;
use batchops::execution::RunType;
use chrono::NaiveDate;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Start {
        job_id: String,
        run_type: RunType,
        date: Option<NaiveDate>,
        note: Option<String>,
    },
    Progress {
        execution_id: String,
        processed: i64,
        success: i64,
        failed: i64,
    },
    Complete {
        execution_id: String,
        processed: Option<i64>,
        success: Option<i64>,
    },
    Fail {
        execution_id: String,
        error_code: String,
        message: String,
    },
    Stop {
        execution_id: String,
        reason: String,
    },
    Replay {
        job_id: String,
        target: ReplayTarget,
        parent: Option<String>,
        reason: String,
    },
    VersionCreate {
        result_type: String,
        result_id: String,
        execution_id: Option<String>,
    },
    VersionList {
        result_type: String,
        result_id: String,
    },
    VersionActivate {
        version_id: i32,
        approval_id: i32,
        expected: Option<i32>,
        reason: String,
    },
    ApprovalRequest {
        version_id: i32,
        reason: String,
    },
    ApprovalDecide {
        approval_id: i32,
        approve: bool,
        reason: String,
    },
    Ack {
        alert_id: i32,
    },
    Detail {
        execution_id: String,
    },
    Audit {
        target_id: Option<String>,
    },
    Jobs,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "可用命令: start <JOB> [manual] [yyyy-mm-dd] [note] | progress <exec> <processed> <success> <failed> | complete <exec> [processed] [success] | fail <exec> <code> <message> | stop <exec> <reason> | replay full <JOB> <date> [parent=<exec>] <reason> | replay range <JOB> <start> <end> [parent=<exec>] <reason> | replay single <JOB> <type> <id> [parent=<exec>] <reason> | version create <type> <id> [exec] | version list <type> <id> | version activate <version_id> <approval_id> [expect=<id>] <reason> | approval request <version_id> <reason> | approval approve|reject <id> <reason> | ack <alert_id> | detail <exec> | audit [target] | jobs | quit";

fn usage(msg: &str) -> Result<AppCommand, ()> {
    Ok(AppCommand::Unknown(format!("用法: {}", msg)))
}

fn rest(parts: &[&str], from: usize) -> String {
    parts.get(from..).map(|p| p.join(" ")).unwrap_or_default()
}

/// Pulls an optional `key=value` token out of the argument list.
fn take_option<'a>(parts: &mut Vec<&'a str>, key: &str) -> Option<&'a str> {
    let prefix = format!("{}=", key);
    let idx = parts.iter().position(|p| p.starts_with(&prefix))?;
    let tok = parts.remove(idx);
    tok.strip_prefix(&prefix).filter(|v| !v.is_empty())
}

fn parse_replay(mut parts: Vec<&str>) -> Result<AppCommand, ()> {
    let parent = take_option(&mut parts, "parent").map(str::to_string);
    let scope = parts.get(1).copied();
    let job_id = match parts.get(2) {
        Some(j) => j.to_string(),
        None => return usage("replay full|range|single <JOB> ..."),
    };
    let date = |i: usize| parts.get(i).and_then(|s| parse_date(s).ok());

    let (target, reason_at) = match scope {
        Some("full") => match date(3) {
            Some(d) => (ReplayTarget::Full(d), 4),
            None => return usage("replay full <JOB> <yyyy-mm-dd> [parent=<exec>] <reason>"),
        },
        Some("range") => match (date(3), date(4)) {
            (Some(start), Some(end)) => (ReplayTarget::Range(start, end), 5),
            _ => {
                return usage("replay range <JOB> <start> <end> [parent=<exec>] <reason>");
            }
        },
        Some("single") => match (parts.get(3), parts.get(4)) {
            (Some(t), Some(id)) => (
                ReplayTarget::Single {
                    target_type: t.to_string(),
                    target_id: id.to_string(),
                },
                5,
            ),
            _ => return usage("replay single <JOB> <type> <id> [parent=<exec>] <reason>"),
        },
        _ => return usage("replay full|range|single <JOB> ..."),
    };

    let reason = rest(&parts, reason_at);
    if reason.is_empty() {
        return usage("replay 需要填写原因");
    }
    Ok(AppCommand::Replay {
        job_id,
        target,
        parent,
        reason,
    })
}

fn parse_version(mut parts: Vec<&str>) -> Result<AppCommand, ()> {
    match parts.get(1).copied() {
        Some("create") => match (parts.get(2), parts.get(3)) {
            (Some(t), Some(id)) => Ok(AppCommand::VersionCreate {
                result_type: t.to_string(),
                result_id: id.to_string(),
                execution_id: parts.get(4).map(|s| s.to_string()),
            }),
            _ => usage("version create <type> <id> [exec]"),
        },
        Some("list") => match (parts.get(2), parts.get(3)) {
            (Some(t), Some(id)) => Ok(AppCommand::VersionList {
                result_type: t.to_string(),
                result_id: id.to_string(),
            }),
            _ => usage("version list <type> <id>"),
        },
        Some("activate") => {
            let expected = take_option(&mut parts, "expect").and_then(|s| s.parse().ok());
            let version_id = parts.get(2).and_then(|s| s.parse().ok());
            let approval_id = parts.get(3).and_then(|s| s.parse().ok());
            let reason = rest(&parts, 4);
            match (version_id, approval_id) {
                (Some(version_id), Some(approval_id)) if !reason.is_empty() => {
                    Ok(AppCommand::VersionActivate {
                        version_id,
                        approval_id,
                        expected,
                        reason,
                    })
                }
                _ => usage("version activate <version_id> <approval_id> [expect=<id>] <reason>"),
            }
        }
        _ => usage("version create|list|activate ..."),
    }
}

fn parse_approval(parts: &[&str]) -> Result<AppCommand, ()> {
    let id = parts.get(2).and_then(|s| s.parse::<i32>().ok());
    let reason = rest(parts, 3);
    match (parts.get(1).copied(), id) {
        (Some("request"), Some(version_id)) if !reason.is_empty() => {
            Ok(AppCommand::ApprovalRequest { version_id, reason })
        }
        (Some(verb @ ("approve" | "reject")), Some(approval_id)) if !reason.is_empty() => {
            Ok(AppCommand::ApprovalDecide {
                approval_id,
                approve: verb == "approve",
                reason,
            })
        }
        _ => usage("approval request <version_id> <reason> | approval approve|reject <id> <reason>"),
    }
}

impl FromStr for AppCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown("".to_string()));
        }

        match parts[0] {
            "start" => {
                let job_id = match parts.get(1) {
                    Some(j) => j.to_string(),
                    None => return usage("start <JOB> [manual] [yyyy-mm-dd] [note]"),
                };
                let mut idx = 2;
                let mut run_type = RunType::Auto;
                if parts.get(idx).map(|s| s.eq_ignore_ascii_case("manual")) == Some(true) {
                    run_type = RunType::Manual;
                    idx += 1;
                }
                let date = parts.get(idx).and_then(|s| parse_date(s).ok());
                if date.is_some() {
                    idx += 1;
                }
                let note = Some(rest(&parts, idx)).filter(|n| !n.is_empty());
                Ok(AppCommand::Start {
                    job_id,
                    run_type,
                    date,
                    note,
                })
            }
            "progress" => {
                let n = |i: usize| parts.get(i).and_then(|s| s.parse::<i64>().ok());
                match (parts.get(1), n(2), n(3), n(4)) {
                    (Some(id), Some(processed), Some(success), Some(failed)) => {
                        Ok(AppCommand::Progress {
                            execution_id: id.to_string(),
                            processed,
                            success,
                            failed,
                        })
                    }
                    _ => usage("progress <exec> <processed> <success> <failed>"),
                }
            }
            "complete" => match parts.get(1) {
                Some(id) => Ok(AppCommand::Complete {
                    execution_id: id.to_string(),
                    processed: parts.get(2).and_then(|s| s.parse().ok()),
                    success: parts.get(3).and_then(|s| s.parse().ok()),
                }),
                None => usage("complete <exec> [processed] [success]"),
            },
            "fail" => match (parts.get(1), parts.get(2)) {
                (Some(id), Some(code)) if parts.len() > 3 => Ok(AppCommand::Fail {
                    execution_id: id.to_string(),
                    error_code: code.to_string(),
                    message: rest(&parts, 3),
                }),
                _ => usage("fail <exec> <code> <message>"),
            },
            "stop" => match parts.get(1) {
                Some(id) if parts.len() > 2 => Ok(AppCommand::Stop {
                    execution_id: id.to_string(),
                    reason: rest(&parts, 2),
                }),
                _ => usage("stop <exec> <reason>"),
            },
            "replay" => parse_replay(parts),
            "version" | "v" => parse_version(parts),
            "approval" => parse_approval(&parts),
            "ack" => match parts.get(1).and_then(|s| s.parse().ok()) {
                Some(alert_id) => Ok(AppCommand::Ack { alert_id }),
                None => usage("ack <alert_id>"),
            },
            "detail" => match parts.get(1) {
                Some(id) => Ok(AppCommand::Detail {
                    execution_id: id.to_string(),
                }),
                None => usage("detail <exec>"),
            },
            "audit" => Ok(AppCommand::Audit {
                target_id: parts.get(1).map(|s| s.to_string()),
            }),
            "jobs" => Ok(AppCommand::Jobs),
            "help" | "h" => Ok(AppCommand::Help),
            "quit" | "q" | "exit" => Ok(AppCommand::Quit),
            _ => Ok(AppCommand::Unknown(format!("未知命令: {}", parts[0]))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> AppCommand {
        s.parse().unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn start_accepts_optional_manual_and_date() {
        assert_eq!(
            parse("start DAILY_SIM"),
            AppCommand::Start {
                job_id: "DAILY_SIM".into(),
                run_type: RunType::Auto,
                date: None,
                note: None,
            }
        );
        assert_eq!(
            parse("start DAILY_SIM manual 2024-03-01 vendor late"),
            AppCommand::Start {
                job_id: "DAILY_SIM".into(),
                run_type: RunType::Manual,
                date: Some(day(2024, 3, 1)),
                note: Some("vendor late".into()),
            }
        );
    }

    #[test]
    fn replay_scopes_and_parent_option() {
        assert_eq!(
            parse("replay full DAILY_SIM 2024-03-01 parent=e-1 price fix"),
            AppCommand::Replay {
                job_id: "DAILY_SIM".into(),
                target: ReplayTarget::Full(day(2024, 3, 1)),
                parent: Some("e-1".into()),
                reason: "price fix".into(),
            }
        );
        assert_eq!(
            parse("replay range DAILY_SIM 2024-03-01 2024-03-05 backfill"),
            AppCommand::Replay {
                job_id: "DAILY_SIM".into(),
                target: ReplayTarget::Range(day(2024, 3, 1), day(2024, 3, 5)),
                parent: None,
                reason: "backfill".into(),
            }
        );
        assert!(matches!(
            parse("replay single DAILY_SIM PORTFOLIO P-9 rerun one"),
            AppCommand::Replay {
                target: ReplayTarget::Single { .. },
                ..
            }
        ));
    }

    #[test]
    fn missing_reason_or_bad_numbers_yield_usage() {
        for line in [
            "replay full DAILY_SIM 2024-03-01",
            "replay full DAILY_SIM 03/01/2024 reason",
            "stop e-1",
            "fail e-1 C1",
            "progress e-1 10 x 0",
            "version activate 3 abc why",
            "approval approve 4",
            "ack",
        ] {
            match parse(line) {
                AppCommand::Unknown(msg) => assert!(msg.starts_with("用法"), "{line}: {msg}"),
                other => panic!("{line} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn version_activate_reads_expectation() {
        assert_eq!(
            parse("version activate 2 7 expect=3 revert bad rerun"),
            AppCommand::VersionActivate {
                version_id: 2,
                approval_id: 7,
                expected: Some(3),
                reason: "revert bad rerun".into(),
            }
        );
    }

    #[test]
    fn approval_decisions() {
        assert_eq!(
            parse("approval reject 4 not justified"),
            AppCommand::ApprovalDecide {
                approval_id: 4,
                approve: false,
                reason: "not justified".into(),
            }
        );
        assert_eq!(parse("q"), AppCommand::Quit);
        assert!(matches!(parse("frobnicate"), AppCommand::Unknown(_)));
    }
}
