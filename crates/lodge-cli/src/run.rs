use std::fmt::Write as _;

use anyhow::Result;
use lodge_host::{EmbeddedManager, LodgeConfig, PersistedState, SavedStateStore};

use crate::scenario::{Scenario, Step};

/// Outcome of one scenario run.
pub struct RunReport {
    pub lines: Vec<String>,
    pub saved: Option<PersistedState>,
}

/// Drive a fresh manager through `scenario`, restoring from `restored` on
/// the first `create` step.
pub fn run_scenario(
    scenario: &Scenario,
    config: &LodgeConfig,
    mut restored: Option<PersistedState>,
) -> Result<RunReport> {
    let platform = scenario.build_platform(config.runtime.version())?;
    let mut manager = EmbeddedManager::with_platform(platform, &config.manager);
    tracing::info!(steps = scenario.steps.len(), ?manager, "Running scenario");

    let mut lines = Vec::new();
    let mut last_saved = None;
    for (n, step) in scenario.steps.iter().enumerate() {
        let outcome = match step {
            Step::Create => {
                let restored = restored.take();
                manager.dispatch_create(restored.as_ref());
                format!("host created, {} record(s)", manager.ids().len())
            }
            Step::Resume => {
                manager.dispatch_resume();
                "host resumed".to_string()
            }
            Step::Pause { finishing } => {
                manager.dispatch_pause(*finishing);
                "host paused".to_string()
            }
            Step::Stop => {
                manager.dispatch_stop();
                "host stopped".to_string()
            }
            Step::Destroy { finishing } => {
                manager.dispatch_destroy(*finishing);
                "host destroyed, all records dropped".to_string()
            }
            Step::Start(start) => {
                let descriptor = start.descriptor()?;
                match manager.start(&start.id, descriptor) {
                    Ok(Some(surface)) => format!(
                        "{} -> {} on {} ({})",
                        start.id,
                        state_of(&manager, &start.id),
                        surface.title,
                        surface.instance
                    ),
                    Ok(None) => format!("{} -> no surface ({})", start.id, state_of(&manager, &start.id)),
                    Err(e) => format!("{} -> failed: {e}", start.id),
                }
            }
            Step::Finish { id } => match manager.destroy(id, true) {
                Some(surface) => format!("{id} finished, released {}", surface.title),
                None => format!("{id} finished, nothing to release"),
            },
            Step::Save => {
                let saved = manager.save_instance_state();
                let outcome = match &saved {
                    Some(state) => format!("saved {}", state.ids().collect::<Vec<_>>().join(", ")),
                    None => "nothing to save".to_string(),
                };
                last_saved = saved.or(last_saved);
                outcome
            }
        };
        lines.push(format!("[{:>2}] {step}: {outcome}", n + 1));
    }

    lines.push(String::new());
    lines.push(record_table(&manager));

    let saved = manager.save_instance_state().or(last_saved);
    Ok(RunReport { lines, saved })
}

fn state_of(manager: &EmbeddedManager, id: &str) -> String {
    manager
        .state(id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "untracked".into())
}

fn record_table(manager: &EmbeddedManager) -> String {
    let mut table = format!(
        "host: {}  current: {}\n{:<16} {:<13} {:<10} {}",
        manager.host_state(),
        manager.current_id().unwrap_or("-"),
        "ID",
        "STATE",
        "INSTANCE",
        "TARGET"
    );
    for record in manager.records() {
        let instance = record
            .handle()
            .map(|h| h.instance().to_string())
            .unwrap_or_else(|| "-".into());
        let target = record
            .resolved_target()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".into());
        let _ = write!(
            table,
            "\n{:<16} {:<13} {:<10} {}",
            record.id(),
            record.state().to_string(),
            instance,
            target
        );
    }
    table
}

/// Persist `report.saved` under `host_key`, or clear it when nothing was saved.
pub async fn persist(store: &SavedStateStore, host_key: &str, report: &RunReport) -> Result<String> {
    match &report.saved {
        Some(saved) => {
            let path = store.save(host_key, saved).await?;
            Ok(format!("state for {host_key} written to {}", path.display()))
        }
        None => {
            store.remove(host_key).await?;
            Ok(format!("no state to keep for {host_key}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
[[platform.targets]]
owner = "org.example"
name = "Inbox"

[[steps]]
op = "create"

[[steps]]
op = "resume"

[[steps]]
op = "start"
id = "x"
target = "org.example/Inbox"

[[steps]]
op = "start"
id = "y"
target = "org.example/Inbox"

[[steps]]
op = "start"
id = "z"
target = "org.example/Missing"
"#;

    #[test]
    fn reports_every_step_and_the_final_table() {
        let scenario = Scenario::from_toml_str(SCENARIO).unwrap();
        let report = run_scenario(&scenario, &LodgeConfig::default(), None).unwrap();

        assert!(report.lines[2].contains("x -> resumed"));
        assert!(report.lines[3].contains("y -> resumed"));
        assert!(report.lines[4].contains("z -> failed"));
        let table = report.lines.last().unwrap();
        assert!(table.contains("current: y"));
        assert!(table.lines().any(|l| l.starts_with('x') && l.contains("started")));
        assert_eq!(report.saved.unwrap().ids().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn restored_state_is_applied_on_create() {
        let mut restored = PersistedState::new();
        restored.insert("x", &lodge_core::StateBlob::new(b"prior".to_vec()));
        let scenario = Scenario::from_toml_str("[[steps]]\nop = \"create\"\n").unwrap();
        let report = run_scenario(&scenario, &LodgeConfig::default(), Some(restored)).unwrap();

        assert!(report.lines[0].contains("1 record(s)"));
        assert!(report.saved.unwrap().contains("x"));
    }

    #[test]
    fn explicit_save_survives_host_destroy() {
        let scenario = Scenario::from_toml_str(
            r#"
[[platform.targets]]
owner = "org.example"
name = "Inbox"

[[steps]]
op = "create"
[[steps]]
op = "start"
id = "x"
target = "org.example/Inbox"
[[steps]]
op = "save"
[[steps]]
op = "destroy"
finishing = true
"#,
        )
        .unwrap();
        let report = run_scenario(&scenario, &LodgeConfig::default(), None).unwrap();
        assert!(report.lines[2].contains("saved x"));
        assert!(report.saved.unwrap().contains("x"));
    }

    #[tokio::test]
    async fn persist_writes_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = SavedStateStore::new(dir.path().to_path_buf());
        let mut saved = PersistedState::new();
        saved.insert("x", &lodge_core::StateBlob::new(b"s".to_vec()));

        let report = RunReport { lines: Vec::new(), saved: Some(saved) };
        persist(&store, "host", &report).await.unwrap();
        assert_eq!(store.list_host_keys().await.unwrap(), vec!["host"]);

        let empty = RunReport { lines: Vec::new(), saved: None };
        persist(&store, "host", &empty).await.unwrap();
        assert!(store.list_host_keys().await.unwrap().is_empty());
    }
}
