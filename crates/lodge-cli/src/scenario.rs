use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use lodge_core::{Descriptor, LaunchFlags, TargetInfo, TargetRef};
use lodge_runtime::SimulatedPlatform;
use serde::Deserialize;

/// A host lifecycle script: the simulated platform plus the calls to make.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub platform: PlatformSpec,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlatformSpec {
    /// Overrides `[runtime] version` from the config.
    pub version: Option<u32>,
    #[serde(default)]
    pub targets: Vec<TargetInfo>,
    /// Action name to `owner/name`.
    #[serde(default)]
    pub actions: BTreeMap<String, String>,
    /// Targets (`owner/name`) whose launches produce nothing.
    #[serde(default)]
    pub refuse: Vec<String>,
    /// Targets (`owner/name`) that finish themselves while launching.
    #[serde(default)]
    pub finish_on_launch: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    Create,
    Resume,
    Pause {
        #[serde(default)]
        finishing: bool,
    },
    Stop,
    Destroy {
        #[serde(default)]
        finishing: bool,
    },
    Start(StartStep),
    Finish {
        id: String,
    },
    Save,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Create => write!(f, "create"),
            Step::Resume => write!(f, "resume"),
            Step::Pause { finishing } => write!(f, "pause (finishing={finishing})"),
            Step::Stop => write!(f, "stop"),
            Step::Destroy { finishing } => write!(f, "destroy (finishing={finishing})"),
            Step::Start(start) => write!(f, "start {}", start.id),
            Step::Finish { id } => write!(f, "finish {id}"),
            Step::Save => write!(f, "save"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartStep {
    pub id: String,
    /// Explicit `owner/name`.
    pub target: Option<String>,
    pub action: Option<String>,
    pub data: Option<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub single_top: bool,
    #[serde(default)]
    pub clear_top: bool,
    #[serde(default)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl StartStep {
    pub fn descriptor(&self) -> Result<Descriptor> {
        let target = self.target.as_deref().map(parse_target).transpose()?;
        if target.is_none() && self.action.is_none() {
            bail!("start {} needs a target or an action", self.id);
        }
        Ok(Descriptor {
            target,
            action: self.action.clone(),
            data: self.data.clone(),
            categories: self.categories.clone(),
            flags: LaunchFlags {
                single_top: self.single_top,
                clear_top: self.clear_top,
            },
            extras: self.extras.clone(),
        })
    }
}

fn parse_target(short: &str) -> Result<TargetRef> {
    TargetRef::parse(short).with_context(|| format!("target {short:?} is not owner/name"))
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build the simulated platform this scenario runs against.
    pub fn build_platform(&self, default_version: u32) -> Result<Arc<SimulatedPlatform>> {
        let version = self.platform.version.unwrap_or(default_version);
        let platform = SimulatedPlatform::with_catalogue(version, self.platform.targets.clone());
        for (action, target) in &self.platform.actions {
            platform.register_action(action.clone(), parse_target(target)?);
        }
        for target in &self.platform.refuse {
            platform.refuse_launch(parse_target(target)?);
        }
        for target in &self.platform.finish_on_launch {
            platform.finish_on_launch(parse_target(target)?);
        }
        Ok(Arc::new(platform))
    }
}
