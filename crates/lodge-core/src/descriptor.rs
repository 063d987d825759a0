use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Explicit reference to an implementation: `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRef {
    pub owner: String,
    pub name: String,
}

impl TargetRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse the short `owner/name` form.
    pub fn parse(short: &str) -> Option<Self> {
        let (owner, name) = short.split_once('/')?;
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(owner, name))
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Flags carried by a descriptor that steer the reuse policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaunchFlags {
    /// Deliver to the live component instead of recreating it.
    #[serde(default)]
    pub single_top: bool,
    /// Force the live component to be torn down and recreated.
    #[serde(default)]
    pub clear_top: bool,
}

/// A request naming which implementation to materialize.
///
/// Two descriptors are "filter equal" when they name the same target with
/// the same action, data and categories. Flags and `extras` are auxiliary
/// payload and never take part in that comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(default)]
    pub target: Option<TargetRef>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub flags: LaunchFlags,
    #[serde(default)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Descriptor {
    /// Descriptor with an explicit target and nothing else.
    pub fn for_target(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: Some(TargetRef::new(owner, name)),
            ..Self::default()
        }
    }

    /// Descriptor resolved implicitly by action.
    pub fn for_action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    pub fn single_top(mut self) -> Self {
        self.flags.single_top = true;
        self
    }

    pub fn clear_top(mut self) -> Self {
        self.flags.clear_top = true;
        self
    }

    /// Equality ignoring flags and auxiliary payload.
    pub fn filter_equals(&self, other: &Descriptor) -> bool {
        self.target == other.target
            && self.action == other.action
            && self.data == other.data
            && self.categories == other.categories
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "descriptor{{")?;
        let mut sep = "";
        if let Some(target) = &self.target {
            write!(f, "target={target}")?;
            sep = " ";
        }
        if let Some(action) = &self.action {
            write!(f, "{sep}action={action}")?;
            sep = " ";
        }
        if let Some(data) = &self.data {
            write!(f, "{sep}data={data}")?;
        }
        write!(f, "}}")
    }
}

/// How many live instances of a target a single id may hold over time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchMode {
    /// Each distinguishing request recreates the component.
    #[default]
    Multiple,
    /// Requests for the live target are delivered to it in place.
    SingleTop,
    SingleTask,
    SingleInstance,
}

impl LaunchMode {
    pub fn allows_multiple(&self) -> bool {
        matches!(self, LaunchMode::Multiple)
    }
}

/// A concrete implementation a descriptor resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetInfo {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub launch_mode: LaunchMode,
}

impl TargetInfo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, launch_mode: LaunchMode) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            launch_mode,
        }
    }

    /// Same implementation class from the same owner.
    pub fn same_implementation(&self, other: &TargetInfo) -> bool {
        self.name == other.name && self.owner == other.owner
    }

    pub fn target_ref(&self) -> TargetRef {
        TargetRef::new(self.owner.clone(), self.name.clone())
    }
}

impl std::fmt::Display for TargetInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_equals_ignores_extras_and_flags() {
        let a = Descriptor::for_target("org.example", "Inbox").with_extra("page", 1.into());
        let b = Descriptor::for_target("org.example", "Inbox")
            .with_extra("page", 2.into())
            .clear_top();
        assert!(a.filter_equals(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn filter_equals_compares_core_fields() {
        let a = Descriptor::for_target("org.example", "Inbox").with_data("msg/1");
        assert!(!a.filter_equals(&Descriptor::for_target("org.example", "Inbox").with_data("msg/2")));
        assert!(!a.filter_equals(&a.clone().with_category("launcher")));
        assert!(!a.filter_equals(&Descriptor::for_target("org.other", "Inbox").with_data("msg/1")));
    }

    #[test]
    fn target_ref_parses_short_form() {
        assert_eq!(
            TargetRef::parse("org.example/Inbox"),
            Some(TargetRef::new("org.example", "Inbox"))
        );
        assert_eq!(TargetRef::parse("Inbox"), None);
        assert_eq!(TargetRef::parse("/Inbox"), None);
    }

    #[test]
    fn same_implementation_ignores_launch_mode() {
        let a = TargetInfo::new("org.example", "Inbox", LaunchMode::Multiple);
        let b = TargetInfo::new("org.example", "Inbox", LaunchMode::SingleTop);
        assert!(a.same_implementation(&b));
        assert!(!a.same_implementation(&TargetInfo::new("org.example", "Outbox", LaunchMode::Multiple)));
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let d: Descriptor = serde_json::from_str(r#"{"action":"view"}"#).unwrap();
        assert_eq!(d.action.as_deref(), Some("view"));
        assert!(d.target.is_none());
        assert!(!d.flags.single_top);
    }
}
