//! Permission Gate
//!
//! Every intent that reads or mutates protected data declares exactly one
//! capability in the rule registry. The gate checks it against the caller's
//! capability set before anything is dispatched.
//!
//! The capability set itself comes from a `PermissionProvider`; the gate
//! only consumes it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::registry::RuleRegistry;
use super::types::{Capability, Intent};

/// Outcome of a permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Allowed,
    Denied { missing: Capability },
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionDecision::Allowed)
    }
}

pub struct PermissionGate {
    registry: Arc<RuleRegistry>,
}

impl PermissionGate {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self { registry }
    }

    pub fn check_permission(&self, intent: Intent, caller_permissions: &HashSet<Capability>) -> bool {
        self.decide(intent, caller_permissions).is_allowed()
    }

    /// Same check as `check_permission`, naming the missing capability on denial
    pub fn decide(&self, intent: Intent, caller_permissions: &HashSet<Capability>) -> PermissionDecision {
        match self.registry.required_capability(intent) {
            None => PermissionDecision::Allowed,
            Some(required) if caller_permissions.contains(&required) => {
                debug!(%intent, %required, "permission granted");
                PermissionDecision::Allowed
            }
            Some(required) => {
                warn!(%intent, %required, "permission denied");
                PermissionDecision::Denied { missing: required }
            }
        }
    }
}

// ============================================================================
// Permission provider
// ============================================================================

/// Who is calling, as seen by the transport
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub caller_id: String,
    pub roles: Vec<String>,
}

impl CallerContext {
    pub fn new(caller_id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            roles,
        }
    }
}

/// Supplies the capability set for a caller
pub trait PermissionProvider: Send + Sync {
    fn capabilities(&self, caller: &CallerContext) -> HashSet<Capability>;
}

/// Role table for the dashboard's built-in roles
#[derive(Debug, Clone)]
pub struct StaticPermissionProvider {
    roles: HashMap<String, HashSet<Capability>>,
}

impl Default for StaticPermissionProvider {
    fn default() -> Self {
        use Capability::*;

        let mut roles = HashMap::new();
        roles.insert("admin".to_string(), Capability::ALL.into_iter().collect());
        roles.insert(
            "operator".to_string(),
            [CreateReport, ViewReport, UpdateReport, AssignReport, CreateCategory, ViewStats]
                .into_iter()
                .collect(),
        );
        roles.insert(
            "viewer".to_string(),
            [ViewReport, ViewStats].into_iter().collect(),
        );
        roles.insert(
            "citizen".to_string(),
            [CreateReport, ViewReport].into_iter().collect(),
        );
        Self { roles }
    }
}

impl StaticPermissionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: &str, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.roles
            .insert(role.to_lowercase(), capabilities.into_iter().collect());
        self
    }
}

impl PermissionProvider for StaticPermissionProvider {
    fn capabilities(&self, caller: &CallerContext) -> HashSet<Capability> {
        let mut granted = HashSet::new();
        for role in &caller.roles {
            match self.roles.get(&role.trim().to_lowercase()) {
                Some(caps) => granted.extend(caps.iter().copied()),
                None => debug!(role = %role, caller = %caller.caller_id, "ignoring unknown role"),
            }
        }
        granted
    }
}

/// Parse a comma-separated capability list, skipping unknown tokens
pub fn parse_capabilities(raw: &str) -> HashSet<Capability> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|token| match token.parse::<Capability>() {
            Ok(cap) => Some(cap),
            Err(_) => {
                debug!(token, "ignoring unknown capability");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> PermissionGate {
        PermissionGate::new(Arc::new(RuleRegistry::builtin().unwrap()))
    }

    #[test]
    fn test_intent_without_capability_always_allowed() {
        let gate = gate();
        assert!(gate.check_permission(Intent::Greeting, &HashSet::new()));
        assert!(gate.check_permission(Intent::Help, &HashSet::new()));
        assert!(gate.check_permission(Intent::GeneralFallback, &HashSet::new()));
    }

    #[test]
    fn test_missing_capability_denied() {
        let gate = gate();
        let perms: HashSet<Capability> = [Capability::ViewReport].into_iter().collect();
        assert!(!gate.check_permission(Intent::CreateReport, &perms));
        assert_eq!(
            gate.decide(Intent::CreateReport, &perms),
            PermissionDecision::Denied {
                missing: Capability::CreateReport
            }
        );
        assert!(gate.check_permission(Intent::SearchReports, &perms));
    }

    #[test]
    fn test_role_provider() {
        let provider = StaticPermissionProvider::new();
        let viewer = provider.capabilities(&CallerContext::new("v", vec!["viewer".into()]));
        assert!(viewer.contains(&Capability::ViewReport));
        assert!(!viewer.contains(&Capability::CreateReport));

        let mixed = provider.capabilities(&CallerContext::new(
            "m",
            vec!["Viewer".into(), "citizen".into(), "pirate".into()],
        ));
        assert!(mixed.contains(&Capability::CreateReport));
        assert!(mixed.contains(&Capability::ViewStats));
        assert!(!mixed.contains(&Capability::AssignReport));

        let admin = provider.capabilities(&CallerContext::new("a", vec!["admin".into()]));
        assert_eq!(admin.len(), Capability::ALL.len());
    }

    #[test]
    fn test_custom_role() {
        let provider = StaticPermissionProvider::new().with_role("Dispatcher", [Capability::AssignReport]);
        let caps = provider.capabilities(&CallerContext::new("d", vec!["dispatcher".into()]));
        assert_eq!(caps, [Capability::AssignReport].into_iter().collect());
    }

    #[test]
    fn test_parse_capabilities_skips_unknown() {
        let caps = parse_capabilities("create_report, view_stats,,bogus");
        assert_eq!(caps.len(), 2);
        assert!(caps.contains(&Capability::CreateReport));
    }
}
