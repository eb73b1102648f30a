//! Resource placement classification.
//!
//! Turns the cluster manager's resource flags and placement into one status
//! cell per (resource, node). The flag checks run in a fixed priority order,
//! first match wins: blocked > inactive > failed > orphaned > unmanaged,
//! and only a resource clean on all flags falls through to the
//! placement-derived result. Cardinality beats role: a resource active on
//! more than one node is WARN no matter which node is being evaluated.

use crate::record::{Category, RecordBuilder};
use crate::snapshot::ClusterResource;

/// Outcome of classifying one resource as seen from one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// The cluster manager refuses to touch it.
    Blocked,
    /// Flagged inactive by the cluster manager.
    Inactive,
    /// A failed action is recorded against it.
    Failed,
    /// No longer in the configuration but still around.
    Orphaned,
    /// Present but not managed by the cluster.
    Unmanaged,
    /// Running nowhere (or role says Stopped).
    Stopped,
    /// Running on more than one node at once.
    MultiActive,
    /// Running on the node under evaluation.
    ActiveHere { role: String },
    /// Running, but on a different node.
    ActiveElsewhere,
}

/// Classify a resource from the viewpoint of `node_id`.
#[must_use]
pub fn resource_state(res: &ClusterResource, node_id: &str) -> ResourceState {
    if res.blocked {
        return ResourceState::Blocked;
    }
    if !res.active {
        return ResourceState::Inactive;
    }
    if res.failed {
        return ResourceState::Failed;
    }
    if res.orphaned {
        return ResourceState::Orphaned;
    }
    if !res.managed {
        return ResourceState::Unmanaged;
    }
    if res.running_on.is_empty() || res.role == "Stopped" {
        return ResourceState::Stopped;
    }
    if res.running_on.len() > 1 {
        return ResourceState::MultiActive;
    }
    if res.running_on[0] == node_id {
        ResourceState::ActiveHere {
            role: res.role.clone(),
        }
    } else {
        ResourceState::ActiveElsewhere
    }
}

impl ResourceState {
    /// Write the classification into a record under construction.
    pub fn apply(&self, rec: &mut RecordBuilder) {
        match self {
            Self::Blocked => {
                rec.set_status("BLOCKED");
                rec.set_category(Category::Error);
            }
            Self::Inactive => {
                rec.set_status("DOWN");
                rec.set_category(Category::Error);
                rec.set_details("Resource is not active");
            }
            Self::Failed => {
                rec.set_status("FAILED");
                rec.set_category(Category::Error);
            }
            Self::Orphaned => {
                rec.set_status("ORPHANED");
                rec.set_category(Category::Warn);
            }
            Self::Unmanaged => {
                rec.set_status("UNMANAGED");
                rec.set_category(Category::Warn);
            }
            Self::Stopped => {
                rec.set_status("DOWN");
                rec.set_category(Category::Error);
                rec.set_details("Service active on 0 nodes");
            }
            Self::MultiActive => {
                rec.set_status("WARN");
                rec.set_category(Category::Warn);
                rec.set_details("Service active on more than 1 node");
            }
            Self::ActiveHere { role } => {
                rec.set_status(normalize_role(role));
                rec.set_category(Category::Good);
            }
            Self::ActiveElsewhere => {
                rec.set_status("-");
                rec.set_category(Category::Passive);
            }
        }
    }
}

/// Display form of a role: uppercased, with `Started` shown as `UP`.
fn normalize_role(role: &str) -> String {
    if role == "Started" {
        "UP".to_string()
    } else {
        role.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(running_on: &[&str]) -> ClusterResource {
        ClusterResource {
            id: "cluster-ip".to_string(),
            resource_agent: "ocf::heartbeat:IPaddr2".to_string(),
            role: "Started".to_string(),
            managed: true,
            orphaned: false,
            failed: false,
            active: true,
            blocked: false,
            running_on: running_on.iter().map(ToString::to_string).collect(),
        }
    }

    fn applied(state: &ResourceState) -> (String, Category) {
        let mut rec = RecordBuilder::new("ctrl1");
        state.apply(&mut rec);
        let rec = rec.build();
        (rec.status, rec.category)
    }

    #[test]
    fn started_on_this_node_is_up() {
        let state = resource_state(&resource(&["1"]), "1");
        assert_eq!(
            state,
            ResourceState::ActiveHere {
                role: "Started".to_string()
            }
        );
        assert_eq!(applied(&state), ("UP".to_string(), Category::Good));
    }

    #[test]
    fn started_elsewhere_is_passive_dash() {
        let state = resource_state(&resource(&["1"]), "2");
        assert_eq!(state, ResourceState::ActiveElsewhere);
        assert_eq!(applied(&state), ("-".to_string(), Category::Passive));
    }

    #[test]
    fn double_active_warns_on_every_node() {
        let res = resource(&["1", "2"]);
        for node in ["1", "2", "3"] {
            let state = resource_state(&res, node);
            assert_eq!(state, ResourceState::MultiActive);
            assert_eq!(applied(&state).1, Category::Warn);
        }
    }

    #[test]
    fn running_nowhere_is_down() {
        let state = resource_state(&resource(&[]), "1");
        assert_eq!(state, ResourceState::Stopped);
        assert_eq!(applied(&state), ("DOWN".to_string(), Category::Error));
    }

    #[test]
    fn stopped_role_beats_running_on() {
        let mut res = resource(&["1"]);
        res.role = "Stopped".to_string();
        assert_eq!(resource_state(&res, "1"), ResourceState::Stopped);
    }

    #[test]
    fn unmanaged_overrides_healthy_placement() {
        let mut res = resource(&["1"]);
        res.managed = false;
        let state = resource_state(&res, "1");
        assert_eq!(state, ResourceState::Unmanaged);
        assert_eq!(applied(&state), ("UNMANAGED".to_string(), Category::Warn));
    }

    #[test]
    fn flag_priority_order() {
        let mut res = resource(&["1"]);
        res.managed = false;
        res.orphaned = true;
        res.failed = true;
        res.active = false;
        res.blocked = true;
        assert_eq!(resource_state(&res, "1"), ResourceState::Blocked);

        res.blocked = false;
        assert_eq!(resource_state(&res, "1"), ResourceState::Inactive);

        res.active = true;
        assert_eq!(resource_state(&res, "1"), ResourceState::Failed);

        res.failed = false;
        assert_eq!(resource_state(&res, "1"), ResourceState::Orphaned);

        res.orphaned = false;
        assert_eq!(resource_state(&res, "1"), ResourceState::Unmanaged);
    }

    #[test]
    fn promoted_roles_are_uppercased_verbatim() {
        let mut res = resource(&["1"]);
        res.role = "Master".to_string();
        let state = resource_state(&res, "1");
        assert_eq!(applied(&state).0, "MASTER");
    }
}
