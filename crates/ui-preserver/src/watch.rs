use std::collections::HashMap;
use std::sync::Weak;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use pagekeeper_page_port::{MutationRecord, NodeId, Selector};

use crate::model::{OriginContent, PreserveWarning, WarningKind, PROTECTED_ATTR};
use crate::preserver::UiPreserver;

/// Decides whether a mutation touched protected content.
///
/// Attribute changes that leave `class` or `style` at the tagged value are
/// ignored, so writes made while healing do not report themselves. Neither
/// are changes to the root attributes listed in `root_managed`.
pub fn classify(
    record: &MutationRecord,
    registry: &[Selector],
    origins: &HashMap<NodeId, OriginContent>,
    root: NodeId,
    root_managed: &[String],
) -> Option<PreserveWarning> {
    match record {
        MutationRecord::ChildRemoved { removed, .. } => {
            let selector = registry.iter().find(|sel| sel.matches(removed))?;
            Some(PreserveWarning {
                node: removed.node,
                tag: removed.tag.clone(),
                kind: WarningKind::ProtectedRemoved {
                    selector: selector.to_string(),
                },
                observed_at: Utc::now(),
            })
        }
        MutationRecord::Attribute { target, name, .. } => {
            if name != "class" && name != "style" {
                return None;
            }
            if target.node == root && root_managed.contains(name) {
                return None;
            }
            if !target.has_attribute(PROTECTED_ATTR) {
                return None;
            }
            let origin = origins.get(&target.node)?;
            if target.attributes.get(name) == origin.expected(name).as_ref() {
                return None;
            }
            Some(PreserveWarning {
                node: target.node,
                tag: target.tag.clone(),
                kind: WarningKind::ProtectedModified {
                    attribute: name.clone(),
                },
                observed_at: Utc::now(),
            })
        }
    }
}

/// Forwards mutation records to the preserver until the page closes the
/// channel or the preserver is dropped. Returns `None` outside a runtime.
pub(crate) fn spawn_watcher(
    preserver: Weak<UiPreserver>,
    mut records: broadcast::Receiver<MutationRecord>,
) -> Option<JoinHandle<()>> {
    let handle = match Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            warn!("no tokio runtime; mutation watching disabled");
            return None;
        }
    };
    Some(handle.spawn(async move {
        loop {
            match records.recv().await {
                Ok(record) => {
                    let Some(preserver) = preserver.upgrade() else {
                        break;
                    };
                    preserver.handle_mutation(&record);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "mutation watcher lagged; some changes were not inspected");
                }
                Err(RecvError::Closed) => break,
            }
        }
        trace!("mutation watcher exited");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagekeeper_page_port::ElementSummary;
    use std::collections::BTreeMap;

    fn summary(node: u64, tag: &str, attrs: &[(&str, &str)]) -> ElementSummary {
        ElementSummary {
            node: NodeId(node),
            tag: tag.into(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn removal_of_protected_node_is_reported() {
        let registry = vec![Selector::parse(".card").unwrap()];
        let record = MutationRecord::ChildRemoved {
            parent: Some(NodeId(1)),
            removed: summary(9, "div", &[("class", "card agent-protected")]),
        };
        let warning = classify(&record, &registry, &HashMap::new(), NodeId(1), &[]).unwrap();
        assert_eq!(
            warning.kind,
            WarningKind::ProtectedRemoved {
                selector: ".card".into()
            }
        );

        let other = MutationRecord::ChildRemoved {
            parent: None,
            removed: summary(10, "p", &[]),
        };
        assert!(classify(&other, &registry, &HashMap::new(), NodeId(1), &[]).is_none());
    }

    #[test]
    fn attribute_change_back_to_tagged_value_is_ignored() {
        let mut origins = HashMap::new();
        origins.insert(
            NodeId(4),
            OriginContent {
                class_name: "btn".into(),
                ..OriginContent::default()
            },
        );
        let healed = MutationRecord::Attribute {
            target: summary(
                4,
                "button",
                &[("class", "btn agent-protected"), (PROTECTED_ATTR, "true")],
            ),
            name: "class".into(),
            old_value: Some("btn-danger".into()),
        };
        assert!(classify(&healed, &[], &origins, NodeId(1), &[]).is_none());

        let tampered = MutationRecord::Attribute {
            target: summary(4, "button", &[("class", "btn-danger"), (PROTECTED_ATTR, "true")]),
            name: "class".into(),
            old_value: Some("btn agent-protected".into()),
        };
        assert!(matches!(
            classify(&tampered, &[], &origins, NodeId(1), &[]).map(|w| w.kind),
            Some(WarningKind::ProtectedModified { .. })
        ));

        let untracked_attr = MutationRecord::Attribute {
            target: summary(4, "button", &[("title", "x"), (PROTECTED_ATTR, "true")]),
            name: "title".into(),
            old_value: None,
        };
        assert!(classify(&untracked_attr, &[], &origins, NodeId(1), &[]).is_none());
    }

    #[test]
    fn managed_root_attributes_are_not_reported() {
        let mut origins = HashMap::new();
        origins.insert(
            NodeId(2),
            OriginContent {
                class_name: "page-dashboard".into(),
                ..OriginContent::default()
            },
        );
        let managed = vec!["class".to_string(), "style".to_string()];
        let themed = MutationRecord::Attribute {
            target: summary(
                2,
                "body",
                &[
                    ("class", "page-dashboard agent-protected theme-user"),
                    ("style", "pointer-events: none"),
                    (PROTECTED_ATTR, "true"),
                ],
            ),
            name: "style".into(),
            old_value: None,
        };
        assert!(classify(&themed, &[], &origins, NodeId(2), &managed).is_none());
        // Without the exemption the same write counts as tampering.
        assert!(classify(&themed, &[], &origins, NodeId(2), &[]).is_some());
        // The exemption covers the root only.
        assert!(classify(&themed, &[], &origins, NodeId(7), &managed).is_some());
    }
}
