//! Read-only projection grouping duplicates under their primaries.

use std::collections::HashMap;

use serde::Serialize;

use crate::incident::{Incident, IncidentDraft, ReporterType};
use crate::types::DbId;

/// Number of trailing id characters used in a placeholder title.
const PLACEHOLDER_SUFFIX_LEN: usize = 6;

/// A primary incident with the duplicates merged into it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentGroup {
    pub primary: Incident,
    /// The primary was not in the loaded set and was synthesized for display.
    pub placeholder: bool,
    pub duplicates: Vec<Incident>,
}

/// Group every duplicate under its primary.
///
/// Groups follow the order in which their primary appears; groups for
/// primaries missing from `incidents` are appended in order of first
/// reference and carry a synthesized placeholder primary that is never
/// persisted. A duplicate whose primary reference is missing is shown as
/// its own group.
pub fn build_hierarchy(incidents: &[Incident]) -> Vec<IncidentGroup> {
    let mut groups: Vec<IncidentGroup> = Vec::new();
    let mut slot_of: HashMap<DbId, usize> = HashMap::new();

    for incident in incidents.iter().filter(|i| i.primary_id().is_none()) {
        slot_of.insert(incident.id, groups.len());
        groups.push(IncidentGroup {
            primary: incident.clone(),
            placeholder: false,
            duplicates: Vec::new(),
        });
    }

    for duplicate in incidents.iter() {
        let Some(primary_id) = duplicate.primary_id() else {
            continue;
        };
        let slot = match slot_of.get(&primary_id) {
            Some(&slot) => slot,
            None => {
                slot_of.insert(primary_id, groups.len());
                groups.push(IncidentGroup {
                    primary: placeholder(primary_id, duplicate),
                    placeholder: true,
                    duplicates: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[slot];
        if group.placeholder && duplicate.severity > group.primary.severity {
            group.primary.severity = duplicate.severity;
        }
        group.duplicates.push(duplicate.clone());
    }

    groups
}

/// Minimal stand-in for a primary that is not loaded.
fn placeholder(id: DbId, first_duplicate: &Incident) -> Incident {
    let id_text = id.to_string();
    let suffix = &id_text[id_text.len().saturating_sub(PLACEHOLDER_SUFFIX_LEN)..];
    let mut incident = IncidentDraft {
        title: format!("Incident #{suffix}"),
        description: String::new(),
        severity: first_duplicate.severity,
        reporter_type: ReporterType::Citizen,
        reported_by: 0,
        asset_id: None,
        created_at: first_duplicate.created_at,
    }
    .into_incident(id);
    incident.version = 0;
    incident
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::tests::reported;
    use crate::incident::{ResolutionType, Severity};

    fn duplicate_of(id: DbId, primary: DbId) -> Incident {
        let mut incident = reported(id);
        incident.resolution_type = Some(ResolutionType::Duplicate);
        incident.related_incidents = vec![primary];
        incident
    }

    #[test]
    fn duplicates_nest_under_loaded_primary() {
        let incidents = vec![reported(1), duplicate_of(2, 1), reported(3), duplicate_of(4, 1)];
        let groups = build_hierarchy(&incidents);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].primary.id, 1);
        assert!(!groups[0].placeholder);
        let ids: Vec<_> = groups[0].duplicates.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 4]);
        assert_eq!(groups[1].primary.id, 3);
        assert!(groups[1].duplicates.is_empty());
    }

    #[test]
    fn missing_primary_gets_placeholder() {
        let mut dup = duplicate_of(5, 1_234_567_890);
        dup.severity = Severity::Critical;
        let groups = build_hierarchy(&[reported(1), dup]);
        assert_eq!(groups.len(), 2);
        let synthesized = &groups[1];
        assert!(synthesized.placeholder);
        assert_eq!(synthesized.primary.id, 1_234_567_890);
        assert_eq!(synthesized.primary.title, "Incident #567890");
        assert_eq!(synthesized.primary.severity, Severity::Critical);
        assert_eq!(synthesized.duplicates.len(), 1);
    }

    #[test]
    fn short_ids_use_whole_id() {
        let groups = build_hierarchy(&[duplicate_of(5, 42), duplicate_of(6, 42)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].primary.title, "Incident #42");
        assert_eq!(groups[0].duplicates.len(), 2);
    }

    #[test]
    fn duplicate_without_primary_reference_stands_alone() {
        let mut orphan = reported(8);
        orphan.resolution_type = Some(ResolutionType::Duplicate);
        let groups = build_hierarchy(&[orphan]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].primary.id, 8);
    }
}
