use std::collections::{BTreeMap, HashMap};

use crate::domain::{EntryId, Stage};
use crate::ledger::ProvenanceEntry;

pub struct DerivationGraph<'a> {
    by_id: HashMap<EntryId, &'a ProvenanceEntry>,
    children: HashMap<EntryId, Vec<&'a ProvenanceEntry>>,
    order: Vec<&'a ProvenanceEntry>,
}

impl<'a> DerivationGraph<'a> {
    pub fn new(entries: &'a [ProvenanceEntry]) -> Self {
        let by_id = entries
            .iter()
            .map(|entry| (entry.entry_id, entry))
            .collect::<HashMap<_, _>>();
        let mut children: HashMap<EntryId, Vec<&ProvenanceEntry>> = HashMap::new();
        for entry in entries {
            if let Some(parent) = entry.parent_id {
                children.entry(parent).or_default().push(entry);
            }
        }
        Self {
            by_id,
            children,
            order: entries.iter().collect(),
        }
    }

    pub fn get(&self, id: &EntryId) -> Option<&'a ProvenanceEntry> {
        self.by_id.get(id).copied()
    }

    pub fn children(&self, id: &EntryId) -> &[&'a ProvenanceEntry] {
        self.children.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn parent(&self, id: &EntryId) -> Option<&'a ProvenanceEntry> {
        self.get(id)
            .and_then(|entry| entry.parent_id)
            .and_then(|parent| self.get(&parent))
    }

    pub fn has_child_at(&self, id: &EntryId, stage: Stage) -> bool {
        self.children(id).iter().any(|child| child.stage == stage)
    }

    pub fn roots(&self) -> Vec<&'a ProvenanceEntry> {
        self.order
            .iter()
            .filter(|entry| match entry.parent_id {
                None => true,
                Some(parent) => !self.by_id.contains_key(&parent),
            })
            .copied()
            .collect()
    }

    pub fn ancestors(&self, id: &EntryId) -> Vec<&'a ProvenanceEntry> {
        let mut chain = Vec::new();
        let mut current = *id;
        while let Some(parent) = self.parent(&current) {
            if parent.entry_id == *id
                || chain
                    .iter()
                    .any(|seen: &&ProvenanceEntry| seen.entry_id == parent.entry_id)
            {
                break;
            }
            chain.push(parent);
            current = parent.entry_id;
        }
        chain
    }

    pub fn descendants(&self, id: &EntryId) -> Vec<&'a ProvenanceEntry> {
        let mut found = Vec::new();
        let mut stack = self.children(id).iter().rev().copied().collect::<Vec<_>>();
        while let Some(entry) = stack.pop() {
            if found.iter().any(|seen: &&ProvenanceEntry| seen.entry_id == entry.entry_id) {
                continue;
            }
            found.push(entry);
            stack.extend(self.children(&entry.entry_id).iter().rev().copied());
        }
        found
    }

    pub fn roots_by_source(&self) -> BTreeMap<&'a str, Vec<&'a ProvenanceEntry>> {
        let mut grouped: BTreeMap<&str, Vec<&ProvenanceEntry>> = BTreeMap::new();
        for root in self.roots() {
            grouped.entry(root.source_id.as_str()).or_default().push(root);
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;

    use super::*;

    fn chain() -> Vec<ProvenanceEntry> {
        let raw = ProvenanceEntry::downloaded(Utf8Path::new("s/1"), "book.xlsx", "1");
        let sheet_a =
            ProvenanceEntry::derive_from(&raw, Stage::Split, Utf8Path::new("s/1/split_A.csv"));
        let sheet_b =
            ProvenanceEntry::derive_from(&raw, Stage::Split, Utf8Path::new("s/1/split_B.csv"));
        let norm = ProvenanceEntry::derive_from(
            &sheet_a,
            Stage::Normalized,
            Utf8Path::new("s/1/expdata_A.csv"),
        );
        vec![raw, sheet_a, sheet_b, norm]
    }

    #[test]
    fn children_and_parents() {
        let entries = chain();
        let graph = DerivationGraph::new(&entries);
        let raw = &entries[0];
        assert_eq!(graph.children(&raw.entry_id).len(), 2);
        assert!(graph.has_child_at(&raw.entry_id, Stage::Split));
        assert!(!graph.has_child_at(&raw.entry_id, Stage::Normalized));
        assert_eq!(graph.parent(&entries[3].entry_id).unwrap().filename, "split_A.csv");
        assert!(graph.parent(&raw.entry_id).is_none());
    }

    #[test]
    fn walks_up_and_down() {
        let entries = chain();
        let graph = DerivationGraph::new(&entries);
        let names = graph
            .descendants(&entries[0].entry_id)
            .iter()
            .map(|entry| entry.filename.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["split_A.csv", "expdata_A.csv", "split_B.csv"]);

        let ancestors = graph.ancestors(&entries[3].entry_id);
        assert_eq!(ancestors.len(), 2);
        assert_eq!(ancestors[1].filename, "book.xlsx");
    }

    #[test]
    fn orphans_are_roots() {
        let mut entries = chain();
        entries.remove(1);
        let graph = DerivationGraph::new(&entries);
        let roots = graph.roots();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[1].filename, "expdata_A.csv");
        assert_eq!(graph.roots_by_source()["1"].len(), 2);
    }
}
