//! Selection of the frames a subset is built from.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::ClassKey;

/// Classes present per frame id.
pub type AnnotationCorpus = BTreeMap<String, BTreeSet<ClassKey>>;

/// Class-presence predicate evaluated against the classes of one frame.
///
/// A frame matches when every `present` class occurs, at least one `any_of`
/// class occurs (if any are listed), and no `absent` class occurs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionPredicate {
    pub present: Vec<ClassKey>,
    pub any_of: Vec<ClassKey>,
    pub absent: Vec<ClassKey>,
}

impl InclusionPredicate {
    /// "`key` present"
    pub fn present(key: impl Into<ClassKey>) -> Self {
        Self {
            present: vec![key.into()],
            ..Self::default()
        }
    }

    /// "`key` absent"
    pub fn absent(key: impl Into<ClassKey>) -> Self {
        Self {
            absent: vec![key.into()],
            ..Self::default()
        }
    }

    pub fn any_of<K: Into<ClassKey>>(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            any_of: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn and_absent(mut self, key: impl Into<ClassKey>) -> Self {
        self.absent.push(key.into());
        self
    }

    pub fn matches(&self, classes: &BTreeSet<ClassKey>) -> bool {
        self.present.iter().all(|key| classes.contains(key))
            && (self.any_of.is_empty() || self.any_of.iter().any(|key| classes.contains(key)))
            && !self.absent.iter().any(|key| classes.contains(key))
    }
}

/// Frame ids of `corpus` that satisfy `predicate`.
pub fn select(corpus: &AnnotationCorpus, predicate: &InclusionPredicate) -> BTreeSet<String> {
    corpus
        .iter()
        .filter(|(_, classes)| predicate.matches(classes))
        .map(|(frame_id, _)| frame_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(entries: &[(&str, &[&str])]) -> AnnotationCorpus {
        entries
            .iter()
            .map(|(frame_id, labels)| {
                (
                    frame_id.to_string(),
                    labels.iter().map(|&label| ClassKey::from(label)).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_present_and_absent() {
        let corpus = corpus(&[("f1", &["A"]), ("f2", &["A", "B"]), ("f3", &["B"])]);
        let predicate = InclusionPredicate::present("A").and_absent("B");
        assert_eq!(select(&corpus, &predicate), BTreeSet::from(["f1".to_string()]));
    }

    #[test]
    fn test_person_without_person_group() {
        let corpus = corpus(&[
            ("rs00001", &["person", "rail"]),
            ("rs00002", &["person", "person-group"]),
            ("rs00003", &["car"]),
            ("rs00004", &["person"]),
        ]);
        let predicate = InclusionPredicate::present("person").and_absent("person-group");
        let selected = select(&corpus, &predicate);
        assert_eq!(
            selected.into_iter().collect::<Vec<_>>(),
            vec!["rs00001".to_string(), "rs00004".to_string()]
        );
    }

    #[test]
    fn test_any_of_and_absent_only() {
        let corpus: AnnotationCorpus = [
            ("a".to_string(), BTreeSet::from([ClassKey::Index(11)])),
            ("b".to_string(), BTreeSet::from([ClassKey::Index(3)])),
            ("c".to_string(), BTreeSet::new()),
        ]
        .into_iter()
        .collect();

        let any = InclusionPredicate::any_of([11u8, 3u8]);
        assert_eq!(select(&corpus, &any).len(), 2);

        let negatives = InclusionPredicate::absent(11u8);
        assert_eq!(
            select(&corpus, &negatives),
            BTreeSet::from(["b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_selection_is_deterministic() {
        let corpus = corpus(&[("x", &["A"]), ("y", &["A"]), ("z", &["A", "C"])]);
        let predicate = InclusionPredicate::present("A");
        assert_eq!(select(&corpus, &predicate), select(&corpus, &predicate));
    }
}
