use crate::data::decode::annotation::Annotation;

/// Annotations of one decoder row in arrival order.
///
/// Producers push in non-decreasing `start_sample` order; the subset query
/// binary-searches on that order and does not re-check it.
#[derive(Clone, Debug, Default)]
pub struct RowData {
    annotations: Vec<Annotation>,
    longest_span: u64,
}

impl RowData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_annotation(&mut self, annotation: Annotation) {
        debug_assert!(
            self.annotations
                .last()
                .map_or(true, |last| last.start_sample() <= annotation.start_sample()),
            "annotations pushed out of order"
        );
        self.longest_span = self.longest_span.max(annotation.span());
        self.annotations.push(annotation);
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Largest end sample of any annotation, zero when empty.
    pub fn get_max_sample(&self) -> u64 {
        self.annotations
            .iter()
            .map(Annotation::end_sample)
            .max()
            .unwrap_or(0)
    }

    /// Copies the annotations overlapping `[start_sample, end_sample]`, in
    /// arrival order.
    pub fn get_annotation_subset(&self, start_sample: u64, end_sample: u64) -> Vec<Annotation> {
        // Nothing starting earlier than this can still reach start_sample.
        let earliest = start_sample.saturating_sub(self.longest_span);
        let first = self
            .annotations
            .partition_point(|a| a.start_sample() < earliest);

        self.annotations[first..]
            .iter()
            .take_while(|a| a.start_sample() <= end_sample)
            .filter(|a| a.end_sample() >= start_sample)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(start: u64, end: u64, text: &str) -> Annotation {
        Annotation::new(start, end, 0, vec![text.to_string()])
    }

    fn texts(subset: &[Annotation]) -> Vec<&str> {
        subset.iter().map(|a| a.annotations()[0].as_str()).collect()
    }

    fn row() -> RowData {
        let mut row = RowData::new();
        row.push_annotation(ann(0, 9, "a"));
        row.push_annotation(ann(10, 19, "b"));
        row.push_annotation(ann(12, 400, "long"));
        row.push_annotation(ann(20, 29, "c"));
        row.push_annotation(ann(500, 500, "point"));
        row
    }

    #[test]
    fn subset_returns_overlapping_annotations() {
        let row = row();
        assert_eq!(texts(&row.get_annotation_subset(15, 25)), vec!["b", "long", "c"]);
        assert_eq!(texts(&row.get_annotation_subset(0, 5)), vec!["a"]);
    }

    #[test]
    fn long_annotation_reaches_into_later_windows() {
        let row = row();
        assert_eq!(texts(&row.get_annotation_subset(300, 450)), vec!["long"]);
    }

    #[test]
    fn point_annotations_match_at_their_sample() {
        let row = row();
        assert_eq!(texts(&row.get_annotation_subset(500, 500)), vec!["point"]);
        assert!(row.get_annotation_subset(401, 499).is_empty());
    }

    #[test]
    fn max_sample_and_len() {
        let row = row();
        assert_eq!(row.len(), 5);
        assert_eq!(row.get_max_sample(), 500);
        assert_eq!(RowData::new().get_max_sample(), 0);
        assert!(RowData::new().is_empty());
    }

    #[test]
    fn annotation_accessors() {
        let a = Annotation::new(3, 8, 2, vec!["Start".into(), "S".into()]);
        assert_eq!(a.start_sample(), 3);
        assert_eq!(a.end_sample(), 8);
        assert_eq!(a.format(), 2);
        assert_eq!(a.annotations(), &["Start".to_string(), "S".to_string()]);
        assert_eq!(a.span(), 5);
    }
}
