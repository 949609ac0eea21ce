/// Fixed mapping from detector class indices to ingredient names.
///
/// A table is tied to one trained model. Changing the model means adding a new
/// table with a new version string, never editing an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelTable {
    version: &'static str,
    labels: &'static [&'static str],
}

pub const YOLOV5_INGREDIENTS_V1: LabelTable = LabelTable {
    version: "yolov5-ingredients-v1",
    labels: &[
        "Apple",
        "Banana",
        "Bell pepper",
        "Broccoli",
        "Carrot",
        "Cheese",
        "Cucumber",
        "Grape",
        "Grapefruit",
        "Lemon",
        "Mushroom",
        "Orange",
        "Peach",
        "Pear",
        "Pomegranate",
        "Potato",
        "Pumpkin",
        "Radish",
        "Tomato",
        "Zucchini",
    ],
};

const KNOWN_TABLES: &[LabelTable] = &[YOLOV5_INGREDIENTS_V1];

impl LabelTable {
    pub fn by_version(version: &str) -> Option<LabelTable> {
        KNOWN_TABLES.iter().copied().find(|t| t.version == version)
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, index: u32) -> Option<&'static str> {
        self.labels.get(index as usize).copied()
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        YOLOV5_INGREDIENTS_V1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_table_bounds() {
        let table = LabelTable::default();
        assert_eq!(table.len(), 20);
        assert_eq!(table.label(0), Some("Apple"));
        assert_eq!(table.label(2), Some("Bell pepper"));
        assert_eq!(table.label(19), Some("Zucchini"));
        assert_eq!(table.label(20), None);
    }

    #[test]
    fn test_lookup_by_version() {
        assert_eq!(
            LabelTable::by_version("yolov5-ingredients-v1"),
            Some(YOLOV5_INGREDIENTS_V1)
        );
        assert!(LabelTable::by_version("yolov8-v3").is_none());
    }
}
