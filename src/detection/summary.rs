use serde::{Deserialize, Serialize};

/// Label names counted individually. Order is kept for display; duplicates
/// and blank names are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CategorySet {
    names: Vec<String>,
}

impl CategorySet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && !set.contains(name) {
                set.names.push(name.to_string());
            }
        }
        set
    }

    /// Comma separated, as written in the config file.
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn to_config_string(&self) -> String {
        self.names.join(", ")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl From<Vec<String>> for CategorySet {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<CategorySet> for Vec<String> {
    fn from(set: CategorySet) -> Self {
        set.names
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

/// Totals for one processed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DetectionSummary {
    pub total: usize,
    pub counts: Vec<CategoryCount>,
}

impl DetectionSummary {
    pub fn count(&self, category: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.count)
    }

    pub fn recognized(&self) -> usize {
        self.counts.iter().map(|c| c.count).sum()
    }
}

/// Counts every label toward the total and exact matches toward their
/// category. Labels outside `categories` only add to the total.
pub fn summarize<S: AsRef<str>>(labels: &[S], categories: &CategorySet) -> DetectionSummary {
    let counts = categories
        .names()
        .iter()
        .map(|name| CategoryCount {
            category: name.clone(),
            count: labels
                .iter()
                .filter(|label| {
                    let label: &str = label.as_ref();
                    label == name.as_str()
                })
                .count(),
        })
        .collect();

    DetectionSummary {
        total: labels.len(),
        counts,
    }
}
