//! Discovery output for a monitored page.

use std::collections::HashMap;

/// What a monitored page lists: date markers, document links and categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScan {
    /// Cell texts shaped `dd/mm/yyyy`
    pub dates: Vec<String>,
    /// Absolute document links, deduplicated, in page order
    pub links: Vec<String>,
    /// Category heading for each link
    pub categories: HashMap<String, String>,
}

impl PageScan {
    /// Whether the page lists the given reference date.
    pub fn lists_date(&self, date: &str) -> bool {
        self.dates.iter().any(|d| d == date)
    }

    pub fn category_of(&self, link: &str) -> Option<&str> {
        self.categories.get(link).map(String::as_str)
    }
}

/// A document link to be checked, with its informational category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub locator: String,
    pub category: String,
}

impl Candidate {
    pub fn new(locator: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            category: category.into(),
        }
    }
}
