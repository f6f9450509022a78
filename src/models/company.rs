use std::collections::HashSet;
use std::path::Path;

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

// A tracked company: display name (used in file names) and ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    pub symbol: String,
}

impl Company {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
        }
    }
}

const DEFAULT_COMPANIES: [(&str, &str); 7] = [
    ("Google", "GOOGL"),
    ("Apple", "AAPL"),
    ("Microsoft", "MSFT"),
    ("Amazon", "AMZN"),
    ("Facebook", "META"),
    ("Tesla", "TSLA"),
    ("Netflix", "NFLX"),
];

/// The set of companies the batch refreshes, in a stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyTable {
    companies: Vec<Company>,
}

impl CompanyTable {
    pub fn new(companies: Vec<Company>) -> Result<Self, AppError> {
        let mut seen = HashSet::new();
        for company in &companies {
            if company.name.trim().is_empty() || company.symbol.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "company entries need both a name and a symbol (got '{}', '{}')",
                    company.name, company.symbol
                )));
            }
            // Names become file names
            if company.name.contains(['/', '\\']) {
                return Err(AppError::Config(format!(
                    "company name '{}' must not contain path separators",
                    company.name
                )));
            }
            if !seen.insert(company.name.to_lowercase()) {
                return Err(AppError::Config(format!(
                    "duplicate company name '{}'",
                    company.name
                )));
            }
        }

        Ok(Self { companies })
    }

    /// Load a `name,symbol` CSV file.
    pub fn from_csv(path: &Path) -> Result<Self, AppError> {
        let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;

        let mut companies = Vec::new();
        for row in reader.deserialize() {
            let company: Company = row?;
            companies.push(company);
        }

        if companies.is_empty() {
            return Err(AppError::Config(format!(
                "company table {} is empty",
                path.display()
            )));
        }

        Self::new(companies)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Company> {
        self.companies.iter()
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    /// Case-insensitive lookup by display name or ticker.
    pub fn find(&self, key: &str) -> Option<&Company> {
        self.companies.iter().find(|c| {
            c.name.eq_ignore_ascii_case(key) || c.symbol.eq_ignore_ascii_case(key)
        })
    }
}

impl Default for CompanyTable {
    fn default() -> Self {
        Self {
            companies: DEFAULT_COMPANIES
                .iter()
                .map(|(name, symbol)| Company::new(*name, *symbol))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_table_has_seven_companies() {
        let table = CompanyTable::default();
        assert_eq!(table.len(), 7);
        assert_eq!(table.find("facebook").unwrap().symbol, "META");
        assert_eq!(table.find("nflx").unwrap().name, "Netflix");
    }

    #[test]
    fn test_loads_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,symbol").unwrap();
        writeln!(file, "Nvidia, NVDA").unwrap();
        writeln!(file, "Intel,INTC").unwrap();

        let table = CompanyTable::from_csv(file.path()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.find("Nvidia").unwrap().symbol, "NVDA");
    }

    #[test]
    fn test_rejects_duplicates() {
        let result = CompanyTable::new(vec![
            Company::new("Apple", "AAPL"),
            Company::new("apple", "AAPL"),
        ]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let result = CompanyTable::new(vec![Company::new("../etc", "X")]);
        assert!(result.is_err());
    }
}
