//! Listings schema as described to the model.

/// One listings column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: &'static str,
    /// Text columns get partial, case-insensitive matching.
    pub text: bool,
    pub description: &'static str,
}

/// A local-language word and the canonical column value it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyEntry {
    pub word: &'static str,
    pub column: &'static str,
    pub value: &'static str,
}

/// Table name, columns and vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSchema {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
    pub vocabulary: Vec<VocabularyEntry>,
}

const CAR_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { name: "brand", sql_type: "TEXT", text: true, description: "manufacturer, e.g. BMW" },
    ColumnSpec { name: "model", sql_type: "TEXT", text: true, description: "model name, e.g. 320i" },
    ColumnSpec { name: "year", sql_type: "INTEGER", text: false, description: "model year" },
    ColumnSpec { name: "transmission", sql_type: "TEXT", text: true, description: "Automatic, Manual or Semi-Auto" },
    ColumnSpec { name: "mileage", sql_type: "INTEGER", text: false, description: "odometer reading in km" },
    ColumnSpec { name: "fueltype", sql_type: "TEXT", text: true, description: "Petrol, Diesel, Hybrid or Electric" },
    ColumnSpec { name: "price", sql_type: "INTEGER", text: false, description: "asking price in TL" },
    ColumnSpec { name: "source_file", sql_type: "TEXT", text: false, description: "import file the row came from" },
];

const TURKISH_VOCABULARY: &[VocabularyEntry] = &[
    VocabularyEntry { word: "otomatik", column: "transmission", value: "Automatic" },
    VocabularyEntry { word: "manuel", column: "transmission", value: "Manual" },
    VocabularyEntry { word: "düz", column: "transmission", value: "Manual" },
    VocabularyEntry { word: "benzin", column: "fueltype", value: "Petrol" },
    VocabularyEntry { word: "dizel", column: "fueltype", value: "Diesel" },
    VocabularyEntry { word: "hibrit", column: "fueltype", value: "Hybrid" },
    VocabularyEntry { word: "elektrik", column: "fueltype", value: "Electric" },
];

impl ListingSchema {
    /// The car listings schema under the given table name.
    pub fn cars(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: CAR_COLUMNS.to_vec(),
            vocabulary: TURKISH_VOCABULARY.to_vec(),
        }
    }

    /// Names of the text columns.
    pub fn text_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.text)
            .map(|c| c.name.to_string())
            .collect()
    }

    /// Plain-text description used in prompts.
    pub fn describe(&self) -> String {
        let mut out = format!("Table `{}` columns:\n", self.table);
        for column in &self.columns {
            out.push_str(&format!(
                "- {} {} ({})\n",
                column.name, column.sql_type, column.description
            ));
        }
        if !self.vocabulary.is_empty() {
            out.push_str("Vocabulary (word -> column value):\n");
            for entry in &self.vocabulary {
                out.push_str(&format!(
                    "- \"{}\" -> {} = '{}'\n",
                    entry.word, entry.column, entry.value
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_columns() {
        let schema = ListingSchema::cars("cars");
        assert_eq!(
            schema.text_columns(),
            vec!["brand", "model", "transmission", "fueltype"]
        );
    }

    #[test]
    fn test_describe() {
        let description = ListingSchema::cars("listings").describe();
        assert!(description.starts_with("Table `listings` columns:"));
        assert!(description.contains("- mileage INTEGER"));
        assert!(description.contains("\"otomatik\" -> transmission = 'Automatic'"));
    }
}
