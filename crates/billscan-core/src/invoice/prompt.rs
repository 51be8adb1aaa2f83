//! Instruction prompts for the generative extraction service.

use crate::models::record::Category;

/// Fields requested by default, in prompt order.
pub const DEFAULT_FIELDS: [&str; 6] = [
    "store_name",
    "date",
    "bill_no",
    "total_amount",
    "category",
    "gstin",
];

/// Keywords that steer category classification.
const CATEGORY_KEYWORDS: [(Category, &str); 5] = [
    (
        Category::Food,
        "restaurant, cafe, grocery, food, beverage, bakery, supermarket",
    ),
    (
        Category::Travel,
        "flight, airline, hotel, taxi, fuel, petrol, Uber, Ola, bus, train",
    ),
    (
        Category::OfficeSupplies,
        "stationery, printer, ink, paper, pen, laptop, computer, mouse, keyboard",
    ),
    (
        Category::Utilities,
        "electricity, water, internet, mobile bill, phone bill, broadband, gas",
    ),
    (Category::Others, "(use this if no relevant category is found)"),
];

const INSIGHTS_INSTRUCTION: &str = "Analyze the following invoice data and provide 5 to 10 \
bullet-point insights along with actionable recommendations for the client. Focus on \
identifying key spending trends, anomalies, and cost drivers, and include only those insights \
that are directly useful for making financial decisions (e.g., high spending areas, \
opportunities for vendor negotiation, unusual spikes in costs). Exclude suggestions about \
internal data standardization, invoice formatting issues, or unclear notations unless they \
significantly impact the spending or payment process. Output only bullet points.";

/// Builds the extraction prompt from a configurable field list.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    fields: Vec<String>,
    date_format: String,
}

impl PromptBuilder {
    /// Create a builder for the default field set.
    pub fn new() -> Self {
        Self {
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            date_format: "DD/MM/YYYY".to_string(),
        }
    }

    /// Set the requested fields.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the date format the model should normalize to.
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Requested field keys.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Build the full prompt for one invoice text.
    pub fn build(&self, text: &str) -> String {
        let mut prompt = String::from("Extract the following details from this invoice text:\n");
        for field in &self.fields {
            prompt.push_str(&format!("- {}\n", self.describe(field)));
        }

        if self.fields.iter().any(|f| f == "category") {
            prompt.push_str("\nUse the following keywords for category classification:\n");
            for (category, keywords) in CATEGORY_KEYWORDS {
                prompt.push_str(&format!("- {}: {}\n", category, keywords));
            }
        }

        let keys = self
            .fields
            .iter()
            .map(|f| format!("\"{}\"", f))
            .collect::<Vec<_>>()
            .join(", ");
        prompt.push_str(&format!(
            "\nProvide ONLY a JSON response with these keys: {}.\n\
             Do NOT include any additional text, explanation, or formatting outside of the JSON object.\n",
            keys
        ));

        prompt.push_str("\nInvoice text:\n");
        prompt.push_str(text);
        prompt
    }

    fn describe(&self, field: &str) -> String {
        match field {
            "store_name" => "Store Name".to_string(),
            "date" => format!(
                "Date (if the date is in a different format, convert it to {} format)",
                self.date_format
            ),
            "bill_no" => "Bill Number".to_string(),
            "total_amount" => "Total Amount".to_string(),
            "category" => {
                let names = Category::ALL
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Category (choose from: {})", names)
            }
            "gstin" => "GSTIN".to_string(),
            other => other.replace('_', " "),
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the spending-insights prompt over a plain-text invoice table.
pub fn insights_prompt(invoice_table: &str) -> String {
    format!("{}\n\nInvoice Data:\n{}", INSIGHTS_INSTRUCTION, invoice_table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_mentions_all_keys() {
        let prompt = PromptBuilder::new().build("TOTAL 100");
        for field in DEFAULT_FIELDS {
            assert!(prompt.contains(&format!("\"{}\"", field)), "missing {}", field);
        }
        assert!(prompt.contains("Office Supplies: stationery"));
        assert!(prompt.contains("convert it to DD/MM/YYYY format"));
        assert!(prompt.ends_with("Invoice text:\nTOTAL 100"));
    }

    #[test]
    fn test_prompt_without_category_skips_keyword_guide() {
        let prompt = PromptBuilder::new()
            .with_fields(["store_name", "date", "bill_no", "total_amount"])
            .build("text");
        assert!(!prompt.contains("category classification"));
        assert!(!prompt.contains("\"gstin\""));
        assert!(prompt.contains("- Bill Number\n"));
    }

    #[test]
    fn test_unknown_field_is_humanized() {
        let prompt = PromptBuilder::new().with_fields(["due_date"]).build("");
        assert!(prompt.contains("- due date\n"));
    }

    #[test]
    fn test_insights_prompt() {
        let prompt = insights_prompt("id store\n1 Cafe");
        assert!(prompt.starts_with("Analyze the following invoice data"));
        assert!(prompt.ends_with("Invoice Data:\nid store\n1 Cafe"));
    }
}
