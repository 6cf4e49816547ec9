use serde::{Deserialize, Serialize};

/// Descriptive company data from market data providers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    /// Provider that supplied this profile (e.g., "YAHOO", "FINNHUB")
    pub source: String,

    /// Company name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Listing exchange as reported by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,

    /// Business sector (e.g., "Technology")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,

    /// Industry within sector (e.g., "Consumer Electronics")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    /// Country of domicile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Reporting / trading currency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Company website URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// Business description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Number of full-time employees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employees: Option<u64>,

    /// Logo URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl CompanyProfile {
    /// Create an empty profile attributed to `source`
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Set the name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the sector
    pub fn sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    /// Set the industry
    pub fn industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    /// Set the country
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// True when the provider returned nothing beyond attribution.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.exchange.is_none()
            && self.sector.is_none()
            && self.industry.is_none()
            && self.description.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_profile_builder() {
        let profile = CompanyProfile::new("YAHOO")
            .name("Apple Inc.")
            .sector("Technology")
            .industry("Consumer Electronics")
            .country("US");

        assert_eq!(profile.name, Some("Apple Inc.".to_string()));
        assert_eq!(profile.sector, Some("Technology".to_string()));
        assert_eq!(profile.country, Some("US".to_string()));
        assert!(!profile.is_empty());
    }

    #[test]
    fn test_empty_profile() {
        assert!(CompanyProfile::new("FINNHUB").is_empty());
    }

    #[test]
    fn test_optional_fields_are_skipped() {
        let json = serde_json::to_value(CompanyProfile::new("YAHOO").name("X")).unwrap();
        assert!(json.get("sector").is_none());
        assert_eq!(json["name"], "X");
    }
}
