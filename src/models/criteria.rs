use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The closed set of user attributes a criterion may test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum AttributeCategory {
    Department,
    Location,
    Country,
    JobTitle,
    Division,
    Gender,
    UserType,
    Status,
}

impl AttributeCategory {
    pub const ALL: [AttributeCategory; 8] = [
        AttributeCategory::Department,
        AttributeCategory::Location,
        AttributeCategory::Country,
        AttributeCategory::JobTitle,
        AttributeCategory::Division,
        AttributeCategory::Gender,
        AttributeCategory::UserType,
        AttributeCategory::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeCategory::Department => "department",
            AttributeCategory::Location => "location",
            AttributeCategory::Country => "country",
            AttributeCategory::JobTitle => "jobTitle",
            AttributeCategory::Division => "division",
            AttributeCategory::Gender => "gender",
            AttributeCategory::UserType => "userType",
            AttributeCategory::Status => "status",
        }
    }
}

impl fmt::Display for AttributeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; `_`, `-` and spaces are ignored, so `job_title`,
/// `JobTitle` and `jobtitle` all name the same attribute.
impl FromStr for AttributeCategory {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let folded: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        AttributeCategory::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(&folded))
            .ok_or_else(|| format!("unknown criterion category '{}'", raw.trim()))
    }
}

/// A single `attribute == value` rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Criterion {
    pub category: AttributeCategory,
    #[schema(example = "Engineering")]
    pub value: String,
}

impl Criterion {
    pub fn new(category: AttributeCategory, value: impl Into<String>) -> Self {
        Self {
            category,
            value: value.into(),
        }
    }
}

/// Criterion as submitted by clients, before the category is checked.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CriterionInput {
    #[schema(example = "department")]
    pub category: String,
    #[schema(example = "Engineering")]
    pub value: String,
}

/// Converts a submitted criteria list, appending one message per bad entry to `errors`.
pub fn validate_criteria(list: &str, inputs: &[CriterionInput], errors: &mut Vec<String>) -> Vec<Criterion> {
    let mut criteria = Vec::with_capacity(inputs.len());

    for (index, input) in inputs.iter().enumerate() {
        let category = match input.category.parse::<AttributeCategory>() {
            Ok(category) => Some(category),
            Err(message) => {
                errors.push(format!("{list}[{index}]: {message}"));
                None
            }
        };

        if input.value.is_empty() {
            errors.push(format!("{list}[{index}]: value is required"));
            continue;
        }

        if let Some(category) = category {
            criteria.push(Criterion::new(category, input.value.clone()));
        }
    }

    criteria
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(category: &str, value: &str) -> CriterionInput {
        CriterionInput {
            category: category.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn category_names_are_folded() {
        assert_eq!("department".parse::<AttributeCategory>(), Ok(AttributeCategory::Department));
        assert_eq!("jobTitle".parse::<AttributeCategory>(), Ok(AttributeCategory::JobTitle));
        assert_eq!("job_title".parse::<AttributeCategory>(), Ok(AttributeCategory::JobTitle));
        assert_eq!("JOBTITLE".parse::<AttributeCategory>(), Ok(AttributeCategory::JobTitle));
        assert_eq!("user-type".parse::<AttributeCategory>(), Ok(AttributeCategory::UserType));
        assert!("salary".parse::<AttributeCategory>().is_err());
        assert!("".parse::<AttributeCategory>().is_err());
    }

    #[test]
    fn categories_serialize_camel_case() {
        let criterion = Criterion::new(AttributeCategory::JobTitle, "Engineer");
        let json = serde_json::to_value(&criterion).unwrap();
        assert_eq!(json, serde_json::json!({"category": "jobTitle", "value": "Engineer"}));

        let back: Criterion = serde_json::from_value(json).unwrap();
        assert_eq!(back, criterion);
    }

    #[test]
    fn unknown_category_is_reported_not_dropped() {
        let mut errors = Vec::new();
        let criteria = validate_criteria(
            "includeCriteria",
            &[input("department", "Eng"), input("shoeSize", "42")],
            &mut errors,
        );

        assert_eq!(criteria, vec![Criterion::new(AttributeCategory::Department, "Eng")]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("includeCriteria[1]"), "{}", errors[0]);
    }

    #[test]
    fn empty_value_is_rejected() {
        let mut errors = Vec::new();
        validate_criteria("excludeCriteria", &[input("location", "")], &mut errors);
        assert_eq!(errors, vec!["excludeCriteria[0]: value is required".to_string()]);
    }
}
